//! PostgreSQL-backed state store (feature `postgres`)

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::record::AgentRecord;
use super::store::StateStore;
use crate::error::Result;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS agent_state (
    key TEXT PRIMARY KEY,
    record JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Connect and make sure the table exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("Connected agent state store to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn load(&self, key: &str) -> Result<Option<AgentRecord>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT record FROM agent_state WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((record,)) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &AgentRecord) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        sqlx::query(
            r#"
            INSERT INTO agent_state (key, record, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET record = EXCLUDED.record, updated_at = NOW()
            "#,
        )
        .bind(record.key())
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM agent_state WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
