//! Actor State Store
//!
//! Durable per-agent records and the key-value persistence seam they are
//! written through. Map-valued fields cross the serialization boundary as
//! explicit `[key, value]` pair lists.

pub mod pairs;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod store;
pub mod workflow;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStateStore;
pub use record::{
    AgentConfig, AgentConfigOverrides, AgentRecord, CacheEntry, CustomState, Metrics,
    PendingInputNote, RateWindow,
};
pub use store::{record_key, FileStateStore, MemoryStateStore, StateStore};
pub use workflow::{StepStatus, WorkflowStep};

/// Open the configured backend
pub async fn build_state_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStateStore::new())),
        StorageBackend::File => Ok(Arc::new(FileStateStore::new(config.path.clone()))),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                crate::error::AgentError::Validation("storage.url is required".to_string())
            })?;
            Ok(Arc::new(
                PostgresStateStore::connect(url, config.max_connections).await?,
            ))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => Err(crate::error::AgentError::Validation(
            "the postgres backend needs the `postgres` feature".to_string(),
        )),
    }
}
