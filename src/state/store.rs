//! Persistence seam for agent records
//!
//! Backends only need get/put/delete by key with read-your-writes consistency.
//! Records are written as JSON documents so every backend exercises the same
//! serialization boundary.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::record::AgentRecord;
use crate::domain::AgentType;
use crate::error::{AgentError, Result};

/// Storage key for an agent identity
pub fn record_key(agent_type: AgentType, agent_id: &str) -> String {
    format!("{}:{}", agent_type.as_str(), agent_id)
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the record stored under `key`, if any
    async fn load(&self, key: &str) -> Result<Option<AgentRecord>>;

    /// Insert or replace the record under `record.key()`
    async fn save(&self, record: &AgentRecord) -> Result<()>;

    /// Delete the record; deleting a missing key is not an error
    async fn reset(&self, key: &str) -> Result<()>;
}

/// In-process store, the default backend
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: DashMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<AgentRecord>> {
        let Some(doc) = self.documents.get(key).map(|d| d.value().clone()) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&doc)?))
    }

    async fn save(&self, record: &AgentRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        self.documents.insert(record.key(), doc);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.documents.remove(key);
        Ok(())
    }
}

/// One JSON file per agent under a directory
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded key, so distinct keys never share a file
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, key: &str) -> Result<Option<AgentRecord>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, record: &AgentRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AgentError::Storage(format!("failed to create state dir: {}", e))
        })?;

        let path = self.path_for(&record.key());
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(record)?;

        // Write-then-rename so readers never see a torn document
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| AgentError::Storage(format!("failed to write state file: {}", e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AgentError::Storage(format!("failed to move state file: {}", e)))?;

        debug!("Saved agent record to {}", path.display());
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::Storage(format!(
                "failed to delete state file: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentConfig;
    use chrono::Utc;
    use serde_json::json;

    fn sample() -> AgentRecord {
        let mut rec = AgentRecord::new(
            AgentType::Charts,
            "s1-charts",
            AgentConfig::default(),
            Utc::now(),
        );
        rec.cache_put("candles:BTC:1h", json!([1, 2, 3]), 0);
        rec
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStateStore::new();
        let rec = sample();
        assert!(store.load(&rec.key()).await.unwrap().is_none());

        store.save(&rec).await.unwrap();
        assert_eq!(store.load("charts:s1-charts").await.unwrap(), Some(rec.clone()));

        store.reset(&rec.key()).await.unwrap();
        assert!(store.load(&rec.key()).await.unwrap().is_none());
        // Resetting twice is fine
        store.reset(&rec.key()).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("agents"));
        let rec = sample();

        assert!(store.load(&rec.key()).await.unwrap().is_none());
        store.save(&rec).await.unwrap();
        assert_eq!(store.load(&rec.key()).await.unwrap(), Some(rec.clone()));

        store.reset(&rec.key()).await.unwrap();
        assert!(store.load(&rec.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let ids = ["a.b", "a_b", "a/b", "a:b"];
        for id in ids {
            let rec = AgentRecord::new(AgentType::Overview, id, AgentConfig::default(), Utc::now());
            store.save(&rec).await.unwrap();
        }

        for id in ids {
            let loaded = store
                .load(&record_key(AgentType::Overview, id))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(loaded.agent_id, id);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), ids.len());
    }

    #[test]
    fn test_record_key() {
        assert_eq!(record_key(AgentType::Chat, "abc-chat"), "chat:abc-chat");
    }
}
