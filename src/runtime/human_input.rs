//! Pending human-input requests
//!
//! Each request parks a one-shot sender keyed by `workflowId:stepId`. The table
//! has its own lock, separate from the agent record lock, so a waiting request
//! never blocks other operations on the same agent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInputRequest {
    pub workflow_id: String,
    pub step_id: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Falls back to the agent's configured timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInputResponse {
    pub workflow_id: String,
    pub step_id: String,
    pub response: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
}

pub fn input_key(workflow_id: &str, step_id: &str) -> String {
    format!("{}:{}", workflow_id, step_id)
}

#[derive(Default)]
pub struct HumanInputTable {
    pending: Mutex<HashMap<String, oneshot::Sender<HumanInputResponse>>>,
}

impl HumanInputTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request. Re-registering a key abandons the earlier waiter.
    pub fn register(&self, key: &str) -> oneshot::Receiver<HumanInputResponse> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(key.to_string(), tx);
        rx
    }

    /// Hand the response to the matching waiter; false if nothing was pending
    pub fn resolve(&self, response: HumanInputResponse) -> bool {
        let key = input_key(&response.workflow_id, &response.step_id);
        let sender = self.lock().remove(&key);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn cancel_all(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<HumanInputResponse>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
