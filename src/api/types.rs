use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::OperationResult;
use crate::orchestrator::AgentInfo;

// ============================================================================
// Agent Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentListResponse {
    pub agents: Vec<AgentInfo>,
    pub live_actors: usize,
}

// ============================================================================
// Routing / Chat Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_session")]
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// `[{role, content}]`
    #[serde(default)]
    pub history: Value,
}

fn default_session() -> String {
    "default".to_string()
}

// ============================================================================
// Health Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" when every agent answered, otherwise "degraded"
    pub status: String,
    pub session_id: String,
    pub uptime_secs: i64,
    pub agents: BTreeMap<String, OperationResult<Value>>,
}
