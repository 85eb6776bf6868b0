use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of message pushed to live WebSocket connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    AgentStatus,
    DataUpdate,
    AnalysisComplete,
    Error,
    WorkflowStatus,
    HumanInputRequired,
}

/// Message delivered to every client attached to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: WsMessageType,
    pub agent_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl WsMessage {
    pub fn new(message_type: WsMessageType, agent_id: &str, data: serde_json::Value) -> Self {
        Self {
            message_type,
            agent_id: agent_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}
