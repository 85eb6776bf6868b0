//! The per-agent durable record

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::workflow::WorkflowStep;
use crate::domain::AgentType;

/// Per-agent behaviour knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
    /// Soft budget: exceeding it is logged, never rejected
    pub rate_limit_per_minute: u32,
    pub human_input_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_ms: 300_000,
            rate_limit_per_minute: 60,
            human_input_timeout_ms: 300_000,
        }
    }
}

/// Partial config accepted by `initialize`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigOverrides {
    #[serde(default)]
    pub cache_enabled: Option<bool>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub human_input_timeout_ms: Option<u64>,
}

impl AgentConfig {
    pub fn apply(&mut self, overrides: &AgentConfigOverrides) {
        if let Some(v) = overrides.cache_enabled {
            self.cache_enabled = v;
        }
        if let Some(v) = overrides.cache_ttl_ms {
            self.cache_ttl_ms = v;
        }
        if let Some(v) = overrides.rate_limit_per_minute {
            self.rate_limit_per_minute = v;
        }
        if let Some(v) = overrides.human_input_timeout_ms {
            self.human_input_timeout_ms = v;
        }
    }
}

/// Request counters and running averages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    /// Fraction of requests answered from cache, 0.0..=1.0
    pub cache_hit_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Fold one completed request into the counters.
    ///
    /// Both averages use `avg += (x - avg) / n`, so after N requests they equal
    /// the plain mean of every observation regardless of hit/miss order.
    pub fn record_request(
        &mut self,
        elapsed_ms: f64,
        success: bool,
        cache_hit: bool,
        at: DateTime<Utc>,
    ) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let n = self.total_requests as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / n;

        let hit = if cache_hit { 1.0 } else { 0.0 };
        self.cache_hit_rate += (hit - self.cache_hit_rate) / n;

        self.last_active = Some(at);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

/// Cached operation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: serde_json::Value,
    /// Unix epoch milliseconds
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Introspection copy of a pending human-input request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInputNote {
    pub workflow_id: String,
    pub step_id: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Agent-specific state with a typed slot per known use
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomState {
    /// Keyed by `workflowId:stepId`
    #[serde(default, with = "crate::state::pairs")]
    pub pending_inputs: BTreeMap<String, PendingInputNote>,
    /// Per-workflow scratch data, keyed by workflow id
    #[serde(default, with = "crate::state::pairs")]
    pub scratch: BTreeMap<String, serde_json::Value>,
    /// Escape hatch for ad hoc agent data
    #[serde(default, with = "crate::state::pairs")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Fixed one-minute window backing the soft request budget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    pub count: u32,
}

/// Durable state of one agent instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub config: AgentConfig,
    pub initialized: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub metrics: Metrics,
    pub active_connections: u32,
    #[serde(default, with = "crate::state::pairs")]
    pub active_workflows: BTreeMap<String, Vec<WorkflowStep>>,
    #[serde(default, with = "crate::state::pairs")]
    pub cache: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub custom_state: CustomState,
    #[serde(default)]
    pub rate_window: RateWindow,
}

impl AgentRecord {
    /// Fresh record with zeroed metrics
    pub fn new(
        agent_type: AgentType,
        agent_id: &str,
        config: AgentConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_type,
            session_id: String::new(),
            user_id: None,
            config,
            initialized: false,
            created_at: now,
            last_active: now,
            metrics: Metrics::default(),
            active_connections: 0,
            active_workflows: BTreeMap::new(),
            cache: BTreeMap::new(),
            custom_state: CustomState::default(),
            rate_window: RateWindow::default(),
        }
    }

    /// Storage key, `{type}:{id}`
    pub fn key(&self) -> String {
        super::store::record_key(self.agent_type, &self.agent_id)
    }

    /// Live cached value; an expired entry is deleted on the way out
    pub fn cache_get(&mut self, key: &str, now_ms: i64) -> Option<serde_json::Value> {
        let live = self.cache.get(key).map(|entry| entry.is_live(now_ms))?;
        if live {
            self.cache.get(key).map(|entry| entry.value.clone())
        } else {
            self.cache.remove(key);
            None
        }
    }

    pub fn cache_put(&mut self, key: &str, value: serde_json::Value, now_ms: i64) {
        let expires_at = now_ms.saturating_add(self.config.cache_ttl_ms as i64);
        self.cache
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Drop every entry that is no longer live; returns how many were removed
    pub fn sweep_cache(&mut self, now_ms: i64) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.is_live(now_ms));
        before - self.cache.len()
    }

    /// Count a request against the soft per-minute budget.
    /// Returns true when the budget for the current window is exceeded.
    pub fn note_request(&mut self, now: DateTime<Utc>) -> bool {
        let window_open = self
            .rate_window
            .window_start
            .map(|start| now - start < Duration::minutes(1))
            .unwrap_or(false);

        if !window_open {
            self.rate_window.window_start = Some(now);
            self.rate_window.count = 0;
        }
        self.rate_window.count += 1;
        self.rate_window.count > self.config.rate_limit_per_minute
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    pub fn step_mut(&mut self, workflow_id: &str, step_id: &str) -> Option<&mut WorkflowStep> {
        self.active_workflows
            .get_mut(workflow_id)?
            .iter_mut()
            .find(|step| step.id == step_id)
    }

    pub fn attach_connection(&mut self) {
        self.active_connections = self.active_connections.saturating_add(1);
    }

    pub fn detach_connection(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }
}
