//! Agent Runtime
//!
//! One `AgentRuntime` exists per `(type, id)` identity. All mutations of the
//! agent record go through a single async lock, so operations on one agent are
//! serialized while different agents run independently. Operation bodies run
//! outside that lock; only the cache check and the bookkeeping around them hold it.

pub mod agent;
pub mod connections;
pub mod human_input;

pub use agent::{Agent, AgentContext, AgentDispatcher, AgentHandle};
pub use connections::{Connection, ConnectionHub};
pub use human_input::{input_key, HumanInputRequest, HumanInputResponse, HumanInputTable};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{AgentType, OperationResult, WsMessage, WsMessageType};
use crate::error::{AgentError, Result};
use crate::state::{
    record_key, AgentConfig, AgentConfigOverrides, AgentRecord, Metrics, PendingInputNote,
    StateStore, StepStatus, WorkflowStep,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub agent_id: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub config: Option<AgentConfigOverrides>,
}

/// Snapshot returned by `status()`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusReport {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub session_id: String,
    pub initialized: bool,
    pub config: AgentConfig,
    pub metrics: Metrics,
    pub active_connections: u32,
    pub active_workflows: usize,
    pub cache_entries: usize,
    pub pending_inputs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

pub struct AgentRuntime {
    agent_type: AgentType,
    agent_id: String,
    defaults: AgentConfig,
    store: Arc<dyn StateStore>,
    /// `None` until first touched; loaded from the store or synthesized then
    record: Mutex<Option<AgentRecord>>,
    connections: ConnectionHub,
    pending: HumanInputTable,
    /// Set once the orchestrator has dropped this instance after a reset
    retired: AtomicBool,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("operation panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("operation panicked: {}", s)
    } else {
        "operation panicked".to_string()
    }
}

/// Recorded deadlines are capped at roughly a century out
const MAX_EXPIRY_HORIZON_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

fn expiry_after(now: DateTime<Utc>, timeout_ms: u64) -> DateTime<Utc> {
    let ms = timeout_ms.min(MAX_EXPIRY_HORIZON_MS);
    now + chrono::Duration::milliseconds(ms as i64)
}

impl AgentRuntime {
    pub fn new(
        agent_type: AgentType,
        agent_id: impl Into<String>,
        defaults: AgentConfig,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            agent_type,
            agent_id: agent_id.into(),
            defaults,
            store,
            record: Mutex::new(None),
            connections: ConnectionHub::new(),
            pending: HumanInputTable::new(),
            retired: AtomicBool::new(false),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn key(&self) -> String {
        record_key(self.agent_type, &self.agent_id)
    }

    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<AgentRecord>,
    ) -> Result<&'a mut AgentRecord> {
        if slot.is_none() {
            let record = match self.store.load(&self.key()).await? {
                Some(record) => record,
                None => AgentRecord::new(
                    self.agent_type,
                    &self.agent_id,
                    self.defaults.clone(),
                    Utc::now(),
                ),
            };
            *slot = Some(record);
        }
        slot.as_mut()
            .ok_or_else(|| AgentError::Unknown("agent record unavailable".to_string()))
    }

    /// Stop persisting. Work still holding this instance can no longer write
    /// a record back after the identity was reset and handed to a new instance.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_retired() {
            return Err(AgentError::Operation(format!(
                "agent {} was reset",
                self.key()
            )));
        }
        Ok(())
    }

    /// Apply `f` to the record under the actor lock, then persist it
    async fn mutate<R>(&self, f: impl FnOnce(&mut AgentRecord) -> R) -> Result<R> {
        self.ensure_active()?;
        let mut guard = self.record.lock().await;
        let record = self.ensure_loaded(&mut guard).await?;
        let out = f(record);
        self.store.save(record).await?;
        Ok(out)
    }

    /// Like `mutate`, but a missing record stays missing. Persists only when
    /// `f` reports a change.
    async fn mutate_existing<R>(
        &self,
        f: impl FnOnce(&mut AgentRecord) -> Option<R>,
    ) -> Result<Option<R>> {
        self.ensure_active()?;
        let mut guard = self.record.lock().await;
        if guard.is_none() {
            match self.store.load(&self.key()).await? {
                Some(record) => *guard = Some(record),
                None => return Ok(None),
            }
        }
        let Some(record) = guard.as_mut() else {
            return Ok(None);
        };
        let out = f(record);
        if out.is_some() {
            self.store.save(record).await?;
        }
        Ok(out)
    }

    async fn read<R>(&self, f: impl FnOnce(&AgentRecord) -> R) -> Result<R> {
        let mut guard = self.record.lock().await;
        let record = self.ensure_loaded(&mut guard).await?;
        Ok(f(record))
    }

    /// Idempotent: a second call keeps session, metrics and cache untouched.
    /// Config overrides are merged on every call. Returns true on first initialization.
    pub async fn initialize(&self, params: InitializeParams) -> Result<bool> {
        if params.agent_id.is_empty() {
            return Err(AgentError::Validation("agentId is required".to_string()));
        }
        if params.agent_id != self.agent_id {
            return Err(AgentError::Validation(format!(
                "agentId {} does not match agent {}",
                params.agent_id, self.agent_id
            )));
        }
        if params.session_id.is_empty() {
            return Err(AgentError::Validation("sessionId is required".to_string()));
        }

        let now = Utc::now();
        let first = self
            .mutate(|record| {
                let first = !record.initialized;
                if first {
                    record.initialized = true;
                    record.session_id = params.session_id.clone();
                    record.user_id = params.user_id.clone();
                } else if record.user_id.is_none() {
                    record.user_id = params.user_id.clone();
                }
                if let Some(overrides) = &params.config {
                    record.config.apply(overrides);
                }
                record.touch(now);
                first
            })
            .await?;

        if first {
            info!(
                "Initialized {} agent {} for session {}",
                self.agent_type, self.agent_id, params.session_id
            );
        } else {
            debug!("Agent {} already initialized", self.agent_id);
        }
        Ok(first)
    }

    pub async fn is_initialized(&self) -> Result<bool> {
        self.read(|record| record.initialized).await
    }

    pub async fn config(&self) -> Result<AgentConfig> {
        self.read(|record| record.config.clone()).await
    }

    /// Run an operation with caching, timing and metrics.
    ///
    /// A live cache entry under `cache_key` short-circuits `op`. Errors and
    /// panics inside `op` become a failed result; they are never re-raised.
    pub async fn execute_operation<T, F, Fut>(
        &self,
        cache_key: Option<&str>,
        op: F,
    ) -> OperationResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();

        if let Some(key) = cache_key {
            match self.try_cache_hit::<T>(key, started).await {
                Ok(Some(result)) => return result,
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed for {}: {}", self.agent_id, e),
            }
        }

        let outcome = match AssertUnwindSafe(op()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(AgentError::Unknown(panic_message(payload.as_ref()))),
        };
        let elapsed = elapsed_ms(started);
        let now = Utc::now();

        match outcome {
            Ok(data) => {
                let cached = cache_key.and_then(|key| {
                    serde_json::to_value(&data)
                        .ok()
                        .map(|value| (key.to_string(), value))
                });
                let persisted = self
                    .mutate(|record| {
                        if let Some((key, value)) = cached {
                            if record.config.cache_enabled {
                                record.cache_put(&key, value, now.timestamp_millis());
                            }
                        }
                        record.metrics.record_request(elapsed, true, false, now);
                        record.touch(now);
                        record.note_request(now)
                    })
                    .await;
                self.after_request(persisted);
                OperationResult::ok(data).with_timing(elapsed)
            }
            Err(e) => {
                warn!(kind = e.kind(), "Operation on {} failed: {}", self.agent_id, e);
                let persisted = self
                    .mutate(|record| {
                        record.metrics.record_request(elapsed, false, false, now);
                        record.touch(now);
                        record.note_request(now)
                    })
                    .await;
                self.after_request(persisted);
                self.notify(
                    WsMessageType::Error,
                    json!({ "kind": e.kind(), "error": e.to_string() }),
                )
                .await;
                OperationResult::failed(e.to_string()).with_timing(elapsed)
            }
        }
    }

    async fn try_cache_hit<T: DeserializeOwned>(
        &self,
        key: &str,
        started: Instant,
    ) -> Result<Option<OperationResult<T>>> {
        self.ensure_active()?;
        let mut guard = self.record.lock().await;
        let record = self.ensure_loaded(&mut guard).await?;
        if !record.config.cache_enabled {
            return Ok(None);
        }

        let now = Utc::now();
        let value = match record.cache_get(key, now.timestamp_millis()) {
            Some(value) => value,
            None => return Ok(None),
        };
        let data: T = match serde_json::from_value(value) {
            Ok(data) => data,
            Err(e) => {
                debug!("Evicting unreadable cache entry {}: {}", key, e);
                record.cache.remove(key);
                return Ok(None);
            }
        };

        let elapsed = elapsed_ms(started);
        record.metrics.record_request(elapsed, true, true, now);
        record.touch(now);
        let over_budget = record.note_request(now);
        let persisted = self.store.save(record).await.map(|_| over_budget);
        drop(guard);

        self.after_request(persisted);
        Ok(Some(
            OperationResult::ok(data)
                .with_cache_hit(true)
                .with_timing(elapsed),
        ))
    }

    fn after_request(&self, persisted: Result<bool>) {
        match persisted {
            Ok(true) => warn!(
                "Agent {} exceeded its per-minute request budget",
                self.agent_id
            ),
            Ok(false) => {}
            Err(e) => error!("Failed to persist state for {}: {}", self.agent_id, e),
        }
    }

    /// Delete cache entries that are no longer live
    pub async fn cleanup_cache(&self) -> Result<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let removed = self.mutate(|record| record.sweep_cache(now_ms)).await?;
        if removed > 0 {
            debug!("Swept {} expired cache entries from {}", removed, self.agent_id);
        }
        Ok(removed)
    }

    /// Periodic cache sweep; runs until the handle is aborted
    pub fn spawn_cache_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = runtime.cleanup_cache().await {
                    warn!("Cache cleanup failed for {}: {}", runtime.agent_id, e);
                }
            }
        })
    }

    // ==================== Connections ====================

    /// Register a live connection; it receives an `agent_status` message first
    pub async fn attach_connection(&self) -> Result<Connection> {
        let connection = self.connections.attach();
        self.mutate(|record| record.attach_connection()).await?;

        match self.status().await {
            Ok(status) => {
                let payload = serde_json::to_value(&status)?;
                let message =
                    WsMessage::new(WsMessageType::AgentStatus, &self.agent_id, payload);
                self.connections.send(&connection.id, message);
            }
            Err(e) => warn!("Could not build status for new connection: {}", e),
        }
        Ok(connection)
    }

    pub async fn detach_connection(&self, connection_id: &str) -> Result<()> {
        if self.connections.detach(connection_id) {
            self.mutate(|record| record.detach_connection()).await?;
            debug!("Detached connection {} from {}", connection_id, self.agent_id);
        }
        Ok(())
    }

    /// Deliver to every attached connection. Connections that fail are detached.
    pub async fn broadcast(&self, message: WsMessage) {
        let failed = self.connections.broadcast(&message);
        for id in failed {
            if let Err(e) = self.detach_connection(&id).await {
                warn!("Failed to detach dead connection {}: {}", id, e);
            }
        }
    }

    pub async fn notify(&self, message_type: WsMessageType, data: Value) {
        self.broadcast(WsMessage::new(message_type, &self.agent_id, data))
            .await;
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ==================== Workflows ====================

    /// Register a workflow with one pending step per name
    pub async fn start_workflow(
        &self,
        workflow_id: &str,
        steps: &[(&str, &str)],
    ) -> Result<Vec<WorkflowStep>> {
        if steps.is_empty() {
            return Err(AgentError::Validation(
                "workflow needs at least one step".to_string(),
            ));
        }
        let created: Vec<WorkflowStep> = steps
            .iter()
            .map(|(id, name)| WorkflowStep::new(*id, *name))
            .collect();

        let inserted = self
            .mutate(|record| {
                if record.active_workflows.contains_key(workflow_id) {
                    return false;
                }
                record
                    .active_workflows
                    .insert(workflow_id.to_string(), created.clone());
                true
            })
            .await?;
        if !inserted {
            return Err(AgentError::Validation(format!(
                "workflow {} already exists",
                workflow_id
            )));
        }

        self.notify(
            WsMessageType::WorkflowStatus,
            json!({ "workflowId": workflow_id, "steps": created }),
        )
        .await;
        Ok(created)
    }

    /// Transition one step and broadcast the new state
    pub async fn update_step(
        &self,
        workflow_id: &str,
        step_id: &str,
        status: StepStatus,
        data: Option<Value>,
        error: Option<String>,
    ) -> Result<WorkflowStep> {
        let now = Utc::now();
        let step = self
            .mutate(|record| {
                let step = record.step_mut(workflow_id, step_id).ok_or_else(|| {
                    AgentError::NotFound(format!("step {} in workflow {}", step_id, workflow_id))
                })?;
                step.transition(status, now)?;
                if data.is_some() {
                    step.data = data;
                }
                if error.is_some() {
                    step.error = error;
                }
                Ok::<_, AgentError>(step.clone())
            })
            .await??;

        self.notify(
            WsMessageType::WorkflowStatus,
            json!({ "workflowId": workflow_id, "step": step }),
        )
        .await;
        Ok(step)
    }

    pub async fn workflow(&self, workflow_id: &str) -> Result<Option<Vec<WorkflowStep>>> {
        self.read(|record| record.active_workflows.get(workflow_id).cloned())
            .await
    }

    pub async fn remove_workflow(&self, workflow_id: &str) -> Result<bool> {
        self.mutate(|record| {
            record.custom_state.scratch.remove(workflow_id);
            record.active_workflows.remove(workflow_id).is_some()
        })
        .await
    }

    /// Workflow-scoped scratch value
    pub async fn set_scratch(&self, workflow_id: &str, value: Value) -> Result<()> {
        self.mutate(|record| {
            record
                .custom_state
                .scratch
                .insert(workflow_id.to_string(), value);
        })
        .await
    }

    pub async fn scratch(&self, workflow_id: &str) -> Result<Option<Value>> {
        self.read(|record| record.custom_state.scratch.get(workflow_id).cloned())
            .await
    }

    /// Agent-specific persisted value, e.g. a trade ledger
    pub async fn set_extra(&self, key: &str, value: Value) -> Result<()> {
        self.mutate(|record| {
            record.custom_state.extra.insert(key.to_string(), value);
        })
        .await
    }

    /// Read-modify-write of one `extra` value under the record lock
    pub async fn update_extra<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.mutate(|record| {
            let slot = record
                .custom_state
                .extra
                .entry(key.to_string())
                .or_insert(Value::Null);
            f(slot)
        })
        .await
    }

    pub async fn extra(&self, key: &str) -> Result<Option<Value>> {
        self.read(|record| record.custom_state.extra.get(key).cloned())
            .await
    }

    // ==================== Human input ====================

    /// Suspend until a matching response arrives or the timeout elapses.
    ///
    /// Returns `None` on timeout or cancellation. The step is marked
    /// `awaiting_input` while the request is open; moving it on afterwards is
    /// the caller's job.
    pub async fn request_human_input(
        &self,
        request: HumanInputRequest,
    ) -> Option<HumanInputResponse> {
        let key = input_key(&request.workflow_id, &request.step_id);
        let timeout_ms = match request.timeout_ms {
            Some(ms) => ms,
            None => self
                .config()
                .await
                .map(|c| c.human_input_timeout_ms)
                .unwrap_or(self.defaults.human_input_timeout_ms),
        };
        let mut receiver = self.pending.register(&key);

        let now = Utc::now();
        let note = PendingInputNote {
            workflow_id: request.workflow_id.clone(),
            step_id: request.step_id.clone(),
            prompt: request.prompt.clone(),
            options: request.options.clone(),
            requested_at: now,
            expires_at: expiry_after(now, timeout_ms),
        };
        let marked = self
            .mutate(|record| {
                if let Some(step) = record.step_mut(&request.workflow_id, &request.step_id) {
                    if step.status == StepStatus::Pending {
                        if let Err(e) = step.transition(StepStatus::InProgress, now) {
                            warn!("Step {} cannot start: {}", request.step_id, e);
                        }
                    }
                    if let Err(e) = step.transition(StepStatus::AwaitingInput, now) {
                        warn!("Step {} cannot await input: {}", request.step_id, e);
                    }
                }
                record.custom_state.pending_inputs.insert(key.clone(), note);
            })
            .await;
        if let Err(e) = marked {
            error!("Failed to persist pending input {}: {}", key, e);
        }

        self.notify(
            WsMessageType::HumanInputRequired,
            json!({
                "workflowId": request.workflow_id,
                "stepId": request.step_id,
                "prompt": request.prompt,
                "options": request.options,
                "timeoutMs": timeout_ms,
                "data": request.data,
            }),
        )
        .await;
        info!("Awaiting human input {} ({}ms)", key, timeout_ms);

        let response =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut receiver).await {
                Ok(Ok(response)) => Some(response),
                Ok(Err(_)) => {
                    debug!("Human input {} was cancelled", key);
                    None
                }
                Err(_) => {
                    self.pending.cancel(&key);
                    // A response may have landed between the deadline and the cancel
                    let late = receiver.try_recv().ok();
                    if late.is_none() {
                        warn!("Human input {} timed out", key);
                    }
                    late
                }
            };

        // A reset while waiting already removed the note together with the record
        let cleared = self
            .mutate_existing(|record| record.custom_state.pending_inputs.remove(&key))
            .await;
        match cleared {
            Ok(_) => {}
            Err(e) if self.is_retired() => debug!("Skipped clearing input {}: {}", key, e),
            Err(e) => error!("Failed to clear pending input {}: {}", key, e),
        }
        response
    }

    /// Deliver a response; false when no request with that key is waiting
    pub fn resolve_human_input(&self, response: HumanInputResponse) -> bool {
        let key = input_key(&response.workflow_id, &response.step_id);
        let delivered = self.pending.resolve(response);
        if delivered {
            info!("Resolved human input {}", key);
        } else {
            debug!("No pending human input for {}", key);
        }
        delivered
    }

    pub fn pending_inputs(&self) -> Vec<String> {
        self.pending.pending_keys()
    }

    // ==================== Introspection ====================

    pub async fn status(&self) -> Result<AgentStatusReport> {
        let pending_inputs = self.pending.pending_keys();
        self.read(|record| AgentStatusReport {
            agent_id: record.agent_id.clone(),
            agent_type: record.agent_type,
            session_id: record.session_id.clone(),
            initialized: record.initialized,
            config: record.config.clone(),
            metrics: record.metrics.clone(),
            active_connections: record.active_connections,
            active_workflows: record.active_workflows.len(),
            cache_entries: record.cache.len(),
            pending_inputs,
            created_at: record.created_at,
            last_active: record.last_active,
        })
        .await
    }

    /// Full record snapshot
    pub async fn state(&self) -> Result<AgentRecord> {
        self.read(|record| record.clone()).await
    }

    /// Delete persisted state and return to uninitialized.
    /// Open connections are closed and pending inputs cancelled.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.record.lock().await;
        self.store.reset(&self.key()).await?;
        *guard = None;
        drop(guard);

        let closed = self.connections.close_all();
        let cancelled = self.pending.cancel_all();
        info!(
            "Reset agent {} ({} connections closed, {} inputs cancelled)",
            self.agent_id, closed, cancelled
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(
            AgentType::Overview,
            "s1-overview",
            AgentConfig::default(),
            Arc::new(MemoryStateStore::new()),
        )
    }

    fn init_params() -> InitializeParams {
        InitializeParams {
            agent_id: "s1-overview".into(),
            session_id: "s1".into(),
            user_id: None,
            config: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let rt = runtime();
        assert!(rt.initialize(init_params()).await.unwrap());
        rt.execute_operation(Some("k"), || async { Ok(1u32) }).await;

        assert!(!rt.initialize(init_params()).await.unwrap());
        let state = rt.state().await.unwrap();
        assert!(state.initialized);
        assert_eq!(state.session_id, "s1");
        assert_eq!(state.metrics.total_requests, 1);
        assert_eq!(state.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_rejects_mismatched_id() {
        let rt = runtime();
        let mut params = init_params();
        params.agent_id = "other".into();
        assert!(matches!(
            rt.initialize(params).await,
            Err(AgentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_operation() {
        let rt = runtime();
        let calls = AtomicUsize::new(0);

        let first = rt
            .execute_operation(Some("price:BTC"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42.0f64)
            })
            .await;
        let second = rt
            .execute_operation(Some("price:BTC"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0.0f64)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.data, Some(42.0));

        let metrics = rt.status().await.unwrap().metrics;
        assert_eq!(metrics.total_requests, 2);
        assert!((metrics.cache_hit_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_becomes_result() {
        let rt = runtime();
        let result: OperationResult<u32> = rt
            .execute_operation(Some("k"), || async {
                Err::<u32, _>(AgentError::Operation("upstream down".into()))
            })
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("upstream down"));

        let state = rt.state().await.unwrap();
        assert_eq!(state.metrics.failed_requests, 1);
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_result() {
        let rt = runtime();
        let result: OperationResult<u32> = rt
            .execute_operation(None, || async {
                if true {
                    panic!("bad input");
                }
                Ok(0u32)
            })
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("bad input"));
    }

    #[tokio::test]
    async fn test_cache_disabled_always_runs() {
        let rt = runtime();
        let mut params = init_params();
        params.config = Some(AgentConfigOverrides {
            cache_enabled: Some(false),
            ..Default::default()
        });
        rt.initialize(params).await.unwrap();

        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            rt.execute_operation(Some("k"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1u8)
            })
            .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_human_input_times_out() {
        let rt = runtime();
        let response = rt
            .request_human_input(HumanInputRequest {
                workflow_id: "wf".into(),
                step_id: "approve".into(),
                prompt: "Approve?".into(),
                options: vec!["yes".into(), "no".into()],
                timeout_ms: Some(50),
                data: None,
            })
            .await;
        assert!(response.is_none());
        assert!(rt.pending_inputs().is_empty());
        assert!(rt
            .state()
            .await
            .unwrap()
            .custom_state
            .pending_inputs
            .is_empty());
    }

    #[tokio::test]
    async fn test_human_input_resolved() {
        let rt = Arc::new(runtime());
        rt.start_workflow("wf", &[("approve", "Approval")])
            .await
            .unwrap();

        let waiter = {
            let rt = Arc::clone(&rt);
            tokio::spawn(async move {
                rt.request_human_input(HumanInputRequest {
                    workflow_id: "wf".into(),
                    step_id: "approve".into(),
                    prompt: "Approve?".into(),
                    options: vec![],
                    timeout_ms: Some(5_000),
                    data: None,
                })
                .await
            })
        };

        while rt
            .state()
            .await
            .unwrap()
            .custom_state
            .pending_inputs
            .is_empty()
        {
            tokio::task::yield_now().await;
        }
        let steps = rt.workflow("wf").await.unwrap().unwrap();
        assert_eq!(steps[0].status, StepStatus::AwaitingInput);

        assert!(rt.resolve_human_input(HumanInputResponse {
            workflow_id: "wf".into(),
            step_id: "approve".into(),
            response: json!({"approved": true}),
            responder: Some("alice".into()),
        }));
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.responder.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_resolve_without_request() {
        let rt = runtime();
        assert!(!rt.resolve_human_input(HumanInputResponse {
            workflow_id: "wf".into(),
            step_id: "x".into(),
            response: Value::Null,
            responder: None,
        }));
    }

    #[tokio::test]
    async fn test_connection_receives_status_then_broadcasts() {
        let rt = runtime();
        let mut conn = rt.attach_connection().await.unwrap();

        let first = conn.receiver.recv().await.unwrap();
        assert_eq!(first.message_type, WsMessageType::AgentStatus);
        assert_eq!(first.data["activeConnections"], 1);

        rt.notify(WsMessageType::DataUpdate, json!({"x": 1})).await;
        let second = conn.receiver.recv().await.unwrap();
        assert_eq!(second.message_type, WsMessageType::DataUpdate);

        rt.detach_connection(&conn.id).await.unwrap();
        assert_eq!(rt.status().await.unwrap().active_connections, 0);
    }

    #[tokio::test]
    async fn test_dead_connection_is_detached_on_broadcast() {
        let rt = runtime();
        let conn = rt.attach_connection().await.unwrap();
        drop(conn.receiver);

        rt.notify(WsMessageType::DataUpdate, json!({})).await;
        assert_eq!(rt.connection_count(), 0);
        assert_eq!(rt.status().await.unwrap().active_connections, 0);
    }

    #[tokio::test]
    async fn test_workflow_step_transitions() {
        let rt = runtime();
        rt.start_workflow("wf", &[("validate", "Validate"), ("record", "Record")])
            .await
            .unwrap();

        rt.update_step("wf", "validate", StepStatus::InProgress, None, None)
            .await
            .unwrap();
        let done = rt
            .update_step("wf", "validate", StepStatus::Completed, Some(json!(1)), None)
            .await
            .unwrap();
        assert!(done.end_time.is_some());

        let err = rt
            .update_step("wf", "record", StepStatus::Completed, None, None)
            .await;
        assert!(matches!(err, Err(AgentError::InvalidTransition { .. })));
        assert!(matches!(
            rt.update_step("wf", "missing", StepStatus::InProgress, None, None)
                .await,
            Err(AgentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_to_uninitialized() {
        let store = Arc::new(MemoryStateStore::new());
        let rt = AgentRuntime::new(
            AgentType::Overview,
            "s1-overview",
            AgentConfig::default(),
            store.clone(),
        );
        rt.initialize(init_params()).await.unwrap();
        assert_eq!(store.len(), 1);

        rt.reset().await.unwrap();
        assert!(store.is_empty());
        assert!(!rt.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_entries() {
        let rt = runtime();
        let mut params = init_params();
        params.config = Some(AgentConfigOverrides {
            cache_ttl_ms: Some(1),
            ..Default::default()
        });
        rt.initialize(params).await.unwrap();
        rt.execute_operation(Some("k"), || async { Ok(1u8) }).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(rt.cleanup_cache().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_state_survives_new_runtime() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let rt = AgentRuntime::new(
            AgentType::Overview,
            "s1-overview",
            AgentConfig::default(),
            store.clone(),
        );
        rt.initialize(init_params()).await.unwrap();
        rt.execute_operation(None, || async { Ok(1u8) }).await;

        let reloaded = AgentRuntime::new(
            AgentType::Overview,
            "s1-overview",
            AgentConfig::default(),
            store,
        );
        let state = reloaded.state().await.unwrap();
        assert!(state.initialized);
        assert_eq!(state.metrics.total_requests, 1);
    }

    fn approval(timeout_ms: u64) -> HumanInputRequest {
        HumanInputRequest {
            workflow_id: "wf".into(),
            step_id: "approve".into(),
            prompt: "Approve?".into(),
            options: vec![],
            timeout_ms: Some(timeout_ms),
            data: None,
        }
    }

    async fn wait_for_note(rt: &AgentRuntime) -> PendingInputNote {
        loop {
            let state = rt.state().await.unwrap();
            if let Some(note) = state.custom_state.pending_inputs.values().next() {
                return note.clone();
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_input_waits_full_timeout() {
        let rt = runtime();
        let started = tokio::time::Instant::now();
        let response = rt.request_human_input(approval(50)).await;
        assert!(response.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pending_input_does_not_block_operations() {
        let rt = Arc::new(runtime());
        let waiter = {
            let rt = Arc::clone(&rt);
            tokio::spawn(async move { rt.request_human_input(approval(60_000)).await })
        };
        wait_for_note(&rt).await;

        let op = tokio::time::timeout(
            Duration::from_secs(1),
            rt.execute_operation(None, || async { Ok(7u8) }),
        )
        .await
        .expect("operation blocked by pending input");
        assert_eq!(op.data, Some(7));
        let status = tokio::time::timeout(Duration::from_secs(1), rt.status())
            .await
            .expect("status blocked by pending input")
            .unwrap();
        assert_eq!(status.pending_inputs, vec!["wf:approve".to_string()]);
        assert!(!waiter.is_finished());

        assert!(rt.resolve_human_input(HumanInputResponse {
            workflow_id: "wf".into(),
            step_id: "approve".into(),
            response: json!({"approved": false}),
            responder: None,
        }));
        assert!(waiter.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reset_is_not_undone_by_cancelled_waiter() {
        let store = Arc::new(MemoryStateStore::new());
        let rt = Arc::new(AgentRuntime::new(
            AgentType::Trading,
            "s1-trading",
            AgentConfig::default(),
            store.clone(),
        ));
        let waiter = {
            let rt = Arc::clone(&rt);
            tokio::spawn(async move { rt.request_human_input(approval(10_000)).await })
        };
        wait_for_note(&rt).await;
        assert_eq!(store.len(), 1);

        rt.reset().await.unwrap();
        assert!(waiter.await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_expire_immediately() {
        let rt = Arc::new(runtime());
        let waiter = {
            let rt = Arc::clone(&rt);
            tokio::spawn(async move { rt.request_human_input(approval(u64::MAX)).await })
        };
        let note = wait_for_note(&rt).await;
        assert!(note.expires_at > note.requested_at);

        rt.resolve_human_input(HumanInputResponse {
            workflow_id: "wf".into(),
            step_id: "approve".into(),
            response: Value::Null,
            responder: None,
        });
        assert!(waiter.await.unwrap().is_some());
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc::now();
        let capped = expiry_after(now, u64::MAX);
        assert!(capped > now + chrono::Duration::days(365 * 99));
        assert_eq!(capped, expiry_after(now, MAX_EXPIRY_HORIZON_MS));
        assert_eq!(
            expiry_after(now, 50),
            now + chrono::Duration::milliseconds(50)
        );
    }

    #[tokio::test]
    async fn test_failed_operation_broadcasts_error() {
        let rt = runtime();
        let mut conn = rt.attach_connection().await.unwrap();
        conn.receiver.recv().await.unwrap();

        let result: OperationResult<u8> = rt
            .execute_operation(None, || async {
                Err::<u8, _>(AgentError::Timeout("feed too slow".into()))
            })
            .await;
        assert!(!result.success);

        let message = conn.receiver.recv().await.unwrap();
        assert_eq!(message.message_type, WsMessageType::Error);
        assert_eq!(message.data["kind"], "timeout");
        assert!(message.data["error"]
            .as_str()
            .unwrap()
            .contains("feed too slow"));
    }

    #[tokio::test]
    async fn test_retired_runtime_stops_persisting() {
        let store = Arc::new(MemoryStateStore::new());
        let rt = AgentRuntime::new(
            AgentType::Overview,
            "s1-overview",
            AgentConfig::default(),
            store.clone(),
        );
        rt.retire();
        assert!(rt.set_extra("k", json!(1)).await.is_err());
        let result = rt.execute_operation(None, || async { Ok(1u8) }).await;
        assert!(result.success);
        assert!(store.is_empty());
    }
}
