//! Orchestrator
//!
//! Owns the registry and a directory of live actors keyed by
//! `(agent type, agent id)`. Every request for the same identity reaches the
//! same `AgentHandle`, so per-agent state stays serialized by its runtime.

pub mod registry;
pub mod routing;

pub use registry::{AgentInfo, AgentRegistry, RegistryEntry};
pub use routing::{route_query, RouteDecision, ROUTING_RULES};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{AgentType, OperationResult};
use crate::error::{AgentError, Result};
use crate::runtime::{
    AgentDispatcher, AgentHandle, AgentRuntime, Connection, HumanInputResponse, InitializeParams,
};
use crate::state::{AgentConfig, StateStore};

type ActorKey = (AgentType, String);

pub struct Orchestrator {
    registry: AgentRegistry,
    store: Arc<dyn StateStore>,
    defaults: AgentConfig,
    actors: DashMap<ActorKey, Arc<AgentHandle>>,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry, store: Arc<dyn StateStore>, defaults: AgentConfig) -> Self {
        info!("Orchestrator ready with {} agent types", registry.len());
        Self {
            registry,
            store,
            defaults,
            actors: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn route_request(&self, query: &str) -> RouteDecision {
        let decision = route_query(query, &self.registry.types());
        debug!(
            "Routed query to {} (confidence {:.2})",
            decision.agent_type, decision.confidence
        );
        decision
    }

    /// The live handle for one identity, created on first use
    pub fn handle(&self, agent_type: AgentType, agent_id: &str) -> Result<Arc<AgentHandle>> {
        let (agent_id, entry) = self.resolve(agent_type, agent_id)?;
        let handle = self
            .actors
            .entry((agent_type, agent_id.to_string()))
            .or_insert_with(|| {
                debug!("Creating actor {}:{}", agent_type, agent_id);
                self.build_handle(entry, agent_id)
            })
            .value()
            .clone();
        Ok(handle)
    }

    fn resolve<'a>(
        &'a self,
        agent_type: AgentType,
        agent_id: &'a str,
    ) -> Result<(&'a str, &'a RegistryEntry)> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(AgentError::Validation("agentId is required".to_string()));
        }
        let entry = self
            .registry
            .get(agent_type)
            .ok_or_else(|| AgentError::NotFound(format!("agent type {}", agent_type)))?;
        Ok((agent_id, entry))
    }

    fn build_handle(&self, entry: &RegistryEntry, agent_id: &str) -> Arc<AgentHandle> {
        let runtime = AgentRuntime::new(
            entry.agent_type,
            agent_id,
            self.defaults.clone(),
            Arc::clone(&self.store),
        );
        Arc::new(AgentHandle::new(
            Arc::new(runtime),
            Arc::clone(&entry.binding),
        ))
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Drop actors nobody is using: no caller or background task holds the
    /// handle or runtime, no connection is attached and no input is pending.
    /// Their state is already persisted, so the next request reloads it.
    pub fn evict_idle(&self) -> usize {
        let before = self.actors.len();
        self.actors.retain(|_, handle| {
            let runtime = handle.runtime();
            let idle = Arc::strong_count(handle) == 1
                && Arc::strong_count(runtime) == 1
                && runtime.connection_count() == 0
                && runtime.pending_inputs().is_empty();
            !idle
        });
        let evicted = before.saturating_sub(self.actors.len());
        if evicted > 0 {
            debug!("Evicted {} idle actors", evicted);
        }
        evicted
    }

    fn live_handles(&self) -> Vec<Arc<AgentHandle>> {
        self.actors.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Run one action, initializing the agent on first contact.
    /// The callee's result comes back unchanged.
    pub async fn execute_on_agent(
        &self,
        agent_type: AgentType,
        agent_id: &str,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        let handle = match self.handle(agent_type, agent_id) {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let session_id = params
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| agent_type.session_of(agent_id).to_string());
        if let Err(e) = handle.ensure_initialized(&session_id).await {
            warn!("Lazy initialize of {}:{} failed: {}", agent_type, agent_id, e);
            return e.into();
        }

        debug!("{}:{} <- {}", agent_type, agent_id, action);
        handle.execute(self, action, params).await
    }

    pub async fn initialize_agent(
        &self,
        agent_type: AgentType,
        agent_id: &str,
        params: InitializeParams,
    ) -> OperationResult<Value> {
        match self.handle(agent_type, agent_id) {
            Ok(handle) => handle.initialize(params).await,
            Err(e) => e.into(),
        }
    }

    pub async fn get_agent_status(
        &self,
        agent_type: AgentType,
        agent_id: &str,
    ) -> OperationResult<Value> {
        match self.handle(agent_type, agent_id) {
            Ok(handle) => handle.status().await,
            Err(e) => e.into(),
        }
    }

    pub async fn agent_state(&self, agent_type: AgentType, agent_id: &str) -> OperationResult<Value> {
        let handle = match self.handle(agent_type, agent_id) {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        match handle.runtime().state().await {
            Ok(record) => OperationResult::ok(record).into_json(),
            Err(e) => e.into(),
        }
    }

    /// Wipe one identity and forget its actor. Work still holding the old
    /// runtime can no longer write; the next request starts from a fresh record.
    pub async fn reset_agent(&self, agent_type: AgentType, agent_id: &str) -> OperationResult<Value> {
        let (agent_id, entry) = match self.resolve(agent_type, agent_id) {
            Ok(resolved) => resolved,
            Err(e) => return e.into(),
        };
        let key = (agent_type, agent_id.to_string());
        let handle = match self.actors.get(&key) {
            Some(live) => Arc::clone(live.value()),
            None => self.build_handle(entry, agent_id),
        };

        if let Err(e) = handle.runtime().reset().await {
            return e.into();
        }
        self.actors
            .remove_if(&key, |_, live| Arc::ptr_eq(live, &handle));
        handle.runtime().retire();
        OperationResult::ok(json!({ "reset": true, "agentId": agent_id }))
    }

    /// Complete a pending human-input request; unmatched responses are reported, not raised
    pub fn submit_human_input(
        &self,
        agent_type: AgentType,
        agent_id: &str,
        response: HumanInputResponse,
    ) -> OperationResult<Value> {
        let handle = match self.handle(agent_type, agent_id) {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let key = crate::runtime::input_key(&response.workflow_id, &response.step_id);
        let resolved = handle.runtime().resolve_human_input(response);
        OperationResult::ok(json!({ "resolved": resolved, "inputKey": key }))
    }

    pub async fn attach_connection(
        &self,
        agent_type: AgentType,
        agent_id: &str,
    ) -> Result<(Arc<AgentHandle>, Connection)> {
        let handle = self.handle(agent_type, agent_id)?;
        let connection = handle.runtime().attach_connection().await?;
        Ok((handle, connection))
    }

    /// Status of every registered type for one session, in parallel
    pub async fn health_check_all(&self, session_id: &str) -> BTreeMap<String, OperationResult<Value>> {
        let types = self.registry.types();
        let checks = types.iter().map(|agent_type| {
            let agent_id = agent_type.session_agent_id(session_id);
            async move { self.get_agent_status(*agent_type, &agent_id).await }
        });
        let results = join_all(checks).await;

        types
            .iter()
            .map(|t| t.to_string())
            .zip(results)
            .collect()
    }

    /// Conversational entry point: the session's chat agent answers
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        user_id: Option<&str>,
        history: Value,
    ) -> OperationResult<Value> {
        let agent_id = AgentType::Chat.session_agent_id(session_id);
        let mut params = json!({
            "message": message,
            "sessionId": session_id,
            "history": history,
        });
        if let (Some(user_id), Value::Object(map)) = (user_id, &mut params) {
            map.insert("userId".into(), json!(user_id));
        }
        self.execute_on_agent(AgentType::Chat, &agent_id, "chat", params)
            .await
    }

    /// Sweep expired cache entries on every live actor
    /// Sweep expired cache entries on every live actor, then evict idle ones.
    /// Returns the number of cache entries removed.
    pub async fn cleanup_all(&self) -> usize {
        let mut removed = 0;
        for handle in self.live_handles() {
            match handle.runtime().cleanup_cache().await {
                Ok(count) => removed += count,
                Err(e) => warn!(
                    "Cache cleanup failed for {}: {}",
                    handle.runtime().agent_id(),
                    e
                ),
            }
        }
        self.evict_idle();
        removed
    }

    /// Periodic maintenance; the first sweep happens one interval after start
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = orchestrator.cleanup_all().await;
                if removed > 0 {
                    info!(
                        "Maintenance swept {} cache entries across {} actors",
                        removed,
                        orchestrator.actor_count()
                    );
                }
            }
        })
    }
}

#[async_trait]
impl AgentDispatcher for Orchestrator {
    async fn dispatch(
        &self,
        agent_type: AgentType,
        agent_id: &str,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        self.execute_on_agent(agent_type, agent_id, action, params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{default_agents, AgentDeps};
    use crate::state::MemoryStateStore;

    fn orchestrator() -> Orchestrator {
        let registry = AgentRegistry::from_agents(default_agents(AgentDeps::default())).unwrap();
        Orchestrator::new(
            registry,
            Arc::new(MemoryStateStore::new()),
            AgentConfig::default(),
        )
    }

    #[test]
    fn test_handle_is_stable_per_identity() {
        let orchestrator = orchestrator();
        let a = orchestrator.handle(AgentType::Charts, "s1-charts").unwrap();
        let b = orchestrator.handle(AgentType::Charts, "s1-charts").unwrap();
        let c = orchestrator.handle(AgentType::Overview, "s1-charts").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(orchestrator.actor_count(), 2);
        assert!(orchestrator.handle(AgentType::Charts, "  ").is_err());
    }

    #[tokio::test]
    async fn test_unregistered_type_is_a_failed_result() {
        let registry =
            AgentRegistry::from_agents(vec![Arc::new(crate::agents::ChatAgent::new(None))]).unwrap();
        let orchestrator = Orchestrator::new(
            registry,
            Arc::new(MemoryStateStore::new()),
            AgentConfig::default(),
        );
        let result = orchestrator
            .execute_on_agent(AgentType::Trading, "s1-trading", "quote", json!({}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("trading"));
    }

    #[tokio::test]
    async fn test_lazy_initialization_uses_session_from_id() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .execute_on_agent(AgentType::Trading, "s9-trading", "trades", json!({}))
            .await;
        assert!(result.success);

        let status = orchestrator
            .get_agent_status(AgentType::Trading, "s9-trading")
            .await;
        let data = status.data.unwrap();
        assert_eq!(data["initialized"], true);
        assert_eq!(data["sessionId"], "s9");
    }

    #[tokio::test]
    async fn test_health_check_covers_every_type() {
        let orchestrator = orchestrator();
        let health = orchestrator.health_check_all("s1").await;
        assert_eq!(health.len(), 5);
        assert!(health.values().all(|r| r.success));
        assert_eq!(health["charts"].data.as_ref().unwrap()["agentId"], "s1-charts");
    }

    #[tokio::test]
    async fn test_unmatched_human_input_is_reported() {
        let orchestrator = orchestrator();
        let result = orchestrator.submit_human_input(
            AgentType::Trading,
            "s1-trading",
            HumanInputResponse {
                workflow_id: "wf".into(),
                step_id: "approval".into(),
                response: json!(true),
                responder: None,
            },
        );
        assert!(result.success);
        assert_eq!(result.data.unwrap()["resolved"], false);
    }

    #[tokio::test]
    async fn test_reset_and_maintenance_release_actors() {
        let orchestrator = orchestrator();
        orchestrator.get_agent_status(AgentType::Overview, "a").await;
        orchestrator.get_agent_status(AgentType::Charts, "b").await;
        let held = orchestrator.handle(AgentType::Trading, "c").unwrap();
        assert_eq!(orchestrator.actor_count(), 3);

        assert!(orchestrator.reset_agent(AgentType::Overview, "a").await.success);
        assert_eq!(orchestrator.actor_count(), 2);

        orchestrator.cleanup_all().await;
        assert_eq!(orchestrator.actor_count(), 1);

        drop(held);
        orchestrator.cleanup_all().await;
        assert_eq!(orchestrator.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_evicted_actor_reloads_its_state() {
        let orchestrator = orchestrator();
        let init = orchestrator
            .initialize_agent(
                AgentType::Charts,
                "s1-charts",
                InitializeParams {
                    agent_id: "s1-charts".into(),
                    session_id: "s1".into(),
                    user_id: Some("u1".into()),
                    config: None,
                },
            )
            .await;
        assert!(init.success);
        assert_eq!(orchestrator.evict_idle(), 1);

        let status = orchestrator
            .get_agent_status(AgentType::Charts, "s1-charts")
            .await
            .data
            .unwrap();
        assert_eq!(status["initialized"], true);
        assert_eq!(status["sessionId"], "s1");
    }

    #[tokio::test]
    async fn test_reset_of_unseen_agent_creates_no_actor() {
        let orchestrator = orchestrator();
        assert!(orchestrator.reset_agent(AgentType::Chat, "ghost").await.success);
        assert_eq!(orchestrator.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_handle_cannot_write_after_reset() {
        let orchestrator = orchestrator();
        let stale = orchestrator.handle(AgentType::Trading, "s1-trading").unwrap();
        assert!(orchestrator.reset_agent(AgentType::Trading, "s1-trading").await.success);

        assert!(stale.runtime().is_retired());
        let fresh = orchestrator.handle(AgentType::Trading, "s1-trading").unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(!fresh.runtime().is_retired());
    }
}
