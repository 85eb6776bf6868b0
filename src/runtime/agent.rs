//! Agent behavior seam
//!
//! An `Agent` is stateless behavior; everything durable lives in the
//! `AgentRuntime` it is handed. `AgentHandle` pairs the two for one identity.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::{AgentRuntime, InitializeParams};
use crate::domain::{AgentType, OperationResult};
use crate::error::Result;

/// Dispatch back into the orchestrator, used by agents that fan out (chat)
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        agent_type: AgentType,
        agent_id: &str,
        action: &str,
        params: Value,
    ) -> OperationResult<Value>;
}

/// What an action handler sees
pub struct AgentContext<'a> {
    pub runtime: &'a Arc<AgentRuntime>,
    pub dispatcher: &'a dyn AgentDispatcher,
}

impl<'a> AgentContext<'a> {
    /// Explicit `sessionId` param, else the session encoded in the agent id
    pub fn session_id(&self, params: &Value) -> String {
        params
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.runtime
                    .agent_type()
                    .session_of(self.runtime.agent_id())
                    .to_string()
            })
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;

    fn description(&self) -> &str;

    /// Action names accepted by `handle_action`
    fn capabilities(&self) -> Vec<String>;

    /// Runs on every `initialize` call, so it must be idempotent
    async fn on_initialize(&self, _runtime: &AgentRuntime) -> Result<()> {
        Ok(())
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value>;
}

/// One live agent identity: runtime state plus behavior
pub struct AgentHandle {
    runtime: Arc<AgentRuntime>,
    agent: Arc<dyn Agent>,
}

impl AgentHandle {
    pub fn new(runtime: Arc<AgentRuntime>, agent: Arc<dyn Agent>) -> Self {
        Self { runtime, agent }
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent.agent_type()
    }

    pub async fn initialize(&self, params: InitializeParams) -> OperationResult<Value> {
        if let Err(e) = self.runtime.initialize(params).await {
            return e.into();
        }
        if let Err(e) = self.agent.on_initialize(&self.runtime).await {
            warn!("Initialize hook failed for {}: {}", self.runtime.agent_id(), e);
            return e.into();
        }
        self.status().await
    }

    /// Initialize with defaults unless the record already is
    pub async fn ensure_initialized(&self, session_id: &str) -> Result<()> {
        if self.runtime.is_initialized().await? {
            return Ok(());
        }
        self.runtime
            .initialize(InitializeParams {
                agent_id: self.runtime.agent_id().to_string(),
                session_id: session_id.to_string(),
                user_id: None,
                config: None,
            })
            .await?;
        self.agent.on_initialize(&self.runtime).await
    }

    pub async fn execute(
        &self,
        dispatcher: &dyn AgentDispatcher,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        let ctx = AgentContext {
            runtime: &self.runtime,
            dispatcher,
        };
        self.agent.handle_action(&ctx, action, params).await
    }

    pub async fn status(&self) -> OperationResult<Value> {
        match self.runtime.status().await {
            Ok(status) => OperationResult::ok(status).into_json(),
            Err(e) => e.into(),
        }
    }
}
