pub mod agents;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod runtime;
pub mod sources;
pub mod state;

pub use config::AppConfig;
pub use domain::{AgentType, OperationResult, WsMessage, WsMessageType};
pub use error::{AgentError, Result};
pub use fallback::{fetch_with_fallback, DataSource, FallbackResult};
pub use orchestrator::{AgentRegistry, Orchestrator, RouteDecision};
pub use runtime::{Agent, AgentContext, AgentHandle, AgentRuntime, InitializeParams};
pub use state::{AgentRecord, MemoryStateStore, StateStore};
