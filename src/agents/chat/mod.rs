//! Chat agent: intent detection, parallel fan-out to domain agents, synthesis

pub mod intent;
pub mod synthesis;

pub use intent::{detect_intent, ChatTurn, Intent, IntentCategory};
pub use synthesis::{synthesize_response, AgentReply};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{require_str, str_param, unknown_action};
use crate::domain::{AgentType, OperationResult};
use crate::llm::TextGenerator;
use crate::runtime::{Agent, AgentContext};

const LAST_SYMBOL_KEY: &str = "lastSymbol";
const DEFAULT_SYMBOL: &str = "BTC";
const DEFAULT_TIMEFRAME: &str = "1h";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub intent: Intent,
    pub agents: Vec<AgentReply>,
    pub suggestions: Vec<String>,
}

/// Action and params sent to one agent for this intent
fn plan_call(
    agent_type: AgentType,
    intent: &Intent,
    message: &str,
    session_id: &str,
    user_id: Option<&str>,
) -> (&'static str, Value) {
    let symbol = intent.primary_symbol();
    let (action, mut params) = match agent_type {
        AgentType::Overview => match symbol {
            Some(symbol) => ("get_price", json!({ "symbol": symbol })),
            None => ("get_overview", json!({})),
        },
        AgentType::Charts => (
            "analyze",
            json!({
                "symbol": symbol.unwrap_or(DEFAULT_SYMBOL),
                "timeframe": intent.timeframe.as_deref().unwrap_or(DEFAULT_TIMEFRAME),
            }),
        ),
        AgentType::Trading => {
            let side = if message.to_lowercase().contains("sell") {
                "sell"
            } else {
                "buy"
            };
            (
                "quote",
                json!({
                    "symbol": symbol.unwrap_or(DEFAULT_SYMBOL),
                    "side": side,
                    "amount": 1,
                }),
            )
        }
        AgentType::Intelligence => {
            let wants = |c: IntentCategory| intent.categories.contains(&c);
            match symbol {
                Some(symbol) if wants(IntentCategory::Report) => {
                    ("report", json!({ "symbol": symbol }))
                }
                Some(symbol) if wants(IntentCategory::Sentiment) => {
                    ("sentiment", json!({ "symbol": symbol }))
                }
                Some(symbol) => ("news", json!({ "query": format!("{} crypto", symbol) })),
                None => ("news", json!({ "query": "crypto market" })),
            }
        }
        AgentType::Chat => ("query", json!({})),
    };

    if let Value::Object(map) = &mut params {
        map.insert("sessionId".into(), json!(session_id));
        if let Some(user_id) = user_id {
            map.insert("userId".into(), json!(user_id));
        }
    }
    (action, params)
}

pub struct ChatAgent {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ChatAgent {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    /// One call per distinct agent type, all in flight together
    pub async fn route_to_agents(
        &self,
        ctx: &AgentContext<'_>,
        intent: &Intent,
        message: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Vec<AgentReply> {
        let calls = intent.agent_types().into_iter().map(|agent_type| {
            let (action, params) = plan_call(agent_type, intent, message, session_id, user_id);
            let agent_id = agent_type.session_agent_id(session_id);
            async move {
                let started = Instant::now();
                let result = ctx
                    .dispatcher
                    .dispatch(agent_type, &agent_id, action, params)
                    .await;
                debug!(
                    "chat -> {}/{}: success={}",
                    agent_type, action, result.success
                );
                AgentReply {
                    agent_type,
                    action: action.to_string(),
                    success: result.success,
                    data: result.data,
                    error: result.error,
                    execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                }
            }
        });
        join_all(calls).await
    }

    async fn chat(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let message = match require_str(params, "message") {
            Ok(message) => message,
            Err(e) => return e.into(),
        };
        let history: Vec<ChatTurn> = params
            .get("history")
            .cloned()
            .and_then(|h| serde_json::from_value(h).ok())
            .unwrap_or_default();
        let user_id = str_param(params, "userId");
        let session_id = ctx.session_id(params);

        ctx.runtime
            .execute_operation(None, || async {
                let mut intent = detect_intent(&message, &history);
                if intent.symbols.is_empty() {
                    if let Some(Value::String(last)) = ctx.runtime.extra(LAST_SYMBOL_KEY).await? {
                        intent.symbols.push(last);
                        intent.symbol_inherited = true;
                    }
                }
                if let Some(symbol) = intent.primary_symbol() {
                    ctx.runtime.set_extra(LAST_SYMBOL_KEY, json!(symbol)).await?;
                }
                info!(
                    "Chat intent {} ({} categories) for session {}",
                    intent.primary,
                    intent.categories.len(),
                    session_id
                );

                let agents = self
                    .route_to_agents(ctx, &intent, &message, &session_id, user_id)
                    .await;
                let response = synthesize_response(
                    self.generator.as_deref(),
                    &message,
                    &agents,
                    &history,
                )
                .await;
                let suggestions = synthesis::suggestions(&intent, &agents);

                Ok(ChatReply {
                    response,
                    intent,
                    agents,
                    suggestions,
                })
            })
            .await
            .into_json()
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Chat
    }

    fn description(&self) -> &str {
        "Chat: understands a question, asks the right agents in parallel and answers in plain language"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["chat".into(), "query".into()]
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        match action {
            "chat" => self.chat(ctx, &params).await,
            "query" => {
                let mut params = params;
                if params.get("message").is_none() {
                    if let Some(query) = params.get("query").cloned() {
                        if let Value::Object(map) = &mut params {
                            map.insert("message".into(), query);
                        }
                    }
                }
                self.chat(ctx, &params).await
            }
            other => unknown_action(AgentType::Chat, other),
        }
    }
}
