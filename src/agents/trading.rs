//! Trading agent: quotes and human-approved trade proposals
//!
//! Nothing is executed on a venue. An approved proposal produces a ticket in
//! the agent's ledger; the approval step is a human-input request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{amount_param, str_param, symbol_param, unknown_action, AgentDeps};
use crate::domain::{AgentType, OperationResult, TradeSide, WsMessageType};
use crate::error::{AgentError, Result};
use crate::runtime::{Agent, AgentContext, AgentRuntime, HumanInputRequest, HumanInputResponse};
use crate::state::StepStatus;

const LEDGER_KEY: &str = "trades";
const APPROVAL_STEP: &str = "approval";
const WORKFLOW_STEPS: [(&str, &str); 4] = [
    ("validate", "Validate request"),
    ("price", "Fetch price"),
    (APPROVAL_STEP, "Human approval"),
    ("record", "Record trade"),
];

/// 10 bps
fn fee_rate() -> Decimal {
    Decimal::new(1, 3)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub amount: Decimal,
}

impl TradeRequest {
    pub fn from_params(params: &Value) -> Result<Self> {
        let symbol = symbol_param(params)?;
        let side = match str_param(params, "side").map(str::to_lowercase).as_deref() {
            Some("buy") | None => TradeSide::Buy,
            Some("sell") => TradeSide::Sell,
            Some(other) => {
                return Err(AgentError::Validation(format!("invalid side: {}", other)))
            }
        };
        let amount = amount_param(params)?;
        Ok(Self {
            symbol,
            side,
            amount,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeQuote {
    pub symbol: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub notional: Decimal,
    pub estimated_fee: Decimal,
    /// Cash out for a buy, cash in for a sell
    pub total: Decimal,
    pub source: String,
    pub quoted_at: DateTime<Utc>,
}

impl TradeQuote {
    pub fn new(request: &TradeRequest, price: Decimal, source: &str) -> Self {
        let notional = (request.amount * price).round_dp(8);
        let estimated_fee = (notional * fee_rate()).round_dp(8);
        let total = match request.side {
            TradeSide::Buy => notional + estimated_fee,
            TradeSide::Sell => notional - estimated_fee,
        };
        Self {
            symbol: request.symbol.clone(),
            side: request.side,
            amount: request.amount,
            price,
            notional,
            estimated_fee,
            total,
            source: source.to_string(),
            quoted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeTicket {
    pub ticket_id: String,
    pub workflow_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOutcome {
    pub workflow_id: String,
    pub status: ProposalStatus,
    pub quote: TradeQuote,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TradeTicket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
}

/// `true`, `{"approved": true}` or an affirmative word
pub fn is_approval(response: &Value) -> bool {
    match response {
        Value::Bool(approved) => *approved,
        Value::Object(map) => map.get("approved").map(is_approval).unwrap_or(false),
        Value::String(answer) => matches!(
            answer.trim().to_lowercase().as_str(),
            "approve" | "approved" | "yes" | "y" | "confirm"
        ),
        _ => false,
    }
}

/// One proposal's run through validate → price → approval → record
struct TradeWorkflow {
    runtime: Arc<AgentRuntime>,
    deps: AgentDeps,
    workflow_id: String,
    params: Value,
    approval_timeout_ms: Option<u64>,
}

impl TradeWorkflow {
    async fn fail(&self, step: &str, error: &AgentError) -> Result<()> {
        self.runtime
            .update_step(&self.workflow_id, step, StepStatus::Failed, None, Some(error.to_string()))
            .await
            .map(|_| ())
    }

    async fn run(&self) -> Result<ProposalOutcome> {
        let rt = &self.runtime;
        let wf = self.workflow_id.as_str();

        rt.update_step(wf, "validate", StepStatus::InProgress, None, None)
            .await?;
        let request = match TradeRequest::from_params(&self.params) {
            Ok(request) => request,
            Err(e) => {
                self.fail("validate", &e).await?;
                return Err(e);
            }
        };
        rt.update_step(wf, "validate", StepStatus::Completed, Some(json!(request)), None)
            .await?;

        rt.update_step(wf, "price", StepStatus::InProgress, None, None)
            .await?;
        let quote = match self.deps.fetch_price(&request.symbol).await {
            Ok(lookup) => TradeQuote::new(&request, lookup.quote.price, &lookup.source),
            Err(e) => {
                self.fail("price", &e).await?;
                return Err(e);
            }
        };
        rt.update_step(wf, "price", StepStatus::Completed, Some(json!(quote)), None)
            .await?;

        let response = rt
            .request_human_input(HumanInputRequest {
                workflow_id: wf.to_string(),
                step_id: APPROVAL_STEP.to_string(),
                prompt: format!(
                    "Approve {} {} {} at {} (total {})?",
                    quote.side, quote.amount, quote.symbol, quote.price, quote.total
                ),
                options: vec!["approve".to_string(), "reject".to_string()],
                timeout_ms: self.approval_timeout_ms,
                data: Some(json!(quote)),
            })
            .await;

        let responder = match response {
            None => {
                let expired = AgentError::Timeout("approval timed out".to_string());
                self.fail(APPROVAL_STEP, &expired).await?;
                return Ok(self.outcome(ProposalStatus::Expired, quote, None, None));
            }
            Some(reply) if !is_approval(&reply.response) => {
                let who = reply.responder.clone().unwrap_or_else(|| "reviewer".to_string());
                let rejected = AgentError::Operation(format!("rejected by {}", who));
                self.fail(APPROVAL_STEP, &rejected).await?;
                info!("Trade {} rejected", wf);
                return Ok(self.outcome(ProposalStatus::Rejected, quote, None, reply.responder));
            }
            Some(reply) => reply.responder,
        };
        rt.update_step(
            wf,
            APPROVAL_STEP,
            StepStatus::Completed,
            Some(json!({ "approved": true, "responder": responder })),
            None,
        )
        .await?;

        rt.update_step(wf, "record", StepStatus::InProgress, None, None)
            .await?;
        let ticket = TradeTicket {
            ticket_id: Uuid::new_v4().to_string(),
            workflow_id: wf.to_string(),
            symbol: quote.symbol.clone(),
            side: quote.side,
            amount: quote.amount,
            price: quote.price,
            total: quote.total,
            approved_by: responder.clone(),
            created_at: Utc::now(),
        };
        let entry = serde_json::to_value(&ticket)?;
        rt.set_scratch(wf, entry.clone()).await?;
        rt.update_extra(LEDGER_KEY, |ledger| match ledger {
            Value::Array(tickets) => tickets.push(entry.clone()),
            other => *other = Value::Array(vec![entry.clone()]),
        })
        .await?;
        rt.update_step(wf, "record", StepStatus::Completed, Some(entry.clone()), None)
            .await?;
        rt.notify(
            WsMessageType::DataUpdate,
            json!({ "workflowId": wf, "ticket": entry }),
        )
        .await;

        info!("Trade {} approved and recorded", wf);
        Ok(self.outcome(ProposalStatus::Approved, quote, Some(ticket), responder))
    }

    fn outcome(
        &self,
        status: ProposalStatus,
        quote: TradeQuote,
        ticket: Option<TradeTicket>,
        responder: Option<String>,
    ) -> ProposalOutcome {
        ProposalOutcome {
            workflow_id: self.workflow_id.clone(),
            status,
            quote,
            ticket,
            responder,
        }
    }
}

pub struct TradingAgent {
    deps: AgentDeps,
}

impl TradingAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn quote(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let request = match TradeRequest::from_params(params) {
            Ok(request) => request,
            Err(e) => return e.into(),
        };
        ctx.runtime
            .execute_operation(None, || async {
                let lookup = self.deps.fetch_price(&request.symbol).await?;
                Ok(TradeQuote::new(&request, lookup.quote.price, &lookup.source))
            })
            .await
            .into_json()
    }

    /// Starts the workflow. With `wait: true` the call returns the final
    /// outcome, otherwise it returns as soon as the workflow is registered.
    async fn propose_trade(&self, ctx: &AgentContext<'_>, params: Value) -> OperationResult<Value> {
        let workflow_id = format!("trade-{}", Uuid::new_v4());
        let steps = match ctx.runtime.start_workflow(&workflow_id, &WORKFLOW_STEPS).await {
            Ok(steps) => steps,
            Err(e) => return e.into(),
        };
        let wait = params.get("wait").and_then(Value::as_bool).unwrap_or(false);
        let runner = TradeWorkflow {
            runtime: Arc::clone(ctx.runtime),
            deps: self.deps.clone(),
            workflow_id: workflow_id.clone(),
            approval_timeout_ms: params.get("approvalTimeoutMs").and_then(Value::as_u64),
            params,
        };

        if wait {
            return ctx
                .runtime
                .execute_operation(None, || runner.run())
                .await
                .into_json();
        }

        let runtime = Arc::clone(ctx.runtime);
        tokio::spawn(async move {
            let result = runtime.execute_operation(None, || runner.run()).await;
            if !result.success {
                warn!(
                    "Trade workflow {} ended without a ticket: {}",
                    runner.workflow_id,
                    result.error.unwrap_or_default()
                );
            }
        });

        OperationResult::ok(json!({
            "workflowId": workflow_id,
            "status": "pending",
            "steps": steps,
        }))
    }

    fn approve(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let workflow_id = match super::require_str(params, "workflowId") {
            Ok(id) => id,
            Err(e) => return e.into(),
        };
        let step_id = str_param(params, "stepId").unwrap_or(APPROVAL_STEP).to_string();
        let approved = params.get("approved").and_then(Value::as_bool).unwrap_or(true);

        let resolved = ctx.runtime.resolve_human_input(HumanInputResponse {
            workflow_id: workflow_id.clone(),
            step_id: step_id.clone(),
            response: json!({ "approved": approved }),
            responder: str_param(params, "responder").map(str::to_string),
        });
        if !resolved {
            return OperationResult::failed(format!(
                "no pending approval for {}:{}",
                workflow_id, step_id
            ));
        }
        OperationResult::ok(json!({
            "workflowId": workflow_id,
            "stepId": step_id,
            "approved": approved,
        }))
    }

    async fn ledger(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        if let Some(workflow_id) = str_param(params, "workflowId") {
            return match ctx.runtime.workflow(workflow_id).await {
                Ok(Some(steps)) => OperationResult::ok(json!({
                    "workflowId": workflow_id,
                    "steps": steps,
                    "ticket": ctx.runtime.scratch(workflow_id).await.ok().flatten(),
                })),
                Ok(None) => AgentError::NotFound(format!("workflow {}", workflow_id)).into(),
                Err(e) => e.into(),
            };
        }

        match ctx.runtime.extra(LEDGER_KEY).await {
            Ok(ledger) => OperationResult::ok(json!({
                "trades": ledger.unwrap_or_else(|| json!([])),
                "pendingApprovals": ctx.runtime.pending_inputs(),
            })),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl Agent for TradingAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Trading
    }

    fn description(&self) -> &str {
        "Trading: quotes and human-approved trade proposals with a ticket ledger"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "quote".into(),
            "propose_trade".into(),
            "approve".into(),
            "trades".into(),
            "query".into(),
        ]
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        match action {
            "quote" => self.quote(ctx, &params).await,
            "propose_trade" => self.propose_trade(ctx, params).await,
            "approve" => self.approve(ctx, &params),
            "trades" => self.ledger(ctx, &params).await,
            "query" => {
                if params.get("symbol").is_some() {
                    self.quote(ctx, &params).await
                } else {
                    self.ledger(ctx, &params).await
                }
            }
            other => unknown_action(AgentType::Trading, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_request_validation() {
        let request =
            TradeRequest::from_params(&json!({"symbol": "s", "side": "SELL", "amount": "10"}))
                .unwrap();
        assert_eq!(request.symbol, "S");
        assert_eq!(request.side, TradeSide::Sell);

        assert!(TradeRequest::from_params(&json!({"symbol": "S", "amount": -1})).is_err());
        assert!(
            TradeRequest::from_params(&json!({"symbol": "S", "side": "hold", "amount": 1}))
                .is_err()
        );
    }

    #[test]
    fn test_quote_math() {
        let request = TradeRequest {
            symbol: "S".into(),
            side: TradeSide::Buy,
            amount: dec!(100),
        };
        let quote = TradeQuote::new(&request, dec!(0.5), "fixed");
        assert_eq!(quote.notional, dec!(50));
        assert_eq!(quote.estimated_fee, dec!(0.05));
        assert_eq!(quote.total, dec!(50.05));

        let sell = TradeRequest {
            side: TradeSide::Sell,
            ..request
        };
        assert_eq!(TradeQuote::new(&sell, dec!(0.5), "fixed").total, dec!(49.95));
    }

    #[test]
    fn test_is_approval() {
        assert!(is_approval(&json!(true)));
        assert!(is_approval(&json!({"approved": true})));
        assert!(is_approval(&json!("Approve")));
        assert!(!is_approval(&json!("reject")));
        assert!(!is_approval(&json!({"approved": false})));
        assert!(!is_approval(&Value::Null));
    }
}
