//! Charts agent: candles and technical analysis

pub mod indicators;
pub mod technical;

pub use technical::{analyze, Signal, TechnicalAnalysis, TrendDirection};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{str_param, symbol_param, unknown_action, usize_param, AgentDeps};
use crate::domain::{AgentType, Candle, OperationResult, WsMessageType};
use crate::error::AgentError;
use crate::runtime::{Agent, AgentContext};
use crate::sources::normalize_timeframe;

const DEFAULT_TIMEFRAME: &str = "1h";
const DEFAULT_LIMIT: usize = 100;
/// Enough bars for the 200-period average
const ANALYSIS_LIMIT: usize = 250;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: String,
    pub source: String,
    pub candles: Vec<Candle>,
}

pub struct ChartsAgent {
    deps: AgentDeps,
}

fn timeframe_param(params: &Value) -> Result<String, AgentError> {
    let raw = str_param(params, "timeframe").unwrap_or(DEFAULT_TIMEFRAME);
    normalize_timeframe(raw)
        .map(str::to_string)
        .ok_or_else(|| AgentError::Validation(format!("unsupported timeframe: {}", raw)))
}

impl ChartsAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn get_candles(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let (symbol, timeframe) = match (symbol_param(params), timeframe_param(params)) {
            (Ok(s), Ok(t)) => (s, t),
            (Err(e), _) | (_, Err(e)) => return e.into(),
        };
        let limit = usize_param(params, "limit", DEFAULT_LIMIT).clamp(1, 1000);

        let key = format!("candles:{}:{}:{}", symbol, timeframe, limit);
        ctx.runtime
            .execute_operation(Some(&key), || async {
                let (candles, source) = self.deps.fetch_candles(&symbol, &timeframe, limit).await?;
                Ok(CandleSeries {
                    symbol: symbol.clone(),
                    timeframe: timeframe.clone(),
                    source,
                    candles,
                })
            })
            .await
            .into_json()
    }

    async fn analyze(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let (symbol, timeframe) = match (symbol_param(params), timeframe_param(params)) {
            (Ok(s), Ok(t)) => (s, t),
            (Err(e), _) | (_, Err(e)) => return e.into(),
        };

        let key = format!("analysis:{}:{}", symbol, timeframe);
        let result = ctx
            .runtime
            .execute_operation(Some(&key), || async {
                let (candles, source) = self
                    .deps
                    .fetch_candles(&symbol, &timeframe, ANALYSIS_LIMIT)
                    .await?;
                debug!("Analyzing {} {} candles from {}", candles.len(), symbol, source);
                analyze(&symbol, &timeframe, &candles)
            })
            .await;

        if let (false, Some(analysis)) = (result.cache_hit, &result.data) {
            ctx.runtime
                .notify(
                    WsMessageType::AnalysisComplete,
                    json!({
                        "symbol": analysis.symbol,
                        "timeframe": analysis.timeframe,
                        "overall": analysis.signals.overall,
                        "trend": analysis.trend.direction,
                        "confidence": analysis.confidence,
                    }),
                )
                .await;
        }
        result.into_json()
    }
}

#[async_trait]
impl Agent for ChartsAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Charts
    }

    fn description(&self) -> &str {
        "Charts: candles, indicators, candlestick patterns, trend and pivot levels"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["get_candles".into(), "analyze".into(), "query".into()]
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        match action {
            "get_candles" => self.get_candles(ctx, &params).await,
            "analyze" | "query" => self.analyze(ctx, &params).await,
            other => unknown_action(AgentType::Charts, other),
        }
    }
}
