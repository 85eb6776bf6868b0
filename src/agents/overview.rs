//! Market overview agent: spot prices and multi-symbol snapshots

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{symbol_param, unknown_action, AgentDeps, PriceLookup};
use crate::domain::{AgentType, OperationResult, PriceQuote};
use crate::error::AgentError;
use crate::runtime::{Agent, AgentContext};

const DEFAULT_SYMBOLS: [&str; 3] = ["BTC", "ETH", "S"];
const MAX_SYMBOLS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub quotes: Vec<PriceQuote>,
    /// Symbols no source could price
    pub unavailable: Vec<String>,
}

pub struct OverviewAgent {
    deps: AgentDeps,
}

impl OverviewAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn get_price(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let symbol = match symbol_param(params) {
            Ok(symbol) => symbol,
            Err(e) => return e.into(),
        };
        let key = format!("price:{}", symbol);
        ctx.runtime
            .execute_operation(Some(&key), || self.deps.fetch_price(&symbol))
            .await
            .into_json()
    }

    async fn get_overview(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let mut symbols = symbols_param(params);
        if symbols.is_empty() {
            symbols = DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();
        }
        if symbols.len() > MAX_SYMBOLS {
            return AgentError::Validation(format!("at most {} symbols", MAX_SYMBOLS)).into();
        }

        let key = format!("overview:{}", symbols.join(","));
        ctx.runtime
            .execute_operation(Some(&key), || async {
                let lookups = join_all(symbols.iter().map(|s| self.deps.fetch_price(s))).await;

                let mut overview = MarketOverview {
                    quotes: Vec::new(),
                    unavailable: Vec::new(),
                };
                for (symbol, lookup) in symbols.iter().zip(lookups) {
                    match lookup {
                        Ok(PriceLookup { quote, .. }) => overview.quotes.push(quote),
                        Err(_) => overview.unavailable.push(symbol.clone()),
                    }
                }
                if overview.quotes.is_empty() {
                    return Err(AgentError::AllSourcesExhausted(format!(
                        "no prices for {}",
                        symbols.join(", ")
                    )));
                }
                Ok(overview)
            })
            .await
            .into_json()
    }
}

/// `symbols` as an array or comma-separated string, upper-cased and deduplicated
fn symbols_param(params: &Value) -> Vec<String> {
    let raw: Vec<String> = match params.get("symbols") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(list)) => list.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

#[async_trait]
impl Agent for OverviewAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Overview
    }

    fn description(&self) -> &str {
        "Market overview: spot prices, 24h change and volume across reference feeds"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["get_price".into(), "get_overview".into(), "query".into()]
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        match action {
            "get_price" => self.get_price(ctx, &params).await,
            "get_overview" => self.get_overview(ctx, &params).await,
            "query" => {
                if params.get("symbol").is_some() {
                    self.get_price(ctx, &params).await
                } else {
                    self.get_overview(ctx, &params).await
                }
            }
            other => unknown_action(AgentType::Overview, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbols_param() {
        assert_eq!(
            symbols_param(&json!({"symbols": ["btc", "ETH", "btc"]})),
            vec!["BTC", "ETH"]
        );
        assert_eq!(symbols_param(&json!({"symbols": "sol, s"})), vec!["SOL", "S"]);
        assert!(symbols_param(&json!({})).is_empty());
    }
}
