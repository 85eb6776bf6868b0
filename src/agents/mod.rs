//! Domain agents
//!
//! Each agent is stateless behavior bound to an `AgentRuntime` by the
//! orchestrator. Shared collaborators (feeds, text generator) travel in
//! `AgentDeps`; every remote read goes through a fallback chain.

pub mod charts;
pub mod chat;
pub mod intelligence;
pub mod overview;
pub mod trading;

pub use charts::ChartsAgent;
pub use chat::ChatAgent;
pub use intelligence::IntelligenceAgent;
pub use overview::OverviewAgent;
pub use trading::TradingAgent;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::FeedsConfig;
use crate::domain::{AgentType, Candle, Headline, OperationResult, PriceQuote};
use crate::error::{AgentError, Result};
use crate::fallback::{
    create_data_source, fetch_with_fallback, DataSource, SourceAttempt, SourceDefinition,
};
use crate::llm::TextGenerator;
use crate::runtime::Agent;
use crate::sources::{MarketFeed, NewsFeed};

/// Per-source timeout and attempt count applied inside every chain
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub timeout_ms: u64,
    pub retry_count: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            retry_count: 2,
        }
    }
}

impl From<&FeedsConfig> for FeedSettings {
    fn from(config: &FeedsConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            retry_count: config.retry_count,
        }
    }
}

/// A price plus the trail of sources consulted for it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLookup {
    pub quote: PriceQuote,
    pub source: String,
    pub attempts: Vec<SourceAttempt>,
}

#[derive(Clone, Default)]
pub struct AgentDeps {
    pub market_feeds: Vec<Arc<dyn MarketFeed>>,
    pub news_feeds: Vec<Arc<dyn NewsFeed>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub feed_settings: FeedSettings,
}

impl AgentDeps {
    fn definition(&self, name: &str, priority: usize) -> SourceDefinition {
        SourceDefinition::new(name, priority as u32 + 1)
            .with_timeout_ms(self.feed_settings.timeout_ms)
            .with_retries(self.feed_settings.retry_count)
    }

    /// Market feeds in configured order as price sources for one symbol
    pub fn price_sources(&self, symbol: &str) -> Vec<DataSource<PriceQuote>> {
        self.market_feeds
            .iter()
            .enumerate()
            .map(|(i, feed)| {
                let feed = Arc::clone(feed);
                let symbol = symbol.to_string();
                create_data_source(self.definition(feed.name(), i), move || {
                    let feed = Arc::clone(&feed);
                    let symbol = symbol.clone();
                    async move { feed.price(&symbol).await }
                })
            })
            .collect()
    }

    pub fn candle_sources(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Vec<DataSource<Vec<Candle>>> {
        self.market_feeds
            .iter()
            .enumerate()
            .map(|(i, feed)| {
                let feed = Arc::clone(feed);
                let symbol = symbol.to_string();
                let timeframe = timeframe.to_string();
                create_data_source(self.definition(feed.name(), i), move || {
                    let feed = Arc::clone(&feed);
                    let symbol = symbol.clone();
                    let timeframe = timeframe.clone();
                    async move { feed.candles(&symbol, &timeframe, limit).await }
                })
            })
            .collect()
    }

    pub fn news_sources(&self, query: &str, limit: usize) -> Vec<DataSource<Vec<Headline>>> {
        self.news_feeds
            .iter()
            .enumerate()
            .map(|(i, feed)| {
                let feed = Arc::clone(feed);
                let query = query.to_string();
                create_data_source(self.definition(feed.name(), i), move || {
                    let feed = Arc::clone(&feed);
                    let query = query.clone();
                    async move { feed.headlines(&query, limit).await }
                })
            })
            .collect()
    }

    pub async fn fetch_price(&self, symbol: &str) -> Result<PriceLookup> {
        let valid = |quote: &PriceQuote| quote.is_valid();
        let result = fetch_with_fallback(&self.price_sources(symbol), Some(&valid)).await;
        let attempts = result.attempts.clone();
        let (quote, source) = result.into_result()?;
        Ok(PriceLookup {
            quote,
            source,
            attempts,
        })
    }

    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<(Vec<Candle>, String)> {
        let non_empty = |candles: &Vec<Candle>| !candles.is_empty();
        fetch_with_fallback(
            &self.candle_sources(symbol, timeframe, limit),
            Some(&non_empty),
        )
        .await
        .into_result()
    }

    pub async fn fetch_headlines(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<(Vec<Headline>, String)> {
        if self.news_feeds.is_empty() {
            return Err(AgentError::AllSourcesExhausted(
                "no news sources configured".to_string(),
            ));
        }
        let non_empty = |headlines: &Vec<Headline>| !headlines.is_empty();
        fetch_with_fallback(&self.news_sources(query, limit), Some(&non_empty))
            .await
            .into_result()
    }
}

/// The standard agent set, in registration order
pub fn default_agents(deps: AgentDeps) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(OverviewAgent::new(deps.clone())),
        Arc::new(ChartsAgent::new(deps.clone())),
        Arc::new(TradingAgent::new(deps.clone())),
        Arc::new(IntelligenceAgent::new(deps.clone())),
        Arc::new(ChatAgent::new(deps.generator.clone())),
    ]
}

// ==================== Param helpers ====================

pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn require_str(params: &Value, key: &str) -> Result<String> {
    str_param(params, key)
        .map(str::to_string)
        .ok_or_else(|| AgentError::Validation(format!("{} is required", key)))
}

/// Upper-cased ticker; letters and digits only
pub fn symbol_param(params: &Value) -> Result<String> {
    let symbol = require_str(params, "symbol")?.to_uppercase();
    if symbol.len() > 12 || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AgentError::Validation(format!("invalid symbol: {}", symbol)));
    }
    Ok(symbol)
}

pub fn usize_param(params: &Value, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Positive amount, accepted as a JSON number or a numeric string
pub fn amount_param(params: &Value) -> Result<Decimal> {
    let amount = match params.get("amount") {
        Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        Some(Value::Number(n)) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    }
    .ok_or_else(|| AgentError::Validation("amount must be a number".to_string()))?;

    if amount <= Decimal::ZERO {
        return Err(AgentError::Validation("amount must be positive".to_string()));
    }
    Ok(amount)
}

pub fn unknown_action(agent_type: AgentType, action: &str) -> OperationResult<Value> {
    OperationResult::failed(format!(
        "unknown action '{}' for {} agent",
        action, agent_type
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_symbol_param() {
        assert_eq!(symbol_param(&json!({"symbol": " btc "})).unwrap(), "BTC");
        assert!(symbol_param(&json!({})).is_err());
        assert!(symbol_param(&json!({"symbol": "BTC/USD"})).is_err());
    }

    #[test]
    fn test_amount_param() {
        assert_eq!(amount_param(&json!({"amount": 1.5})).unwrap(), dec!(1.5));
        assert_eq!(amount_param(&json!({"amount": "2"})).unwrap(), dec!(2));
        assert!(amount_param(&json!({"amount": 0})).is_err());
        assert!(amount_param(&json!({"amount": "lots"})).is_err());
    }

    struct DownFeed;
    struct FixedFeed(Decimal);

    #[async_trait]
    impl MarketFeed for DownFeed {
        fn name(&self) -> &str {
            "down"
        }
        async fn price(&self, symbol: &str) -> Result<PriceQuote> {
            Err(AgentError::source_unavailable("down", format!("no {}", symbol)))
        }
    }

    #[async_trait]
    impl MarketFeed for FixedFeed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn price(&self, symbol: &str) -> Result<PriceQuote> {
            Ok(PriceQuote {
                symbol: symbol.to_string(),
                price: self.0,
                change_24h_pct: None,
                volume_24h: None,
                source: "fixed".into(),
                timestamp: chrono::Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_price_falls_back_in_feed_order() {
        let deps = AgentDeps {
            market_feeds: vec![Arc::new(DownFeed), Arc::new(FixedFeed(dec!(2.5)))],
            feed_settings: FeedSettings {
                timeout_ms: 1000,
                retry_count: 1,
            },
            ..Default::default()
        };
        let lookup = deps.fetch_price("S").await.unwrap();
        assert_eq!(lookup.source, "fixed");
        assert_eq!(lookup.quote.price, dec!(2.5));
        assert_eq!(lookup.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_price_is_rejected() {
        let deps = AgentDeps {
            market_feeds: vec![Arc::new(FixedFeed(Decimal::ZERO))],
            ..Default::default()
        };
        assert!(matches!(
            deps.fetch_price("S").await,
            Err(AgentError::AllSourcesExhausted(_))
        ));
    }

    #[tokio::test]
    async fn test_no_news_feeds() {
        let deps = AgentDeps::default();
        assert!(deps.fetch_headlines("BTC", 5).await.is_err());
    }
}
