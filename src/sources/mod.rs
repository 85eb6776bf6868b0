//! Data-source collaborators
//!
//! Agents consume market and news data only through these traits. The
//! reference implementations are plain REST clients; anything else can be
//! plugged in at startup.

pub mod binance;
pub mod coingecko;
pub mod llm_news;

pub use binance::BinanceFeed;
pub use coingecko::CoinGeckoFeed;
pub use llm_news::LlmNewsFeed;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::FeedsConfig;
use crate::domain::{Candle, Headline, PriceQuote};
use crate::error::{AgentError, Result};
use crate::llm::TextGenerator;

#[async_trait]
pub trait MarketFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn price(&self, symbol: &str) -> Result<PriceQuote>;

    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let _ = (symbol, timeframe, limit);
        Err(AgentError::source_unavailable(
            self.name(),
            "candles not supported",
        ))
    }
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<Headline>>;
}

/// Market feeds enabled in configuration, in fallback priority order
pub fn build_market_feeds(config: &FeedsConfig) -> Result<Vec<Arc<dyn MarketFeed>>> {
    let mut feeds: Vec<Arc<dyn MarketFeed>> = Vec::new();
    if config.binance_enabled {
        feeds.push(Arc::new(BinanceFeed::new(&config.binance_url, config.timeout_ms)?));
    }
    if config.coingecko_enabled {
        feeds.push(Arc::new(CoinGeckoFeed::new(
            &config.coingecko_url,
            config.timeout_ms,
        )?));
    }
    Ok(feeds)
}

pub fn build_news_feeds(generator: Option<Arc<dyn TextGenerator>>) -> Vec<Arc<dyn NewsFeed>> {
    match generator {
        Some(generator) => vec![Arc::new(LlmNewsFeed::new(generator)) as Arc<dyn NewsFeed>],
        None => Vec::new(),
    }
}

/// Map loose timeframe words onto exchange interval codes
pub fn normalize_timeframe(timeframe: &str) -> Option<&'static str> {
    let tf = timeframe.trim().to_lowercase();
    let code = match tf.as_str() {
        "1m" => "1m",
        "3m" => "3m",
        "5m" => "5m",
        "15m" => "15m",
        "30m" => "30m",
        "1h" | "hourly" => "1h",
        "2h" => "2h",
        "4h" => "4h",
        "6h" => "6h",
        "12h" => "12h",
        "1d" | "daily" | "24h" => "1d",
        "3d" => "3d",
        "1w" | "weekly" => "1w",
        _ => return None,
    };
    Some(code)
}
