//! Shared fakes for integration tests

#![allow(dead_code)]

use agora::agents::{default_agents, AgentDeps, FeedSettings};
use agora::domain::{Candle, Headline, PriceQuote};
use agora::error::{AgentError, Result};
use agora::orchestrator::{AgentRegistry, Orchestrator};
use agora::sources::{MarketFeed, NewsFeed};
use agora::state::{AgentConfig, MemoryStateStore, StateStore};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Prices every symbol at a fixed value and serves a gently rising series
pub struct FixedMarket {
    pub price: Decimal,
    pub calls: AtomicUsize,
}

impl FixedMarket {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MarketFeed for FixedMarket {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn price(&self, symbol: &str) -> Result<PriceQuote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PriceQuote {
            symbol: symbol.to_string(),
            price: self.price,
            change_24h_pct: Some(dec!(2.5)),
            volume_24h: None,
            source: "fixed".into(),
            timestamp: Utc::now(),
        })
    }

    async fn candles(&self, _symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Ok((0..limit)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5 + (i % 5) as f64 * 0.3;
                Candle {
                    open_time: start + Duration::hours(i as i64),
                    open: base,
                    high: base + 1.5,
                    low: base - 1.0,
                    close: base + 0.8,
                    volume: 1000.0 + (i % 7) as f64 * 50.0,
                }
            })
            .collect())
    }
}

pub struct DownMarket;

#[async_trait]
impl MarketFeed for DownMarket {
    fn name(&self) -> &str {
        "down"
    }

    async fn price(&self, _symbol: &str) -> Result<PriceQuote> {
        Err(AgentError::source_unavailable("down", "503 Service Unavailable"))
    }
}

/// Always returns the same upbeat headlines
pub struct UpbeatNews;

#[async_trait]
impl NewsFeed for UpbeatNews {
    fn name(&self) -> &str {
        "upbeat"
    }

    async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<Headline>> {
        let titles = [
            format!("{} rallies to record high", query),
            "Major partnership announced".to_string(),
            "Network upgrade goes live".to_string(),
        ];
        Ok(titles
            .into_iter()
            .take(limit)
            .map(|title| Headline {
                title,
                source: "upbeat".into(),
                url: None,
                summary: None,
                published_at: None,
            })
            .collect())
    }
}

pub fn deps(market: Vec<Arc<dyn MarketFeed>>, news: Vec<Arc<dyn NewsFeed>>) -> AgentDeps {
    AgentDeps {
        market_feeds: market,
        news_feeds: news,
        generator: None,
        feed_settings: FeedSettings {
            timeout_ms: 1000,
            retry_count: 1,
        },
    }
}

pub fn orchestrator_with(deps: AgentDeps, store: Arc<dyn StateStore>) -> Arc<Orchestrator> {
    let registry = AgentRegistry::from_agents(default_agents(deps)).unwrap();
    Arc::new(Orchestrator::new(registry, store, AgentConfig::default()))
}

pub fn healthy_orchestrator() -> Arc<Orchestrator> {
    orchestrator_with(
        deps(
            vec![Arc::new(FixedMarket::new(dec!(0.5)))],
            vec![Arc::new(UpbeatNews)],
        ),
        Arc::new(MemoryStateStore::new()),
    )
}
