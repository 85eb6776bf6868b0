//! Binance public REST feed: 24h ticker and klines

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{normalize_timeframe, MarketFeed};
use crate::domain::{Candle, PriceQuote};
use crate::error::{AgentError, Result};

const NAME: &str = "binance";
const QUOTE_ASSETS: [&str; 4] = ["USDT", "USDC", "FDUSD", "BUSD"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: String,
    quote_volume: String,
}

pub struct BinanceFeed {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceFeed {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AgentError::Unknown(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::source_unavailable(
                NAME,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }
}

/// `BTC` → `BTCUSDT`; symbols already carrying a quote asset pass through
pub fn market_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if QUOTE_ASSETS.iter().any(|q| upper.ends_with(q) && upper.len() > q.len()) {
        upper
    } else {
        format!("{}USDT", upper)
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|_| AgentError::source_unavailable(NAME, format!("bad {}: {}", field, raw)))
}

fn quote_from_ticker(symbol: &str, ticker: Ticker24h) -> Result<PriceQuote> {
    Ok(PriceQuote {
        symbol: symbol.to_uppercase(),
        price: parse_decimal(&ticker.last_price, "lastPrice")?,
        change_24h_pct: ticker.price_change_percent.parse().ok(),
        volume_24h: ticker.quote_volume.parse().ok(),
        source: NAME.to_string(),
        timestamp: Utc::now(),
    })
}

/// One kline row: `[openTime, open, high, low, close, volume, closeTime, ...]`
fn parse_kline_row(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let open_time = DateTime::from_timestamp_millis(row[0].as_i64()?)?;
    Some(Candle {
        open_time,
        open: row[1].as_str()?.parse().ok()?,
        high: row[2].as_str()?.parse().ok()?,
        low: row[3].as_str()?.parse().ok()?,
        close: row[4].as_str()?.parse().ok()?,
        volume: row[5].as_str()?.parse().ok()?,
    })
}

#[async_trait]
impl MarketFeed for BinanceFeed {
    fn name(&self) -> &str {
        NAME
    }

    async fn price(&self, symbol: &str) -> Result<PriceQuote> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url,
            market_symbol(symbol)
        );
        let ticker: Ticker24h = self.get_json(&url).await?;
        quote_from_ticker(symbol, ticker)
    }

    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let interval = normalize_timeframe(timeframe).ok_or_else(|| {
            AgentError::Validation(format!("unsupported timeframe: {}", timeframe))
        })?;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            market_symbol(symbol),
            interval,
            limit.clamp(1, 1000)
        );
        let rows: Vec<Vec<serde_json::Value>> = self.get_json(&url).await?;
        let candles: Vec<Candle> = rows.iter().filter_map(|row| parse_kline_row(row)).collect();

        debug!("Fetched {} klines for {}", candles.len(), symbol);
        Ok(candles)
    }
}
