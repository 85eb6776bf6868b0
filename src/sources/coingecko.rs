//! CoinGecko simple-price feed, used as the price fallback

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::MarketFeed;
use crate::domain::PriceQuote;
use crate::error::{AgentError, Result};

const NAME: &str = "coingecko";

pub struct CoinGeckoFeed {
    client: reqwest::Client,
    base_url: String,
}

/// CoinGecko ids for common tickers; anything else is tried lower-cased
pub fn coin_id(symbol: &str) -> String {
    let id = match symbol.trim().to_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "BNB" => "binancecoin",
        "XRP" => "ripple",
        "DOGE" => "dogecoin",
        "ADA" => "cardano",
        "AVAX" => "avalanche-2",
        "LINK" => "chainlink",
        "S" => "sonic-3",
        "FTM" => "fantom",
        other => return other.to_lowercase(),
    };
    id.to_string()
}

impl CoinGeckoFeed {
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
}

fn quote_from_simple_price(symbol: &str, id: &str, body: &Value) -> Result<PriceQuote> {
    let entry = body
        .get(id)
        .ok_or_else(|| AgentError::source_unavailable(NAME, format!("unknown coin {}", id)))?;
    let price = entry
        .get("usd")
        .and_then(Value::as_f64)
        .and_then(Decimal::from_f64)
        .ok_or_else(|| AgentError::source_unavailable(NAME, "missing usd price"))?;

    Ok(PriceQuote {
        symbol: symbol.to_uppercase(),
        price,
        change_24h_pct: entry
            .get("usd_24h_change")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(4)),
        volume_24h: entry
            .get("usd_24h_vol")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64),
        source: NAME.to_string(),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl MarketFeed for CoinGeckoFeed {
    fn name(&self) -> &str {
        NAME
    }

    async fn price(&self, symbol: &str) -> Result<PriceQuote> {
        let id = coin_id(symbol);
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true&include_24hr_vol=true",
            self.base_url, id
        );
        debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::source_unavailable(
                NAME,
                format!("HTTP {}", response.status()),
            ));
        }
        let body: Value = response.json().await?;
        quote_from_simple_price(symbol, &id, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coin_id() {
        assert_eq!(coin_id("btc"), "bitcoin");
        assert_eq!(coin_id("S"), "sonic-3");
        assert_eq!(coin_id("PEPE"), "pepe");
    }

    #[test]
    fn test_quote_from_simple_price() {
        let body = json!({"ethereum": {"usd": 3100.5, "usd_24h_change": 2.123456, "usd_24h_vol": 1.0e9}});
        let quote = quote_from_simple_price("eth", "ethereum", &body).unwrap();
        assert_eq!(quote.symbol, "ETH");
        assert!(quote.is_valid());
        assert_eq!(quote.change_24h_pct.unwrap().to_string(), "2.1235");

        let missing = quote_from_simple_price("eth", "bitcoin", &body);
        assert!(matches!(
            missing,
            Err(AgentError::SourceUnavailable { .. })
        ));
    }
}
