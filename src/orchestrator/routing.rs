//! Keyword routing of free-text queries to an agent type

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::AgentType;

/// Score divisor: three keyword hits mean full confidence
const FULL_CONFIDENCE_SCORE: f64 = 3.0;

/// `(agent type, weight, keywords)`; matching is substring on the lower-cased query
pub static ROUTING_RULES: [(AgentType, f64, &[&str]); 5] = [
    (
        AgentType::Overview,
        1.0,
        &[
            "price", "market", "overview", "volume", "market cap", "tvl", "ticker", "trending",
            "gainers", "losers", "stats",
        ],
    ),
    (
        AgentType::Charts,
        1.0,
        &[
            "chart", "pattern", "technical", "indicator", "rsi", "macd", "support",
            "resistance", "candle", "trend",
        ],
    ),
    (
        AgentType::Trading,
        1.0,
        &[
            "trade", "buy", "sell", "swap", "order", "position", "portfolio", "execute",
            "wallet", "liquidity",
        ],
    ),
    (
        AgentType::Intelligence,
        1.0,
        &[
            "news", "sentiment", "report", "social", "twitter", "research", "intelligence",
            "analysis", "insight", "community",
        ],
    ),
    (
        AgentType::Chat,
        0.5,
        &["help", "explain", "hello", "what is", "how do", "tell me"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub agent_type: AgentType,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Weighted score per agent type
    pub scores: BTreeMap<String, f64>,
    /// Keywords of the winning type found in the query
    pub matched_keywords: Vec<String>,
}

fn rule_for(agent_type: AgentType) -> Option<&'static (AgentType, f64, &'static [&'static str])> {
    ROUTING_RULES.iter().find(|(t, _, _)| *t == agent_type)
}

fn matches(query: &str, agent_type: AgentType) -> Vec<String> {
    rule_for(agent_type)
        .map(|(_, _, keywords)| {
            keywords
                .iter()
                .filter(|k| query.contains(*k))
                .map(|k| k.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Pick the best-scoring type among `candidates`, which are in registration order
pub fn route_query(query: &str, candidates: &[AgentType]) -> RouteDecision {
    let query = query.to_lowercase();
    let mut scores = BTreeMap::new();
    let mut best: Option<(AgentType, f64)> = None;

    for &agent_type in candidates {
        let weight = rule_for(agent_type).map(|(_, w, _)| *w).unwrap_or(1.0);
        let score = matches(&query, agent_type).len() as f64 * weight;
        scores.insert(agent_type.to_string(), score);
        if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((agent_type, score));
        }
    }

    let (agent_type, score) = best.unwrap_or((AgentType::Chat, 0.0));
    RouteDecision {
        agent_type,
        confidence: (score / FULL_CONFIDENCE_SCORE).min(1.0),
        matched_keywords: matches(&query, agent_type),
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_query_goes_to_overview() {
        let decision = route_query("what's the current price of BTC", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Overview);
        assert!(decision.confidence > 0.0);
        assert_eq!(decision.matched_keywords, vec!["price".to_string()]);
    }

    #[test]
    fn test_chart_query_goes_to_charts() {
        let decision = route_query("show me a chart pattern for ETH", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Charts);
        assert_eq!(decision.scores["charts"], 2.0);
        assert!((decision.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_goes_to_earlier_registration() {
        // one overview keyword, one trading keyword
        let decision = route_query("market buy", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Overview);
    }

    #[test]
    fn test_chat_weight_and_fallback() {
        let decision = route_query("hello, explain this to me", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Chat);
        assert_eq!(decision.scores["chat"], 1.0);

        let decision = route_query("zzz", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Chat);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.matched_keywords.is_empty());
    }

    #[test]
    fn test_confidence_is_capped() {
        let decision = route_query("latest news, sentiment report and research", &AgentType::ALL);
        assert_eq!(decision.agent_type, AgentType::Intelligence);
        assert_eq!(decision.confidence, 1.0);
    }
}
