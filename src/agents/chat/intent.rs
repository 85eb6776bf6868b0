//! Rule-based intent detection
//!
//! Categories are checked in table order; the first match is the primary
//! intent. Every matching category is kept so a message can fan out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::domain::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Price,
    Chart,
    Trade,
    News,
    Sentiment,
    Report,
    General,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Price => "price",
            IntentCategory::Chart => "chart",
            IntentCategory::Trade => "trade",
            IntentCategory::News => "news",
            IntentCategory::Sentiment => "sentiment",
            IntentCategory::Report => "report",
            IntentCategory::General => "general",
        }
    }

    /// Agent that answers this category
    pub fn agent_type(&self) -> AgentType {
        match self {
            IntentCategory::Price | IntentCategory::General => AgentType::Overview,
            IntentCategory::Chart => AgentType::Charts,
            IntentCategory::Trade => AgentType::Trading,
            IntentCategory::News | IntentCategory::Sentiment | IntentCategory::Report => {
                AgentType::Intelligence
            }
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered rule table; order decides the primary intent
pub const INTENT_RULES: [(IntentCategory, &[&str]); 6] = [
    (
        IntentCategory::Price,
        &["price", "cost", "worth", "value", "how much", "market cap", "volume"],
    ),
    (
        IntentCategory::Chart,
        &[
            "chart", "graph", "pattern", "technical", "indicator", "rsi", "macd", "support",
            "resistance", "candle",
        ],
    ),
    (
        IntentCategory::Trade,
        &["buy", "sell", "trade", "swap", "order", "execute", "position"],
    ),
    (
        IntentCategory::News,
        &["news", "latest", "update", "announcement", "happening"],
    ),
    (
        IntentCategory::Sentiment,
        &[
            "sentiment", "feel", "bullish", "bearish", "mood", "community", "social", "should i",
        ],
    ),
    (
        IntentCategory::Report,
        &["report", "summary", "analysis", "overview", "research"],
    ),
];

/// Upper-case tokens that are words, not tickers
const STOP_WORDS: [&str; 12] = [
    "I", "A", "AND", "OR", "THE", "ME", "MY", "OK", "IS", "IT", "TO", "OF",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub primary: IntentCategory,
    pub categories: Vec<IntentCategory>,
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    pub requires_multiple_agents: bool,
    /// True when the symbol came from earlier turns
    #[serde(default)]
    pub symbol_inherited: bool,
}

impl Intent {
    pub fn primary_symbol(&self) -> Option<&str> {
        self.symbols.first().map(String::as_str)
    }

    /// Distinct agents implied by the matched categories, in category order
    pub fn agent_types(&self) -> Vec<AgentType> {
        let mut agents = Vec::new();
        for category in &self.categories {
            let agent = category.agent_type();
            if !agents.contains(&agent) {
                agents.push(agent);
            }
        }
        agents
    }
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

fn symbol_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9]{0,9}\b").ok())
        .as_ref()
}

fn timeframe_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(1m|5m|15m|30m|1h|4h|12h|1d|1w|hourly|daily|weekly)\b").ok()
    })
    .as_ref()
}

pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    let Some(re) = symbol_regex() else {
        return symbols;
    };
    for found in re.find_iter(text) {
        let token = found.as_str();
        if STOP_WORDS.contains(&token) || symbols.iter().any(|s| s == token) {
            continue;
        }
        symbols.push(token.to_string());
    }
    symbols
}

pub fn extract_timeframe(text: &str) -> Option<String> {
    timeframe_regex()?
        .find(text)
        .map(|m| m.as_str().to_lowercase())
}

pub fn detect_intent(message: &str, history: &[ChatTurn]) -> Intent {
    let lower = message.to_lowercase();
    let categories: Vec<IntentCategory> = INTENT_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .collect();

    let mut symbols = extract_symbols(message);
    let mut symbol_inherited = false;
    if symbols.is_empty() {
        if let Some(previous) = history
            .iter()
            .rev()
            .map(|turn| extract_symbols(&turn.content))
            .find(|found| !found.is_empty())
        {
            symbols = previous.into_iter().take(1).collect();
            symbol_inherited = true;
        }
    }

    let primary = categories.first().copied().unwrap_or(IntentCategory::General);
    let categories = if categories.is_empty() {
        vec![IntentCategory::General]
    } else {
        categories
    };

    Intent {
        primary,
        requires_multiple_agents: categories.len() > 1,
        categories,
        symbols,
        timeframe: extract_timeframe(message),
        symbol_inherited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_with_sentiment() {
        let intent = detect_intent("Should I buy S token now?", &[]);
        assert_eq!(intent.primary, IntentCategory::Trade);
        assert_eq!(
            intent.categories,
            vec![IntentCategory::Trade, IntentCategory::Sentiment]
        );
        assert_eq!(intent.symbols, vec!["S".to_string()]);
        assert!(intent.requires_multiple_agents);
        assert_eq!(
            intent.agent_types(),
            vec![AgentType::Trading, AgentType::Intelligence]
        );
    }

    #[test]
    fn test_price_question() {
        let intent = detect_intent("What's the price of BTC?", &[]);
        assert_eq!(intent.primary, IntentCategory::Price);
        assert!(!intent.requires_multiple_agents);
        assert_eq!(intent.symbols, vec!["BTC".to_string()]);
    }

    #[test]
    fn test_general_fallback() {
        let intent = detect_intent("hello there", &[]);
        assert_eq!(intent.primary, IntentCategory::General);
        assert_eq!(intent.categories, vec![IntentCategory::General]);
        assert_eq!(intent.agent_types(), vec![AgentType::Overview]);
    }

    #[test]
    fn test_timeframe_and_stop_words() {
        let intent = detect_intent("Show ME the ETH chart on the 4H timeframe", &[]);
        assert_eq!(intent.primary, IntentCategory::Chart);
        assert_eq!(intent.timeframe.as_deref(), Some("4h"));
        assert_eq!(intent.symbols, vec!["ETH".to_string()]);
    }

    #[test]
    fn test_symbol_inherited_from_history() {
        let history = vec![
            ChatTurn {
                role: "user".into(),
                content: "price of SOL?".into(),
            },
            ChatTurn {
                role: "assistant".into(),
                content: "it is trading at 150".into(),
            },
        ];
        let intent = detect_intent("and the latest news?", &history);
        assert_eq!(intent.primary, IntentCategory::News);
        assert_eq!(intent.symbols, vec!["SOL".to_string()]);
        assert!(intent.symbol_inherited);
    }
}
