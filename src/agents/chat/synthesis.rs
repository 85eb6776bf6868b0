//! Turning agent replies into one answer

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::intent::{ChatTurn, Intent, IntentCategory};
use crate::agents::charts::TechnicalAnalysis;
use crate::agents::intelligence::{IntelligenceReport, NewsDigest, SentimentReport};
use crate::agents::overview::MarketOverview;
use crate::agents::trading::TradeQuote;
use crate::agents::PriceLookup;
use crate::domain::AgentType;
use crate::llm::TextGenerator;

const MAX_SUGGESTIONS: usize = 3;
const HISTORY_TURNS: usize = 4;
/// Raw JSON context per reply is cut here before prompting
const MAX_CONTEXT_CHARS: usize = 1500;

const SYSTEM_PROMPT: &str = "You are a crypto market assistant. Answer the user's question \
     using only the agent data provided. Be concise and concrete. Do not give financial advice.";

/// What one downstream agent answered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub agent_type: AgentType,
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: f64,
}

fn suggestion_table(category: IntentCategory) -> [&'static str; 3] {
    match category {
        IntentCategory::Price => [
            "Show me the {symbol} chart",
            "What's the latest news on {symbol}?",
            "Quote me a buy of 1 {symbol}",
        ],
        IntentCategory::Chart => [
            "What's the RSI for {symbol} on the 4h chart?",
            "Is the mood around {symbol} bullish?",
            "What's the price of {symbol}?",
        ],
        IntentCategory::Trade => [
            "Propose a trade for {symbol}",
            "Show me the {symbol} chart",
            "What's the price of {symbol}?",
        ],
        IntentCategory::News => [
            "Give me a research report on {symbol}",
            "What's the sentiment on {symbol}?",
            "What's the price of {symbol}?",
        ],
        IntentCategory::Sentiment => [
            "What's the latest news on {symbol}?",
            "Show me the {symbol} chart",
            "Give me a research report on {symbol}",
        ],
        IntentCategory::Report => [
            "Show me the {symbol} chart",
            "Quote me a buy of 1 {symbol}",
            "What's the sentiment on {symbol}?",
        ],
        IntentCategory::General => [
            "What's the price of {symbol}?",
            "Show me the {symbol} chart",
            "What's the latest crypto news?",
        ],
    }
}

/// Follow-up prompts, only for intents whose agent answered
pub fn suggestions(intent: &Intent, replies: &[AgentReply]) -> Vec<String> {
    let symbol = intent.primary_symbol().unwrap_or("BTC");
    let mut out: Vec<String> = Vec::new();
    for category in &intent.categories {
        let answered = replies
            .iter()
            .any(|r| r.success && r.agent_type == category.agent_type());
        if !answered {
            continue;
        }
        for template in suggestion_table(*category) {
            let suggestion = template.replace("{symbol}", symbol);
            if !out.contains(&suggestion) {
                out.push(suggestion);
            }
        }
    }
    out.truncate(MAX_SUGGESTIONS);
    out
}

fn money(value: Decimal) -> String {
    format!("${}", value.round_dp(6).normalize())
}

fn change_phrase(change: Option<Decimal>) -> String {
    match change {
        Some(c) if c >= Decimal::ZERO => format!(", up {}% over 24h", c.round_dp(2)),
        Some(c) => format!(", down {}% over 24h", c.abs().round_dp(2)),
        None => String::new(),
    }
}

fn decode<T: DeserializeOwned>(data: &Value) -> Option<T> {
    serde_json::from_value(data.clone()).ok()
}

/// One readable sentence for a successful reply, if its payload is recognized
pub fn describe(reply: &AgentReply) -> Option<String> {
    let data = reply.data.as_ref()?;
    match (reply.agent_type, reply.action.as_str()) {
        (AgentType::Overview, "get_price") => decode::<PriceLookup>(data).map(|lookup| {
            format!(
                "{} is trading at {}{} (via {}).",
                lookup.quote.symbol,
                money(lookup.quote.price),
                change_phrase(lookup.quote.change_24h_pct),
                lookup.source
            )
        }),
        (AgentType::Overview, "get_overview") => decode::<MarketOverview>(data).map(|overview| {
            let prices: Vec<String> = overview
                .quotes
                .iter()
                .map(|q| format!("{} {}", q.symbol, money(q.price)))
                .collect();
            format!("Market snapshot: {}.", prices.join(", "))
        }),
        (AgentType::Charts, "analyze") => decode::<TechnicalAnalysis>(data).map(|analysis| {
            let rsi = analysis
                .indicators
                .rsi_14
                .map(|r| format!(", RSI {:.1}", r))
                .unwrap_or_default();
            format!(
                "{} on the {} chart: overall signal {}, {} trend{} ({:.0}/100 confidence).",
                analysis.symbol,
                analysis.timeframe,
                analysis.signals.overall,
                analysis.trend.direction,
                rsi,
                analysis.confidence
            )
        }),
        (AgentType::Trading, "quote") => decode::<TradeQuote>(data).map(|quote| {
            format!(
                "A {} of {} {} at {} comes to about {} including {} in fees.",
                quote.side,
                quote.amount,
                quote.symbol,
                money(quote.price),
                money(quote.total),
                money(quote.estimated_fee)
            )
        }),
        (AgentType::Intelligence, "report") => {
            decode::<IntelligenceReport>(data).map(|report| report.summary)
        }
        (AgentType::Intelligence, "sentiment") => decode::<SentimentReport>(data).map(|s| {
            format!(
                "{} sentiment is {} (score {:.2}) across {} headlines.",
                s.symbol, s.sentiment, s.score, s.headline_count
            )
        }),
        (AgentType::Intelligence, "news") => decode::<NewsDigest>(data).map(|digest| {
            let titles: Vec<&str> = digest
                .headlines
                .iter()
                .take(3)
                .map(|h| h.title.as_str())
                .collect();
            format!("Latest headlines: {}.", titles.join("; "))
        }),
        _ => None,
    }
}

fn unavailable_note(replies: &[AgentReply]) -> Option<String> {
    let failed: Vec<String> = replies
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            format!(
                "the {} agent ({})",
                r.agent_type,
                r.error.as_deref().unwrap_or("no response")
            )
        })
        .collect();
    if failed.is_empty() {
        return None;
    }
    Some(format!("Currently unavailable: {}.", failed.join(", ")))
}

/// Deterministic answer built only from successful replies
pub fn template_response(replies: &[AgentReply]) -> String {
    replies
        .iter()
        .filter(|r| r.success)
        .map(|r| {
            describe(r).unwrap_or_else(|| format!("The {} agent returned data.", r.agent_type))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_prompt(message: &str, replies: &[AgentReply], history: &[ChatTurn]) -> String {
    let mut context = Vec::new();
    for reply in replies.iter().filter(|r| r.success) {
        let detail = describe(reply).unwrap_or_else(|| {
            let raw = reply
                .data
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
            raw.chars().take(MAX_CONTEXT_CHARS).collect()
        });
        context.push(format!("[{} / {}] {}", reply.agent_type, reply.action, detail));
    }

    let skip = history.len().saturating_sub(HISTORY_TURNS);
    let recent: Vec<String> = history
        .iter()
        .skip(skip)
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect();

    format!(
        "Conversation so far:\n{}\n\nAgent data:\n{}\n\nUser question: {}",
        if recent.is_empty() {
            "(none)".to_string()
        } else {
            recent.join("\n")
        },
        context.join("\n"),
        message
    )
}

/// Natural-language answer; never fails
pub async fn synthesize_response(
    generator: Option<&dyn TextGenerator>,
    message: &str,
    replies: &[AgentReply],
    history: &[ChatTurn],
) -> String {
    let note = unavailable_note(replies);

    if !replies.iter().any(|r| r.success) {
        let apology = format!(
            "Sorry, I couldn't answer \"{}\" right now because none of the agents I asked responded.",
            message
        );
        return match note {
            Some(note) => format!("{} {}", apology, note),
            None => apology,
        };
    }

    let body = match generator {
        Some(generator) => {
            match generator
                .generate(SYSTEM_PROMPT, &build_prompt(message, replies, history))
                .await
            {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => template_response(replies),
                Err(e) => {
                    warn!("Chat synthesis fell back to template: {}", e);
                    template_response(replies)
                }
            }
        }
        None => template_response(replies),
    };

    match note {
        Some(note) => format!("{}\n\n{}", body, note),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::chat::intent::detect_intent;
    use crate::error::{AgentError, Result};
    use async_trait::async_trait;
    use serde_json::json;

    fn reply(agent_type: AgentType, action: &str, data: Option<Value>) -> AgentReply {
        AgentReply {
            agent_type,
            action: action.to_string(),
            success: data.is_some(),
            error: if data.is_none() {
                Some("Source unavailable: binance - 503".to_string())
            } else {
                None
            },
            data,
            execution_time_ms: 1.0,
        }
    }

    fn sentiment_payload() -> Value {
        json!({
            "symbol": "S",
            "sentiment": "bullish",
            "score": 0.5,
            "bullishHits": 3,
            "bearishHits": 1,
            "headlineCount": 4,
            "source": "llm-search"
        })
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(AgentError::source_unavailable("llm", "down"))
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
            Ok(format!("LLM saw: {}", prompt.lines().count()))
        }
    }

    #[tokio::test]
    async fn test_template_names_unavailable_agent() {
        let replies = vec![
            reply(AgentType::Trading, "quote", None),
            reply(AgentType::Intelligence, "sentiment", Some(sentiment_payload())),
        ];
        let answer = synthesize_response(None, "Should I buy S token now?", &replies, &[]).await;
        assert!(answer.contains("S sentiment is bullish"));
        assert!(answer.contains("trading agent"));
        assert!(answer.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_all_failed_apologizes() {
        let replies = vec![reply(AgentType::Overview, "get_price", None)];
        let answer = synthesize_response(Some(&Echo as &dyn TextGenerator), "price of BTC?", &replies, &[]).await;
        assert!(answer.starts_with("Sorry"));
        assert!(answer.contains("overview agent"));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let replies = vec![reply(
            AgentType::Intelligence,
            "sentiment",
            Some(sentiment_payload()),
        )];
        let answer = synthesize_response(Some(&Failing as &dyn TextGenerator), "mood on S?", &replies, &[]).await;
        assert_eq!(answer, "S sentiment is bullish (score 0.50) across 4 headlines.");

        let answer = synthesize_response(Some(&Echo as &dyn TextGenerator), "mood on S?", &replies, &[]).await;
        assert!(answer.starts_with("LLM saw"));
    }

    #[test]
    fn test_suggestions_only_for_answered_intents() {
        let intent = detect_intent("Should I buy S token now?", &[]);
        let replies = vec![
            reply(AgentType::Trading, "quote", None),
            reply(AgentType::Intelligence, "sentiment", Some(sentiment_payload())),
        ];
        let offered = suggestions(&intent, &replies);
        assert_eq!(offered.len(), 3);
        assert_eq!(offered[0], "What's the latest news on S?");
        assert!(offered.iter().all(|s| !s.starts_with("Propose")));

        assert!(suggestions(&intent, &replies[..1]).is_empty());
    }
}
