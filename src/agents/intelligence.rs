//! Intelligence agent: news, headline sentiment and research reports

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{str_param, symbol_param, unknown_action, usize_param, AgentDeps};
use crate::domain::{AgentType, Headline, OperationResult, Sentiment};
use crate::error::Result;
use crate::runtime::{Agent, AgentContext};

const DEFAULT_HEADLINES: usize = 10;
const REPORT_HEADLINES: usize = 5;
/// Net score beyond which a mood counts as directional
const DIRECTIONAL_THRESHOLD: f64 = 0.2;

const BULLISH_TERMS: [&str; 20] = [
    "surge", "rally", "soar", "gain", "bull", "record", "breakout", "adoption", "upgrade",
    "partnership", "inflow", "approval", "approve", "launch", "growth", "rise", "jump", "high",
    "buy", "beat",
];

const BEARISH_TERMS: [&str; 20] = [
    "crash", "plunge", "drop", "fall", "bear", "hack", "exploit", "lawsuit", "ban", "outflow",
    "sell-off", "selloff", "dump", "decline", "low", "fraud", "delay", "liquidat", "miss",
    "slump",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsDigest {
    pub query: String,
    pub source: String,
    pub headlines: Vec<Headline>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentReport {
    pub symbol: String,
    pub sentiment: Sentiment,
    /// -1 (all bearish) to 1 (all bullish)
    pub score: f64,
    pub bullish_hits: usize,
    pub bearish_hits: usize,
    pub headline_count: usize,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceReport {
    pub symbol: String,
    pub sentiment: SentimentReport,
    pub headlines: Vec<Headline>,
    pub summary: String,
}

/// Count lexicon hits per headline (title and summary) and classify the net score
pub fn score_headlines(headlines: &[Headline]) -> (Sentiment, f64, usize, usize) {
    let mut bullish = 0;
    let mut bearish = 0;
    for headline in headlines {
        let text = format!(
            "{} {}",
            headline.title,
            headline.summary.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        bullish += BULLISH_TERMS.iter().filter(|t| text.contains(*t)).count();
        bearish += BEARISH_TERMS.iter().filter(|t| text.contains(*t)).count();
    }

    let total = bullish + bearish;
    if total == 0 {
        return (Sentiment::Neutral, 0.0, 0, 0);
    }
    let score = (bullish as f64 - bearish as f64) / total as f64;
    let sentiment = if score >= DIRECTIONAL_THRESHOLD {
        Sentiment::Bullish
    } else if score <= -DIRECTIONAL_THRESHOLD {
        Sentiment::Bearish
    } else if bullish > 0 && bearish > 0 {
        Sentiment::Mixed
    } else {
        Sentiment::Neutral
    };
    (sentiment, score, bullish, bearish)
}

pub struct IntelligenceAgent {
    deps: AgentDeps,
}

impl IntelligenceAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn sentiment_for(&self, symbol: &str) -> Result<(SentimentReport, Vec<Headline>)> {
        let (headlines, source) = self
            .deps
            .fetch_headlines(&format!("{} crypto", symbol), DEFAULT_HEADLINES)
            .await?;
        let (sentiment, score, bullish_hits, bearish_hits) = score_headlines(&headlines);
        let report = SentimentReport {
            symbol: symbol.to_string(),
            sentiment,
            score,
            bullish_hits,
            bearish_hits,
            headline_count: headlines.len(),
            source,
        };
        Ok((report, headlines))
    }

    async fn summarize(&self, symbol: &str, sentiment: &SentimentReport, headlines: &[Headline]) -> String {
        let template = format!(
            "{} sentiment is {} (score {:.2}) across {} recent headlines.",
            symbol, sentiment.sentiment, sentiment.score, sentiment.headline_count
        );
        let generator = match &self.deps.generator {
            Some(generator) => generator,
            None => return template,
        };

        let bullets: Vec<String> = headlines.iter().map(|h| format!("- {}", h.title)).collect();
        let prompt = format!(
            "Write a three-sentence research note on {} for a trader.\n\
             Lexicon sentiment: {} (score {:.2}).\nHeadlines:\n{}",
            symbol,
            sentiment.sentiment,
            sentiment.score,
            bullets.join("\n")
        );
        match generator
            .generate("You are a concise crypto research analyst.", &prompt)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => template,
            Err(e) => {
                warn!("Report summary generation failed: {}", e);
                template
            }
        }
    }

    async fn news(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let query = match str_param(params, "query").or_else(|| str_param(params, "symbol")) {
            Some(query) => query.to_string(),
            None => "crypto market".to_string(),
        };
        let limit = usize_param(params, "limit", DEFAULT_HEADLINES).clamp(1, 50);

        let key = format!("news:{}:{}", query.to_lowercase(), limit);
        ctx.runtime
            .execute_operation(Some(&key), || async {
                let (headlines, source) = self.deps.fetch_headlines(&query, limit).await?;
                Ok(NewsDigest {
                    query: query.clone(),
                    source,
                    headlines,
                })
            })
            .await
            .into_json()
    }

    async fn sentiment(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let symbol = match symbol_param(params) {
            Ok(symbol) => symbol,
            Err(e) => return e.into(),
        };
        let key = format!("sentiment:{}", symbol);
        ctx.runtime
            .execute_operation(Some(&key), || async {
                Ok(self.sentiment_for(&symbol).await?.0)
            })
            .await
            .into_json()
    }

    async fn report(&self, ctx: &AgentContext<'_>, params: &Value) -> OperationResult<Value> {
        let symbol = match symbol_param(params) {
            Ok(symbol) => symbol,
            Err(e) => return e.into(),
        };
        let key = format!("report:{}", symbol);
        ctx.runtime
            .execute_operation(Some(&key), || async {
                let (sentiment, mut headlines) = self.sentiment_for(&symbol).await?;
                headlines.truncate(REPORT_HEADLINES);
                let summary = self.summarize(&symbol, &sentiment, &headlines).await;
                Ok(IntelligenceReport {
                    symbol: symbol.clone(),
                    sentiment,
                    headlines,
                    summary,
                })
            })
            .await
            .into_json()
    }
}

#[async_trait]
impl Agent for IntelligenceAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Intelligence
    }

    fn description(&self) -> &str {
        "Intelligence: news headlines, headline sentiment and research reports"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "news".into(),
            "sentiment".into(),
            "report".into(),
            "query".into(),
        ]
    }

    async fn handle_action(
        &self,
        ctx: &AgentContext<'_>,
        action: &str,
        params: Value,
    ) -> OperationResult<Value> {
        match action {
            "news" => self.news(ctx, &params).await,
            "sentiment" => self.sentiment(ctx, &params).await,
            "report" => self.report(ctx, &params).await,
            "query" => {
                if params.get("symbol").is_some() {
                    self.report(ctx, &params).await
                } else {
                    self.news(ctx, &params).await
                }
            }
            other => unknown_action(AgentType::Intelligence, other),
        }
    }
}
