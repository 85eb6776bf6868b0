//! Headlines pulled from a search-capable language model

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::NewsFeed;
use crate::domain::Headline;
use crate::error::{AgentError, Result};
use crate::llm::{extract_bullet_points, TextGenerator};

const NAME: &str = "llm-search";

const SYSTEM_PROMPT: &str = "You are a crypto news desk. Answer only with a bulleted list \
of recent headlines, one per line, most recent first.";

pub struct LlmNewsFeed {
    generator: Arc<dyn TextGenerator>,
}

impl LlmNewsFeed {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl NewsFeed for LlmNewsFeed {
    fn name(&self) -> &str {
        NAME
    }

    async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<Headline>> {
        let prompt = format!(
            "List up to {} of the latest news headlines about: {}\n\
             Focus on the last 24 hours and anything that could move the market.",
            limit, query
        );
        let text = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let now = Utc::now();

        let headlines: Vec<Headline> = extract_bullet_points(&text)
            .into_iter()
            .take(limit)
            .map(|title| Headline {
                title,
                source: NAME.to_string(),
                url: None,
                summary: None,
                published_at: Some(now),
            })
            .collect();

        if headlines.is_empty() {
            return Err(AgentError::source_unavailable(NAME, "no headlines in response"));
        }
        Ok(headlines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_headlines_parsed_and_limited() {
        let feed = LlmNewsFeed::new(Arc::new(Canned("- one\n- two\n- three")));
        let headlines = feed.headlines("BTC", 2).await.unwrap();
        assert_eq!(headlines.len(), 2);
        assert_eq!(headlines[0].title, "one");
    }

    #[tokio::test]
    async fn test_empty_answer_is_unavailable() {
        let feed = LlmNewsFeed::new(Arc::new(Canned("nothing to report")));
        assert!(feed.headlines("BTC", 5).await.is_err());
    }
}
