//! Text generation client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (xAI by default).
//! Agents only see the `TextGenerator` trait so tests can swap in a canned one.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{AgentError, Result};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt` under the given system instruction
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

pub struct LlmClient {
    config: LlmConfig,
    http: Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if !self.is_configured() {
            return Err(AgentError::Validation(
                "LLM API key not configured".to_string(),
            ));
        }

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(0.7),
            max_tokens: Some(1000),
        };
        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("Sending completion request to {}", url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API error: {} - {}", status, body);
            return Err(AgentError::source_unavailable(
                "llm",
                format!("{} - {}", status, body),
            ));
        }

        let completion: CompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!("LLM response received: {} chars", content.len());
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .await
    }
}

/// Lines that look like list items, with their markers stripped
pub fn extract_bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.starts_with('-')
                || trimmed.starts_with('•')
                || trimmed.starts_with('*')
                || (trimmed.len() > 2
                    && trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
                    && trimmed.chars().nth(1) == Some('.'))
        })
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c == '-' || c == '•' || c == '*' || c.is_ascii_digit() || c == '.'
                })
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bullet_points() {
        let text = r#"
Latest:
- ETF inflows hit record
• Exchange outage resolved
1. Upgrade ships next week
Plain sentence
"#;
        let points = extract_bullet_points(text);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], "ETF inflows hit record");
        assert_eq!(points[2], "Upgrade ships next week");
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        assert!(!client.is_configured());
        let err = client.generate("sys", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
}
