use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::domain::OperationResult;
use crate::orchestrator::RouteDecision;

#[derive(Parser)]
#[command(name = "agora")]
#[command(version = "0.1.0")]
#[command(about = "Multi-agent market intelligence runtime", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus the AGORA_ENV overlay)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket API
    Serve {
        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show which agent a query would be routed to
    Route {
        query: String,
    },
    /// Ask the chat agent one question
    Chat {
        message: String,
        /// Session the chat and its helper agents belong to
        #[arg(short, long, default_value = "cli")]
        session: String,
    },
}

pub fn format_route(decision: &RouteDecision) -> String {
    let mut out = format!(
        "{} (confidence {:.2})",
        decision.agent_type, decision.confidence
    );
    if !decision.matched_keywords.is_empty() {
        out.push_str(&format!("\n  matched: {}", decision.matched_keywords.join(", ")));
    }
    let scores: Vec<String> = decision
        .scores
        .iter()
        .map(|(agent, score)| format!("{}={}", agent, score))
        .collect();
    out.push_str(&format!("\n  scores: {}", scores.join(" ")));
    out
}

pub fn format_chat(result: &OperationResult<Value>) -> String {
    let Some(data) = result.data.as_ref().filter(|_| result.success) else {
        return format!(
            "error: {}",
            result.error.as_deref().unwrap_or("chat produced no answer")
        );
    };

    let mut out = data
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let suggestions: Vec<&str> = data
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !suggestions.is_empty() {
        out.push_str("\n\nTry next:");
        for suggestion in suggestions {
            out.push_str(&format!("\n  - {}", suggestion));
        }
    }
    out
}
