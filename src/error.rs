use thiserror::Error;

/// Main error type for the agent runtime
#[derive(Error, Debug)]
pub enum AgentError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Input errors (surfaced before an operation runs)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Data source errors
    #[error("Source unavailable: {source_name} - {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("All sources exhausted: {0}")]
    AllSourcesExhausted(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // Operation errors
    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Invalid step transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Shorthand for a single failed data source
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, used in logs and WebSocket error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "config",
            AgentError::Validation(_) => "validation",
            AgentError::SourceUnavailable { .. } => "source_unavailable",
            AgentError::AllSourcesExhausted(_) => "all_sources_exhausted",
            AgentError::Timeout(_) => "timeout",
            AgentError::Operation(_) => "operation",
            AgentError::InvalidTransition { .. } => "invalid_transition",
            AgentError::NotFound(_) => "not_found",
            AgentError::Storage(_) => "storage",
            #[cfg(feature = "postgres")]
            AgentError::Database(_) => "storage",
            AgentError::Http(_) => "http",
            AgentError::Json(_) => "json",
            AgentError::Io(_) => "io",
            AgentError::Unknown(_) | AgentError::Other(_) => "unknown",
        }
    }
}

/// Result type alias for AgentError
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AgentError::Validation("x".into()).kind(), "validation");
        assert_eq!(AgentError::Timeout("slow".into()).kind(), "timeout");
        assert_eq!(
            AgentError::source_unavailable("binance", "503").kind(),
            "source_unavailable"
        );
    }

    #[test]
    fn test_source_unavailable_message() {
        let err = AgentError::source_unavailable("coingecko", "rate limited");
        assert_eq!(
            err.to_string(),
            "Source unavailable: coingecko - rate limited"
        );
    }
}
