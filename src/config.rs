use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::AgentConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket API
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Defaults applied to every freshly created agent record
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Default cache TTL (5 minutes)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Soft per-agent request budget
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// How long a human-input step waits before giving up
    #[serde(default = "default_human_input_timeout_ms")]
    pub human_input_timeout_ms: u64,
    /// Interval of the periodic cache sweep (hourly)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_rate_limit() -> u32 {
    60
}

fn default_human_input_timeout_ms() -> u64 {
    300_000
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            rate_limit_per_minute: default_rate_limit(),
            human_input_timeout_ms: default_human_input_timeout_ms(),
            cache_cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn agent_defaults(&self) -> AgentConfig {
        AgentConfig {
            cache_enabled: self.cache_enabled,
            cache_ttl_ms: self.cache_ttl_ms,
            rate_limit_per_minute: self.rate_limit_per_minute,
            human_input_timeout_ms: self.human_input_timeout_ms,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the file backend
    #[serde(default = "default_state_dir")]
    pub path: PathBuf,
    /// Connection URL for the postgres backend
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data/agents")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: default_state_dir(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for synthesis and news search
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_url() -> String {
    "https://api.x.ai/v1".to_string()
}

fn default_llm_model() -> String {
    "grok-3-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Reference market feeds; each can be switched off independently
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_true")]
    pub binance_enabled: bool,
    #[serde(default = "default_binance_url")]
    pub binance_url: String,
    #[serde(default = "default_true")]
    pub coingecko_enabled: bool,
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    /// Per-source timeout inside a fallback chain
    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_feed_retries")]
    pub retry_count: u32,
}

fn default_binance_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_feed_timeout_ms() -> u64 {
    5000
}

fn default_feed_retries() -> u32 {
    2
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            binance_enabled: true,
            binance_url: default_binance_url(),
            coingecko_enabled: true,
            coingecko_url: default_coingecko_url(),
            timeout_ms: default_feed_timeout_ms(),
            retry_count: default_feed_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            runtime: RuntimeConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            feeds: FeedsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("runtime.cache_ttl_ms", default_cache_ttl_ms() as i64)?
            .set_default("storage.backend", "memory")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AGORA_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AGORA_LLM__API_KEY, etc.)
            .add_source(
                Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.runtime.cache_ttl_ms == 0 {
            errors.push("runtime.cache_ttl_ms must be positive".to_string());
        }

        if self.runtime.rate_limit_per_minute == 0 {
            errors.push("runtime.rate_limit_per_minute must be positive".to_string());
        }

        if self.runtime.cache_cleanup_interval_secs == 0 {
            errors.push("runtime.cache_cleanup_interval_secs must be positive".to_string());
        }

        if self.storage.backend == StorageBackend::Postgres && self.storage.url.is_none() {
            errors.push("storage.url is required for the postgres backend".to_string());
        }

        if self.feeds.timeout_ms == 0 {
            errors.push("feeds.timeout_ms must be positive".to_string());
        }

        if !self.feeds.binance_enabled && !self.feeds.coingecko_enabled {
            errors.push("at least one market feed must be enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
