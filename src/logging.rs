//! Tracing subscriber setup

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Console output (plain or JSON) plus an optional daily file under `AGORA_LOG_DIR`.
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},agora=debug", config.level)));

    let log_dir = std::env::var("AGORA_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        // rolling::daily panics when it cannot create its file, so check writability first
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {} ({}), file logging disabled", dir, e);
            return None;
        }
        let marker = Path::new(dir).join(".agora_write_test");
        if let Err(e) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
        {
            eprintln!("Warning: Could not write to log directory {} ({}), file logging disabled", dir, e);
            return None;
        }
        let _ = std::fs::remove_file(&marker);

        let file_appender = tracing_appender::rolling::daily(dir, "agora.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // process-lifetime guard
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: logging already initialized ({})", e);
        return;
    }

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/agora.log", dir);
    }
}

/// Minimal logging for one-shot CLI commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
