use agora::agents::{default_agents, AgentDeps, FeedSettings};
use agora::api::{create_router, AppState};
use agora::cli::{format_chat, format_route, Cli, Commands};
use agora::config::AppConfig;
use agora::error::{AgentError, Result};
use agora::llm::{LlmClient, TextGenerator};
use agora::logging::{init_logging, init_logging_simple};
use agora::orchestrator::{AgentRegistry, Orchestrator};
use agora::sources::{build_market_feeds, build_news_feeds};
use agora::state::build_state_store;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        return Err(AgentError::Validation(errors.join("; ")));
    }

    match cli.command {
        Commands::Serve { port } => {
            init_logging(&config.logging);
            run_server(config, port).await?;
        }
        Commands::Route { query } => {
            init_logging_simple();
            let orchestrator = build_orchestrator(&config).await?;
            println!("{}", format_route(&orchestrator.route_request(&query)));
        }
        Commands::Chat { message, session } => {
            init_logging_simple();
            let orchestrator = build_orchestrator(&config).await?;
            let result = orchestrator.chat(&session, &message, None, json!([])).await;
            println!("{}", format_chat(&result));
        }
    }

    Ok(())
}

/// Wire store, feeds, text generator and agents into one orchestrator
async fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>> {
    let store = build_state_store(&config.storage).await?;

    let generator: Option<Arc<dyn TextGenerator>> = if config.llm.is_configured() {
        Some(Arc::new(LlmClient::new(config.llm.clone())?))
    } else {
        warn!("No LLM api key configured; chat answers use templates and news search is off");
        None
    };

    let deps = AgentDeps {
        market_feeds: build_market_feeds(&config.feeds)?,
        news_feeds: build_news_feeds(generator.clone()),
        generator,
        feed_settings: FeedSettings::from(&config.feeds),
    };
    let registry = AgentRegistry::from_agents(default_agents(deps))?;

    Ok(Arc::new(Orchestrator::new(
        registry,
        store,
        config.runtime.agent_defaults(),
    )))
}

async fn run_server(config: AppConfig, port: Option<u16>) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let maintenance = orchestrator.spawn_maintenance(config.runtime.cleanup_interval());

    let app = create_router(AppState::new(Arc::clone(&orchestrator)));
    let addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Agora API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    info!("Agora API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
