use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/route", post(handlers::route_handler))
        .route("/chat", post(handlers::chat_handler))
        // Agent endpoints (GET routes also accept a WebSocket upgrade)
        .route("/agents", get(handlers::list_agents))
        .route("/agents/:agent_type/:agent_id", get(handlers::get_status))
        .route("/agents/:agent_type/:agent_id/status", get(handlers::get_status))
        .route("/agents/:agent_type/:agent_id/state", get(handlers::get_state))
        .route("/agents/:agent_type/:agent_id/reset", post(handlers::reset_agent))
        .route(
            "/agents/:agent_type/:agent_id/initialize",
            post(handlers::initialize_agent),
        )
        .route("/agents/:agent_type/:agent_id/action", post(handlers::run_action))
        .route(
            "/agents/:agent_type/:agent_id/human-input",
            post(handlers::submit_human_input),
        )
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
