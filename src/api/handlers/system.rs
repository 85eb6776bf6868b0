use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::api::{state::AppState, types::*};
use crate::domain::OperationResult;
use crate::orchestrator::RouteDecision;

/// GET /health?sessionId= -- status of every agent type for one session
pub async fn health_handler(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Json<HealthResponse> {
    let session_id = query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "default".to_string());
    let agents = state.orchestrator.health_check_all(&session_id).await;
    let ok = agents.values().all(|r| r.success);

    Json(HealthResponse {
        status: if ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        session_id,
        uptime_secs: state.uptime_seconds(),
        agents,
    })
}

/// POST /route
pub async fn route_handler(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> std::result::Result<Json<RouteDecision>, (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query is required".to_string()));
    }
    Ok(Json(state.orchestrator.route_request(&req.query)))
}

/// POST /chat
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<OperationResult<Value>>, (StatusCode, String)> {
    if req.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let result = state
        .orchestrator
        .chat(
            &req.session_id,
            &req.message,
            req.user_id.as_deref(),
            req.history,
        )
        .await;
    Ok(Json(result))
}
