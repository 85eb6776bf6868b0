use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::api::{state::AppState, types::*, websocket::agent_socket};
use crate::domain::{AgentType, OperationResult};
use crate::runtime::{HumanInputResponse, InitializeParams};

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

fn parse_agent_type(raw: &str) -> ApiResult<AgentType> {
    raw.parse::<AgentType>()
        .map_err(|e| (StatusCode::NOT_FOUND, e))
}

/// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    Json(AgentListResponse {
        agents: state.orchestrator.registry().describe(),
        live_actors: state.orchestrator.actor_count(),
    })
}

/// GET /agents/:agent_type/:agent_id[/status] -- WebSocket upgrade or status
pub async fn get_status(
    ws: Option<WebSocketUpgrade>,
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let agent_type = parse_agent_type(&agent_type)?;
    if let Some(ws) = ws {
        return Ok(agent_socket(ws, state, agent_type, agent_id).await?.into_response());
    }
    let result = state
        .orchestrator
        .get_agent_status(agent_type, &agent_id)
        .await;
    Ok(Json(result).into_response())
}

/// GET /agents/:agent_type/:agent_id/state
pub async fn get_state(
    ws: Option<WebSocketUpgrade>,
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let agent_type = parse_agent_type(&agent_type)?;
    if let Some(ws) = ws {
        return Ok(agent_socket(ws, state, agent_type, agent_id).await?.into_response());
    }
    let result = state.orchestrator.agent_state(agent_type, &agent_id).await;
    Ok(Json(result).into_response())
}

/// POST /agents/:agent_type/:agent_id/reset
pub async fn reset_agent(
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Json<OperationResult<Value>>> {
    let agent_type = parse_agent_type(&agent_type)?;
    Ok(Json(state.orchestrator.reset_agent(agent_type, &agent_id).await))
}

/// POST /agents/:agent_type/:agent_id/initialize
pub async fn initialize_agent(
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(params): Json<InitializeParams>,
) -> ApiResult<Json<OperationResult<Value>>> {
    let agent_type = parse_agent_type(&agent_type)?;
    Ok(Json(
        state
            .orchestrator
            .initialize_agent(agent_type, &agent_id, params)
            .await,
    ))
}

/// POST /agents/:agent_type/:agent_id/action
pub async fn run_action(
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Json<OperationResult<Value>>> {
    let agent_type = parse_agent_type(&agent_type)?;
    if req.action.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "action is required".to_string()));
    }
    let params = if req.params.is_null() {
        Value::Object(Default::default())
    } else {
        req.params
    };
    Ok(Json(
        state
            .orchestrator
            .execute_on_agent(agent_type, &agent_id, req.action.trim(), params)
            .await,
    ))
}

/// POST /agents/:agent_type/:agent_id/human-input
pub async fn submit_human_input(
    Path((agent_type, agent_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(response): Json<HumanInputResponse>,
) -> ApiResult<Json<OperationResult<Value>>> {
    let agent_type = parse_agent_type(&agent_type)?;
    Ok(Json(
        state
            .orchestrator
            .submit_human_input(agent_type, &agent_id, response),
    ))
}
