use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::state::AppState;
use crate::domain::AgentType;
use crate::runtime::{AgentHandle, Connection, HumanInputResponse};

/// Attach a live connection to one agent; the first frame is its `agent_status`
pub async fn agent_socket(
    ws: WebSocketUpgrade,
    state: AppState,
    agent_type: AgentType,
    agent_id: String,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    let (handle, connection) = state
        .orchestrator
        .attach_connection(agent_type, &agent_id)
        .await
        .map_err(|e| {
            warn!("WebSocket attach to {}:{} rejected: {}", agent_type, agent_id, e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, connection)))
}

async fn handle_socket(socket: WebSocket, handle: Arc<AgentHandle>, connection: Connection) {
    let (mut sender, mut receiver) = socket.split();
    let Connection {
        id: connection_id,
        receiver: mut outbound,
    } = connection;

    // Forward agent messages to this WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames may carry human-input responses
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<HumanInputResponse>(&text) {
                Ok(response) => {
                    let resolved = handle.runtime().resolve_human_input(response);
                    debug!("Human input over WebSocket resolved={}", resolved);
                }
                Err(_) => debug!("Ignoring WebSocket frame: {}", text),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    if let Err(e) = handle.runtime().detach_connection(&connection_id).await {
        warn!("Failed to detach connection {}: {}", connection_id, e);
    }
    info!(
        "WebSocket connection {} to {} closed",
        connection_id,
        handle.runtime().agent_id()
    );
}
