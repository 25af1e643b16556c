//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, info};

use super::types::{DestroyResponse, SendResponse, StatusResponse};
use crate::session::SessionManager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Service information endpoint.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "chat-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Current session status and login image.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.manager.status().into())
}

/// Send a message. The leading `id` segment is free-form and only logged.
pub async fn send_message(
    State(state): State<AppState>,
    Path((id, recipient, body)): Path<(String, String, String)>,
) -> Json<SendResponse> {
    debug!(id = %id, recipient = %recipient, len = body.len(), "send requested");
    let outcome = state.manager.send_message(&recipient, &body).await;
    Json(outcome.into())
}

/// Log out and wipe the session, then arm a fresh one.
pub async fn destroy_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<DestroyResponse> {
    info!(id = %id, "destroy requested");
    let outcome = state.manager.destroy().await;
    Json(outcome.into())
}
