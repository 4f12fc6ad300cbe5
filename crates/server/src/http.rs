//! HTTP Endpoints
//!
//! Health, metrics and the media-stream WebSocket upgrade.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::metrics::{metrics_handler, record_session_rejected};
use crate::state::AppState;
use crate::websocket::handle_socket;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.config.read().server.ws_path.clone();

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Provider media stream
        .route(&ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.active_sessions(),
    }))
}

/// Media-stream WebSocket upgrade
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    let Some(slot) = state.try_acquire_session() else {
        tracing::warn!(
            active = state.active_sessions(),
            "Rejecting media stream: session limit reached"
        );
        record_session_rejected("capacity");
        return Err(ServerError::Capacity.into());
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, slot)))
}
