//! Health and liveness handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "vent".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ping response.
#[derive(Debug, Serialize)]
pub struct PingResponse {
    /// Always `pong`.
    pub message: &'static str,
}

/// Liveness check used by clients to detect an offline backend.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

/// Public client configuration.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    /// Media server URL.
    pub livekit_url: String,
    /// Always `running`.
    pub server_status: &'static str,
}

/// Client configuration endpoint.
pub async fn config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        livekit_url: state.media.server_url().to_string(),
        server_status: "running",
    })
}
