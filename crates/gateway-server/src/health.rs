//! Liveness and readiness probes.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Process is up
    Healthy,
    /// Every pool has members and the gateway accepts traffic
    Ready,
    /// Not accepting traffic
    NotReady,
}

/// Liveness probe body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status
    pub status: HealthStatus,
    /// Gateway version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

/// Readiness probe body
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Status
    pub status: HealthStatus,
    /// Configured pools
    pub pools: usize,
    /// Why the gateway is not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// `GET /ready`: 503 while shutting down or while any pool is empty
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let pools = state.manager.registry().snapshot();
    let count = pools.categories().count();
    let reason = if state.shutdown.is_shutting_down() {
        Some("shutting down")
    } else if !pools.is_ready() {
        Some("a pool has no pipelines")
    } else {
        None
    };
    let (code, status) = match reason {
        None => (StatusCode::OK, HealthStatus::Ready),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::NotReady),
    };
    (
        code,
        Json(ReadinessResponse {
            status,
            pools: count,
            reason,
        }),
    )
}
