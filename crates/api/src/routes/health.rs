//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Static facts about the running server, reported by `/health`.
#[derive(Debug, Clone, Copy)]
pub struct HealthInfo {
    pub storage: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

/// GET /health: liveness plus the storage backend in use.
pub async fn check(State(info): State<HealthInfo>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: info.storage,
    })
}
