use super::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub port: u16,
    pub version: String,
}

/// Health check endpoint - GET /v1/healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        port: state.config.port,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
