//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    /// Module name ("cantor-server")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    pub uptime_seconds: u64,
    /// Whether a project is currently loaded
    pub project_loaded: bool,
    pub installed_singers: usize,
    pub phonemizers: Vec<PhonemizerInfo>,
}

/// One registered phonemizer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhonemizerInfo {
    pub id: String,
    pub display_name: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        project_loaded: state.session.status().await.is_some(),
        installed_singers: state.singers.len(),
        phonemizers: state
            .phonemizers
            .factories()
            .map(|f| PhonemizerInfo {
                id: f.id().to_string(),
                display_name: f.display_name().to_string(),
            })
            .collect(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
