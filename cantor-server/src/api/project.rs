//! Project session API handlers
//!
//! GET /api/project, GET /api/project/status, POST /api/project/load,
//! POST /api/project/unload, POST /api/project/export,
//! POST /api/project/export/cancel

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::error::Error;
use crate::models::project::{Project, ProjectSummary};
use crate::services::UnloadOutcome;
use crate::AppState;

/// Display name used when neither the path nor the content names the project
const UNTITLED: &str = "Untitled";

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_project: Option<ProjectSummary>,
}

/// POST /api/project/load request; at least one field is required
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub ustx_content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub status: &'static str,
    pub project: ProjectSummary,
}

#[derive(Debug, Serialize)]
pub struct UnloadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub output_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub status: &'static str,
    pub output_path: String,
    pub job_id: Uuid,
    pub duration_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
    pub cancelled: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// File stem of the path, else the stored name, else "Untitled"
fn display_name(path: Option<&Path>, stored: &str) -> String {
    path.and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .or_else(|| Some(stored.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// GET /api/project
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        message: "HTTP API is running",
    })
}

/// GET /api/project/status
pub async fn project_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        current_project: state.session.status().await,
    })
}

/// POST /api/project/load
///
/// Inline `ustxContent` wins over `filePath`; when both are given the path
/// is only recorded as the project's source.
pub async fn load_project(
    State(state): State<AppState>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> ApiResult<Json<LoadResponse>> {
    let Json(request) = payload?;
    let file_path = non_empty(request.file_path).map(PathBuf::from);
    let content = non_empty(request.ustx_content);

    let mut project: Project = match (content, &file_path) {
        (Some(content), _) => {
            let mut project = state.serializer.parse(&content)?;
            project.file_path = file_path.clone();
            project
        }
        (None, Some(path)) => state.serializer.read(path)?,
        (None, None) => {
            return Err(Error::MissingInput("filePath or ustxContent is required".to_string()).into())
        }
    };

    project.name = display_name(file_path.as_deref(), &project.name);
    project.after_load(&state.singers, &state.phonemizers);

    let summary = state.session.load(project).await?;
    Ok(Json(LoadResponse {
        status: "ok",
        project: summary,
    }))
}

/// POST /api/project/unload
pub async fn unload_project(State(state): State<AppState>) -> Json<UnloadResponse> {
    match state.session.unload().await {
        UnloadOutcome::Unloaded(_) => Json(UnloadResponse {
            status: Some("ok"),
            message: None,
        }),
        UnloadOutcome::NothingLoaded => Json(UnloadResponse {
            status: None,
            message: Some("nothing loaded"),
        }),
    }
}

/// POST /api/project/export
///
/// The mixdown is cancelled if the client goes away before it finishes.
pub async fn export_project(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> ApiResult<Json<ExportResponse>> {
    let Json(request) = payload?;
    let output_path = request.output_path.trim().to_string();

    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();

    let report = state
        .orchestrator
        .export(Path::new(&output_path), token)
        .await?;

    Ok(Json(ExportResponse {
        status: "ok",
        output_path,
        job_id: report.job_id,
        duration_seconds: report.duration_seconds,
    }))
}

/// POST /api/project/export/cancel
pub async fn cancel_export(State(state): State<AppState>) -> Json<CancelResponse> {
    let cancelled = state.orchestrator.cancel_active();
    if cancelled {
        tracing::info!("Export cancellation requested");
    }
    Json(CancelResponse {
        status: "ok",
        cancelled,
    })
}

/// Build project session routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/project", get(ping))
        .route("/api/project/status", get(project_status))
        .route("/api/project/load", post(load_project))
        .route("/api/project/unload", post(unload_project))
        .route("/api/project/export", post(export_project))
        .route("/api/project/export/cancel", post(cancel_export))
}
