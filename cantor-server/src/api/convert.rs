//! Score conversion API
//!
//! POST /api/project/convert: multipart score files plus voice and
//! phonemizer assignments in, serialized project out. The converted project
//! is not loaded into the session.

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::error::Error;
use crate::services::{ImportRequest, ScoreFile};
use crate::AppState;

/// Upper bound on a convert request body
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub status: &'static str,
    pub serialized_project: String,
}

/// Values of a list field: a JSON string array, or one plain value
fn parse_list(field: &str, text: &str) -> ApiResult<Vec<String>> {
    let text = text.trim();
    if text.starts_with('[') {
        serde_json::from_str::<Vec<String>>(text).map_err(|e| {
            ApiError::BadRequest(format!("'{}' is not a JSON string array: {}", field, e))
        })
    } else if text.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![text.to_string()])
    }
}

fn parse_bpm(text: &str) -> ApiResult<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
        .ok_or_else(|| ApiError::BadRequest(format!("bpm must be a positive number, got '{}'", text)))
}

async fn read_score_file(field: Field<'_>, index: usize) -> ApiResult<ScoreFile> {
    let name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("file{}", index + 1));
    let bytes = field.bytes().await?;
    Ok(ScoreFile::new(name, bytes.to_vec()))
}

/// Collect the multipart fields into an import request
async fn read_request(mut multipart: Multipart) -> ApiResult<ImportRequest> {
    let mut request = ImportRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let file = read_score_file(field, request.files.len()).await?;
                request.files.push(file);
            }
            "voices" | "voices[]" => {
                let text = field.text().await?;
                request.voices.extend(parse_list("voices", &text)?);
            }
            "phonemizers" | "phonemizers[]" => {
                let text = field.text().await?;
                request.phonemizers.extend(parse_list("phonemizers", &text)?);
            }
            "bpm" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    request.bpm = Some(parse_bpm(&text)?);
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(request)
}

/// POST /api/project/convert
pub async fn convert_score(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ConvertResponse>> {
    let request = read_request(multipart?).await?;

    if request.files.is_empty() {
        return Err(Error::MissingInput("at least one score file is required".to_string()).into());
    }
    if request.voices.is_empty() {
        return Err(Error::MissingInput("voices are required".to_string()).into());
    }
    if request.phonemizers.is_empty() {
        return Err(Error::MissingInput("phonemizers are required".to_string()).into());
    }

    tracing::info!(
        files = request.files.len(),
        voices = request.voices.len(),
        phonemizers = request.phonemizers.len(),
        bpm = ?request.bpm,
        "Converting score"
    );

    let importer = state.importer.clone();
    let project = tokio::task::spawn_blocking(move || importer.import(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("import task failed: {}", e)))??;

    let serialized_project = state.serializer.serialize(&project)?;

    Ok(Json(ConvertResponse {
        status: "ok",
        serialized_project,
    }))
}

pub fn convert_routes() -> Router<AppState> {
    Router::new()
        .route("/api/project/convert", post(convert_score))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
