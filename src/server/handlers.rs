use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::pipeline::{PipelineError, RunEvent};
use crate::segments::{Segment, ValidationResult};
use crate::tools::{MediaTools, ToolError};

/// Header carrying the server-side artifact name
pub const ARTIFACT_HEADER: &str = "x-artifact-name";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub tools: String,
    pub backend: String,
    pub message: String,
}

impl StatusResponse {
    /// Response for the outcome of a tool availability probe
    pub fn from_probe(backend: &str, probe: &Result<(), ToolError>) -> Self {
        match probe {
            Ok(()) => Self {
                status: "ok".to_string(),
                tools: "running".to_string(),
                backend: backend.to_string(),
                message: "Media tools are available".to_string(),
            },
            Err(e) => Self {
                status: "error".to_string(),
                tools: "not running".to_string(),
                backend: backend.to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(ValidationResult),
    Pipeline(PipelineError),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(result) => ApiError::Validation(result),
            other => ApiError::Pipeline(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            ApiError::Validation(result) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Invalid segments",
                    "validation": result,
                }),
            ),
            ApiError::Pipeline(err) => {
                let status = match err.stage() {
                    crate::pipeline::Stage::Prerequisites => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    serde_json::json!({
                        "error": err.to_string(),
                        "stage": err.stage(),
                        "details": err.details(),
                    }),
                )
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

fn log_event(event: &RunEvent) {
    match event {
        RunEvent::StateChanged(state) => tracing::debug!("Run state: {:?}", state),
        RunEvent::SegmentDownloaded {
            index,
            total,
            content_key,
            cache_hit,
        } => tracing::info!(
            "Segment {}/{}: video {} {}",
            index,
            total,
            content_key,
            if *cache_hit { "from cache" } else { "downloaded" }
        ),
        RunEvent::SegmentExtracted { index, total } => {
            tracing::info!("Segment {}/{}: audio extracted", index, total)
        }
        RunEvent::Merged { path } => tracing::info!("Merged into {}", path.display()),
    }
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
pub fn content_disposition(file_name: &str) -> Result<HeaderValue, ApiError> {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );

    HeaderValue::from_str(&value)
        .map_err(|e| ApiError::Internal(format!("Invalid download file name: {}", e)))
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    tracing::info!(
        "Generation requested: {} segments{}",
        request.segments.len(),
        request
            .project_name
            .as_deref()
            .map(|name| format!(" for {:?}", name))
            .unwrap_or_default()
    );

    let output = state
        .pipeline
        .run_with_progress(request.project_name.as_deref(), &request.segments, &log_event)
        .await?;

    let file = tokio::fs::File::open(&output.artifact_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to open generated audio: {}", e)))?;
    let length = file.metadata().await.ok().map(|metadata| metadata.len());

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mp4"));
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&output.suggested_name)?);
    headers.insert(
        ARTIFACT_HEADER,
        HeaderValue::from_str(&output.file_name)
            .map_err(|e| ApiError::Internal(format!("Invalid artifact name: {}", e)))?,
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

pub async fn status(State(state): State<AppState>) -> (StatusCode, Json<StatusResponse>) {
    let tools = state.pipeline.tools();
    let probe = tools.check_available().await;
    if let Err(e) = &probe {
        tracing::warn!("Status probe failed: {}", e);
    }

    let status = if probe.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(StatusResponse::from_probe(tools.backend_name(), &probe)))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Parody generator is running",
    }))
}
