//! HTTP routes
//!
//! - `GET /` usage hint
//! - `GET /status` engine selection report
//! - `GET /health` liveness
//! - `POST /process_document` multipart upload (`file` field) returning the
//!   recognized document
//! - `POST /process_base64` the same for a JSON body `{"file": "<base64>"}`

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::core::model::DocumentResult;
use crate::ocr::chain::ProviderAttempt;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::server::error::{AppError, Result};
use crate::server::state::AppState;

/// Uploads larger than this are rejected before processing.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/process_document", post(process_document))
        .route("/process_base64", post(process_base64))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Document OCR API. POST a PDF or image as multipart field `file` to /process_document, or as base64 JSON `{\"file\"}` to /process_base64."
            .to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    pub attempts: Vec<ProviderAttempt>,
    pub message: String,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let response = match state.engine_name() {
        Some(engine) => StatusResponse {
            status: "ok".to_string(),
            engine: Some(engine.to_string()),
            attempts: state.attempts().to_vec(),
            message: format!("OCR service is running on {engine}"),
        },
        None => StatusResponse {
            status: "error".to_string(),
            engine: None,
            attempts: state.attempts().to_vec(),
            message: "OCR service failed to initialize".to_string(),
        },
    };
    Json(response)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Per-request overrides of the server's pipeline defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessParams {
    /// Comma-separated language hints.
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub gpu: Option<bool>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub line_threshold: Option<f32>,
}

impl ProcessParams {
    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(lang) = &self.lang {
            config.recognize.languages = lang
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(gpu) = self.gpu {
            config.recognize.gpu = gpu;
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(AppError::BadRequest(format!(
                    "min_confidence must be within [0, 1], got {min}"
                )));
            }
            config.min_confidence = min;
        }
        if let Some(threshold) = self.line_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(AppError::BadRequest(format!(
                    "line_threshold must be a non-negative number, got {threshold}"
                )));
            }
            config.line_threshold = threshold;
        }
        Ok(config)
    }
}

async fn process_document(
    State(state): State<AppState>,
    Query(params): Query<ProcessParams>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResult>> {
    let pipeline = state.pipeline()?.clone();
    let config = params.apply(pipeline.config().clone())?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("`file` field has no file name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload
        .ok_or_else(|| AppError::BadRequest("missing multipart field `file`".to_string()))?;

    tracing::info!(file = %file_name, bytes = bytes.len(), "processing upload");
    run_pipeline(&state, pipeline, file_name, bytes.to_vec(), config).await
}

/// Upload carried inline in a JSON body.
#[derive(Debug, Deserialize)]
pub struct Base64Upload {
    /// Standard base64 of the file contents.
    pub file: String,
    /// Decides the input kind; uploads without one are treated as PDFs.
    #[serde(default)]
    pub file_name: Option<String>,
}

async fn process_base64(
    State(state): State<AppState>,
    Query(params): Query<ProcessParams>,
    payload: std::result::Result<Json<Base64Upload>, JsonRejection>,
) -> Result<Json<DocumentResult>> {
    let pipeline = state.pipeline()?.clone();
    let config = params.apply(pipeline.config().clone())?;

    let Json(upload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let bytes = STANDARD
        .decode(upload.file.trim())
        .map_err(|e| AppError::BadRequest(format!("`file` is not valid base64: {e}")))?;
    let file_name = upload.file_name.unwrap_or_else(|| "upload.pdf".to_string());

    tracing::info!(file = %file_name, bytes = bytes.len(), "processing base64 upload");
    run_pipeline(&state, pipeline, file_name, bytes, config).await
}

/// Run the blocking pipeline off the async workers, bounded by the request
/// timeout.
async fn run_pipeline(
    state: &AppState,
    pipeline: Pipeline,
    file_name: String,
    bytes: Vec<u8>,
    config: PipelineConfig,
) -> Result<Json<DocumentResult>> {
    let timeout = state.request_timeout();
    let task = tokio::task::spawn_blocking(move || {
        pipeline.process_bytes_with(&file_name, &bytes, &config)
    });
    let document = tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| AppError::Timeout(timeout))?
        .map_err(|e| AppError::Internal(format!("processing task failed: {e}")))??;

    Ok(Json(document))
}
