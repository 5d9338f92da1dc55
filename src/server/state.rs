//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::ocr::chain::ProviderAttempt;
use crate::pipeline::Pipeline;
use crate::server::error::AppError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// `None` when no OCR engine could be initialized at startup.
    pipeline: Option<Pipeline>,
    attempts: Vec<ProviderAttempt>,
    request_timeout: Duration,
}

impl AppState {
    /// State backed by a pipeline whose engine is already selected.
    pub fn new(pipeline: Pipeline, request_timeout: Duration) -> Self {
        let attempts = pipeline.engine().attempts().to_vec();
        Self {
            inner: Arc::new(AppStateInner {
                pipeline: Some(pipeline),
                attempts,
                request_timeout,
            }),
        }
    }

    /// State for a server that came up without a working engine. Status
    /// reporting keeps working; processing answers 503.
    pub fn unavailable(attempts: Vec<ProviderAttempt>, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                pipeline: None,
                attempts,
                request_timeout,
            }),
        }
    }

    pub fn pipeline(&self) -> Result<&Pipeline, AppError> {
        self.inner.pipeline.as_ref().ok_or_else(|| {
            AppError::EngineUnavailable("OCR service not properly initialized".to_string())
        })
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.inner.pipeline.as_ref().map(|p| p.engine().engine())
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.inner.attempts
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}
