//! OCR capability
//!
//! Recognition itself is delegated to external engines. This module defines
//! the seam they plug into, the concrete subprocess backends, the prioritized
//! engine chain, page rasterization and the reading-order line builder.

pub mod bridge;
pub mod chain;
pub mod layout_builder;
pub mod preprocess;
pub mod renderer;
pub mod tesseract;

use std::path::Path;

use crate::core::model::Detection;

pub use bridge::ScriptRecognizer;
pub use chain::{EngineSelection, ProviderAttempt, RecognizerChain};
pub use layout_builder::{LineBuilder, DEFAULT_LINE_THRESHOLD};
pub use renderer::{PopplerRasterizer, Rasterizer};
pub use tesseract::TesseractRecognizer;

/// Per-request recognition options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizeOptions {
    /// Language hints, engine specific (`en`, `eng`, `ch`, ...). Empty means
    /// the engine default.
    pub languages: Vec<String>,
    pub gpu: bool,
}

/// A text recognizer. Implementations must be cheap to call repeatedly; any
/// heavy model loading belongs in construction or `probe`.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Verify the engine can serve requests.
    fn probe(&self) -> Result<(), OcrError>;

    fn recognize(&self, image: &Path, options: &RecognizeOptions)
        -> Result<Vec<Detection>, OcrError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    Unavailable(String),

    #[error("no OCR engine could be initialized ({})", summarize(.0))]
    NoEngine(Vec<ProviderAttempt>),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("failed to parse OCR output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn summarize(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no engines configured".to_string();
    }
    attempts
        .iter()
        .map(|a| match &a.error {
            Some(e) => format!("{}: {e}", a.engine),
            None => a.engine.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
