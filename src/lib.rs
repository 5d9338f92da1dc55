pub mod core;
pub mod export;
pub mod ocr;
pub mod pipeline;
pub mod server;

pub use crate::core::model::{Detection, DocumentResult, Line, PageResult, WordDetail};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
