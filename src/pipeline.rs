use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::core::confidence::{mean, weighted_document_confidence};
use crate::core::model::{Detection, DocumentResult, PageResult, PageSummary, WordDetail};
use crate::ocr::chain::EngineSelection;
use crate::ocr::layout_builder::{LineBuilder, DEFAULT_LINE_THRESHOLD};
use crate::ocr::preprocess::binarize_file;
use crate::ocr::renderer::{PopplerRasterizer, Rasterizer};
use crate::ocr::RecognizeOptions;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_SCALE: f32 = 2.0;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Vertical pixel distance that separates two lines.
    pub line_threshold: f32,
    /// Detections below this confidence are dropped; `0.0` keeps everything.
    pub min_confidence: f64,
    /// Detections with fewer characters (after trimming) are dropped.
    pub min_text_chars: usize,
    /// PDF rasterization zoom; 1.0 is 72 DPI.
    pub scale: f32,
    pub binarize: bool,
    pub recognize: RecognizeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            line_threshold: DEFAULT_LINE_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            min_text_chars: 1,
            scale: DEFAULT_SCALE,
            binarize: false,
            recognize: RecognizeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            e if IMAGE_EXTENSIONS.contains(&e) => Ok(Self::Image),
            "" => Err(PipelineError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(PipelineError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("input file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported file format {0}; expected a PDF or image file")]
    UnsupportedFormat(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to open PDF: {0:#}")]
    Rasterize(anyhow::Error),

    #[error("recognition failed on every page: {0}")]
    Recognition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors caused by the request rather than by the engine or host.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::UnsupportedFormat(_) | Self::InvalidInput(_)
        )
    }
}

/// Rasterize, recognize and aggregate one document at a time.
///
/// The pipeline owns the selected recognizer; it is shared across requests
/// and never re-initialized. Each request works inside its own temporary
/// directory, deleted when the request finishes on any path.
#[derive(Clone)]
pub struct Pipeline {
    engine: EngineSelection,
    rasterizer: Arc<dyn Rasterizer>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(engine: EngineSelection) -> Self {
        Self {
            engine,
            rasterizer: Arc::new(PopplerRasterizer::new()),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &EngineSelection {
        &self.engine
    }

    pub fn rasterizer(&self) -> &dyn Rasterizer {
        self.rasterizer.as_ref()
    }

    /// Process a file on disk with the pipeline's own configuration.
    pub fn process_file(&self, input: &Path) -> Result<DocumentResult, PipelineError> {
        self.process_file_with(input, &self.config)
    }

    /// Process a file on disk, overriding the pipeline's configuration.
    pub fn process_file_with(
        &self,
        input: &Path,
        config: &PipelineConfig,
    ) -> Result<DocumentResult, PipelineError> {
        if !input.is_file() {
            return Err(PipelineError::NotFound(input.to_path_buf()));
        }
        let kind = InputKind::from_path(input)?;
        let work_dir = scratch_dir()?;
        self.run(input, kind, work_dir.path(), config)
    }

    /// Process uploaded bytes; `file_name` only decides the input kind.
    pub fn process_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<DocumentResult, PipelineError> {
        self.process_bytes_with(file_name, bytes, &self.config)
    }

    pub fn process_bytes_with(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &PipelineConfig,
    ) -> Result<DocumentResult, PipelineError> {
        let kind = InputKind::from_path(Path::new(file_name))?;
        if bytes.is_empty() {
            return Err(PipelineError::InvalidInput(format!("{file_name} is empty")));
        }

        let work_dir = scratch_dir()?;
        let ext = match kind {
            InputKind::Pdf => "pdf".to_string(),
            InputKind::Image => Path::new(file_name)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_else(|| "png".to_string()),
        };
        let input = work_dir.path().join(format!("upload.{ext}"));
        fs::write(&input, bytes)?;
        tracing::debug!(file = file_name, bytes = bytes.len(), "stored upload");

        self.run(&input, kind, work_dir.path(), config)
    }

    fn run(
        &self,
        input: &Path,
        kind: InputKind,
        work_dir: &Path,
        config: &PipelineConfig,
    ) -> Result<DocumentResult, PipelineError> {
        let pages = match kind {
            InputKind::Image => {
                tracing::info!(total_pages = 1, "processing image");
                vec![self.recognize_page(input, 0, work_dir, config)]
            }
            InputKind::Pdf => {
                let total = self
                    .rasterizer
                    .page_count(input)
                    .map_err(PipelineError::Rasterize)?;
                tracing::info!(total_pages = total, "processing PDF");

                (0..total)
                    .map(|page_idx| {
                        tracing::info!(page = page_idx + 1, total_pages = total, "processing page");
                        match self
                            .rasterizer
                            .render_page(input, page_idx, config.scale, work_dir)
                        {
                            Ok(image) => self.recognize_page(&image, page_idx, work_dir, config),
                            Err(e) => {
                                tracing::warn!(page = page_idx + 1, error = %format!("{e:#}"), "skipping page that failed to render");
                                PageResult::failed(page_idx, format!("render failed: {e:#}"))
                            }
                        }
                    })
                    .collect()
            }
        };

        if !pages.is_empty() && pages.iter().all(PageResult::is_failed) {
            let reason = pages
                .iter()
                .filter_map(|p| p.error.as_deref())
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(PipelineError::Recognition(reason));
        }

        let document = assemble(kind, &pages, self.engine.engine());
        tracing::info!(
            pages = document.pages,
            words = document.words.len(),
            confidence = document.confidence,
            engine = %document.engine,
            "document processed"
        );
        Ok(document)
    }

    fn recognize_page(
        &self,
        image: &Path,
        page_idx: usize,
        work_dir: &Path,
        config: &PipelineConfig,
    ) -> PageResult {
        let image = if config.binarize {
            match binarize_file(image, work_dir) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(page = page_idx + 1, error = %format!("{e:#}"), "skipping page that failed to preprocess");
                    return PageResult::failed(page_idx, format!("preprocess failed: {e:#}"));
                }
            }
        } else {
            image.to_path_buf()
        };

        let recognizer = self.engine.recognizer();
        match recognizer.recognize(&image, &config.recognize) {
            Ok(detections) => build_page(page_idx, detections, config),
            Err(e) => {
                tracing::warn!(page = page_idx + 1, engine = recognizer.name(), error = %e, "skipping page that failed to recognize");
                PageResult::failed(page_idx, e.to_string())
            }
        }
    }
}

fn scratch_dir() -> Result<TempDir, PipelineError> {
    Ok(TempDir::with_prefix("pagetext-")?)
}

/// Filter one page's detections and group them into lines.
pub fn build_page(
    page_idx: usize,
    mut detections: Vec<Detection>,
    config: &PipelineConfig,
) -> PageResult {
    let received = detections.len();
    // Non-finite confidences pass through so the line builder reports them.
    detections.retain(|d| {
        (!d.confidence.is_finite() || d.confidence >= config.min_confidence)
            && d.text.trim().chars().count() >= config.min_text_chars
    });
    tracing::debug!(
        page = page_idx + 1,
        received,
        kept = detections.len(),
        "filtered detections"
    );

    let lines = LineBuilder::new(config.line_threshold).build(detections);
    let confidences: Vec<f64> = lines
        .iter()
        .flat_map(|line| line.words.iter().map(|w| w.confidence))
        .collect();

    PageResult {
        page_index: page_idx,
        lines,
        confidence: mean(confidences.iter().copied()),
        detections: confidences.len(),
        error: None,
    }
}

/// Fold page results into the response document.
pub fn assemble(kind: InputKind, pages: &[PageResult], engine: &str) -> DocumentResult {
    let text = match kind {
        InputKind::Image => pages.first().map(PageResult::text).unwrap_or_default(),
        InputKind::Pdf => pages
            .iter()
            .map(|page| {
                let marker = page_marker(page.page_index);
                let body = page.text();
                if body.is_empty() {
                    marker
                } else {
                    format!("{marker}\n{body}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    let words = pages
        .iter()
        .flat_map(|page| {
            page.lines.iter().flat_map(move |line| {
                line.words.iter().filter_map(move |word| {
                    word.quad().map(|quad| WordDetail {
                        text: word.text.clone(),
                        confidence: word.confidence,
                        bbox: *quad.corners(),
                        page: page.page_index,
                    })
                })
            })
        })
        .collect();

    DocumentResult {
        text,
        confidence: weighted_document_confidence(pages),
        words,
        pages: pages.len(),
        engine: engine.to_string(),
        page_results: pages.iter().map(PageSummary::from).collect(),
    }
}

pub fn page_marker(page_idx: usize) -> String {
    format!("--- Page {} ---", page_idx + 1)
}
