use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use pretty_assertions::assert_eq;

use pagetext::core::geometry::Quad;
use pagetext::core::model::{Detection, DocumentResult};
use pagetext::export::{Exporter, JsonExporter};
use pagetext::ocr::{
    EngineSelection, OcrError, Rasterizer, RecognizeOptions, Recognizer, RecognizerChain,
    ScriptRecognizer,
};
use pagetext::pipeline::{Pipeline, PipelineConfig, PipelineError};

fn at(text: &str, x: f32, y: f32, confidence: f64) -> Detection {
    let quad = Quad::from_rect(x - 5.0, y - 5.0, 10.0, 10.0);
    Detection::new(text, confidence, quad.corners().to_vec())
}

/// Writes a placeholder image per page; pages listed in `broken` fail.
struct FakeRasterizer {
    pages: usize,
    broken: Vec<usize>,
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self, _pdf_path: &Path) -> Result<usize> {
        Ok(self.pages)
    }

    fn render_page(
        &self,
        _pdf_path: &Path,
        page_idx: usize,
        _scale: f32,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        if self.broken.contains(&page_idx) {
            anyhow::bail!("corrupt page stream");
        }
        let path = out_dir.join(format!("page_{:03}.png", page_idx + 1));
        fs::write(&path, b"png")?;
        Ok(path)
    }
}

/// Returns two words per page; images whose name contains `fail_on` error.
#[derive(Default)]
struct FakeRecognizer {
    fail_on: Option<&'static str>,
    seen: Mutex<Vec<PathBuf>>,
}

impl Recognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn probe(&self) -> Result<(), OcrError> {
        Ok(())
    }

    fn recognize(
        &self,
        image: &Path,
        _options: &RecognizeOptions,
    ) -> Result<Vec<Detection>, OcrError> {
        self.seen.lock().unwrap().push(image.to_path_buf());
        let name = image.file_name().unwrap().to_string_lossy().into_owned();
        if let Some(marker) = self.fail_on {
            if name.contains(marker) {
                return Err(OcrError::Engine("CUDA out of memory".to_string()));
            }
        }
        Ok(vec![
            at("mg/dL", 90.0, 12.0, 0.6),
            at(&name, 10.0, 10.0, 1.0),
        ])
    }
}

fn pipeline(recognizer: Arc<FakeRecognizer>, rasterizer: FakeRasterizer) -> Pipeline {
    Pipeline::new(EngineSelection::direct(recognizer)).with_rasterizer(Arc::new(rasterizer))
}

fn fake_pdf(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("labs.pdf");
    fs::write(&path, b"%PDF-1.7 fake")?;
    Ok(path)
}

#[test]
fn failed_page_does_not_abort_document() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fake_pdf(dir.path())?;
    let recognizer = Arc::new(FakeRecognizer {
        fail_on: Some("page_002"),
        ..FakeRecognizer::default()
    });
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 3, broken: vec![] });

    let document = pipeline.process_file(&input)?;

    assert_eq!(document.pages, 3);
    assert_eq!(
        document.text,
        "--- Page 1 ---\npage_001.png mg/dL\n\n--- Page 2 ---\n\n--- Page 3 ---\npage_003.png mg/dL"
    );
    assert_eq!(document.words.len(), 4);
    assert_eq!(
        document.words.iter().map(|w| w.page).collect::<Vec<_>>(),
        vec![0, 0, 2, 2]
    );
    let failed: Vec<_> = document.failed_pages().map(|p| p.page).collect();
    assert_eq!(failed, vec![1]);
    assert!(document.page_results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("CUDA out of memory"));
    assert_eq!(document.confidence, 0.8);
    assert_eq!(recognizer.seen.lock().unwrap().len(), 3);
    Ok(())
}

#[test]
fn render_failure_skips_only_that_page() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fake_pdf(dir.path())?;
    let recognizer = Arc::new(FakeRecognizer::default());
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 2, broken: vec![0] });

    let document = pipeline.process_file(&input)?;

    assert_eq!(document.pages, 2);
    assert!(document.text.starts_with("--- Page 1 ---\n\n--- Page 2 ---\npage_002.png"));
    assert!(document.page_results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("corrupt page stream"));
    assert_eq!(recognizer.seen.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn every_page_failing_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fake_pdf(dir.path())?;
    let recognizer = Arc::new(FakeRecognizer {
        fail_on: Some("page_"),
        ..FakeRecognizer::default()
    });
    let pipeline = pipeline(recognizer, FakeRasterizer { pages: 2, broken: vec![] });

    let err = pipeline
        .process_file(&input)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Recognition(_)));
    Ok(())
}

#[test]
fn zero_page_pdf_yields_empty_document() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fake_pdf(dir.path())?;
    let pipeline = pipeline(
        Arc::new(FakeRecognizer::default()),
        FakeRasterizer { pages: 0, broken: vec![] },
    );

    let document = pipeline.process_file(&input)?;
    assert_eq!(document.text, "");
    assert_eq!(document.confidence, 0.0);
    assert_eq!(document.pages, 0);
    Ok(())
}

#[test]
fn working_directory_is_removed_after_processing() -> Result<()> {
    let recognizer = Arc::new(FakeRecognizer {
        fail_on: Some("page_002"),
        ..FakeRecognizer::default()
    });
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 2, broken: vec![] });

    pipeline.process_bytes("scan.pdf", b"%PDF-1.7 fake")?;

    let seen = recognizer.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for image in seen.iter() {
        assert!(!image.exists(), "{} should be cleaned up", image.display());
        assert!(!image.parent().unwrap().exists());
    }
    Ok(())
}

#[test]
fn working_directory_is_removed_when_every_page_fails() -> Result<()> {
    let recognizer = Arc::new(FakeRecognizer {
        fail_on: Some("page_"),
        ..FakeRecognizer::default()
    });
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 3, broken: vec![] });

    let err = pipeline.process_bytes("scan.pdf", b"%PDF-1.7 fake").unwrap_err();
    assert!(matches!(err, PipelineError::Recognition(_)));

    let seen = recognizer.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    for image in seen.iter() {
        assert!(!image.exists(), "{} should be cleaned up", image.display());
        assert!(!image.parent().unwrap().exists());
    }
    Ok(())
}

#[test]
fn stored_config_is_used_unless_overridden() -> Result<()> {
    let strict = PipelineConfig {
        min_confidence: 0.7,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline(
        Arc::new(FakeRecognizer::default()),
        FakeRasterizer { pages: 1, broken: vec![] },
    )
    .with_config(strict);

    let document = pipeline.process_bytes("panel.png", b"png")?;
    assert_eq!(document.text, "upload.png");

    let document = pipeline.process_bytes_with("panel.png", b"png", &PipelineConfig::default())?;
    assert_eq!(document.text, "upload.png mg/dL");
    Ok(())
}

#[test]
fn uploaded_image_is_a_single_page() -> Result<()> {
    let recognizer = Arc::new(FakeRecognizer::default());
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 9, broken: vec![] });

    let document = pipeline.process_bytes("Bloodwork.JPG", b"jpeg")?;

    assert_eq!(document.pages, 1);
    assert_eq!(document.text, "upload.jpg mg/dL");
    assert!(!document.text.contains("--- Page"));
    Ok(())
}

#[test]
fn input_errors_stop_before_recognition() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let recognizer = Arc::new(FakeRecognizer::default());
    let pipeline = pipeline(recognizer.clone(), FakeRasterizer { pages: 1, broken: vec![] });

    let missing = dir.path().join("missing.pdf");
    assert!(matches!(
        pipeline.process_file(&missing),
        Err(PipelineError::NotFound(_))
    ));

    let docx = dir.path().join("labs.docx");
    fs::write(&docx, b"PK")?;
    assert!(matches!(
        pipeline.process_file(&docx),
        Err(PipelineError::UnsupportedFormat(_))
    ));

    assert!(matches!(
        pipeline.process_bytes("empty.png", b""),
        Err(PipelineError::InvalidInput(_))
    ));

    assert!(recognizer.seen.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn document_json_round_trips() -> Result<()> {
    let recognizer = Arc::new(FakeRecognizer {
        fail_on: Some("page_002"),
        ..FakeRecognizer::default()
    });
    let pipeline = pipeline(recognizer, FakeRasterizer { pages: 3, broken: vec![] });
    let document = pipeline.process_bytes("labs.pdf", b"%PDF")?;

    let dir = tempfile::tempdir()?;
    let path = JsonExporter::new().pretty(true).export(&document, dir.path())?;
    let parsed: DocumentResult = serde_json::from_str(&fs::read_to_string(path)?)?;
    assert_eq!(parsed, document);

    let value = serde_json::to_value(&document)?;
    for key in ["text", "confidence", "words", "pages"] {
        assert!(value.get(key).is_some(), "missing `{key}`");
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn script_worker_loads_once_per_document() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("loads.log");
    let script = dir.path().join("easyocr_worker.sh");
    fs::write(
        &script,
        format!(
            "echo model-load >> '{}'\n\
             echo '{{\"ready\": true}}'\n\
             while read -r line; do echo '[[[[0,0],[40,0],[40,10],[0,10]], \"Hemoglobin\", 0.93]]'; done\n",
            log.display()
        ),
    )?;

    let chain = RecognizerChain::new().push(Arc::new(
        ScriptRecognizer::new(script).with_interpreter(PathBuf::from("sh")),
    ));
    let pipeline = Pipeline::new(chain.select()?)
        .with_rasterizer(Arc::new(FakeRasterizer { pages: 3, broken: vec![] }));

    let document = pipeline.process_file(&fake_pdf(dir.path())?)?;

    assert_eq!(document.pages, 3);
    assert_eq!(document.engine, "easyocr_worker");
    assert_eq!(document.words.len(), 3);
    assert_eq!(fs::read_to_string(&log)?.lines().count(), 1);
    Ok(())
}
