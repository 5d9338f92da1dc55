use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::geometry::Quad;
use crate::core::model::Detection;
use crate::ocr::{OcrError, RecognizeOptions, Recognizer};

const WORD_LEVEL: &str = "5";

/// Recognizer wrapping the `tesseract` CLI in TSV mode.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    default_language: String,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TesseractRecognizer {
    pub fn new(default_language: &str) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            default_language: default_language.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn probe(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| OcrError::Unavailable(format!("failed to run tesseract: {e}")))?;
        if !output.status.success() {
            return Err(OcrError::Unavailable(format!(
                "tesseract --version exited with {}",
                output.status
            )));
        }
        Ok(())
    }

    fn recognize(
        &self,
        image: &Path,
        options: &RecognizeOptions,
    ) -> Result<Vec<Detection>, OcrError> {
        let lang = if options.languages.is_empty() {
            self.default_language.clone()
        } else {
            options.languages.join("+")
        };

        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&lang)
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!("tesseract failed: {}", stderr.trim())));
        }

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract word rows from tesseract TSV output.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Rows with negative confidence are layout
/// rows without text.
pub fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, OcrError> {
    let mut detections = Vec::new();
    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.first() != Some(&WORD_LEVEL) {
            continue;
        }
        if fields.len() < 12 {
            return Err(OcrError::Parse(format!("short tesseract row: {row:?}")));
        }

        let number = |idx: usize| {
            fields[idx]
                .trim()
                .parse::<f32>()
                .map_err(|e| OcrError::Parse(format!("column {idx} in {row:?}: {e}")))
        };
        let conf = number(10)?;
        if conf < 0.0 {
            continue;
        }
        let quad = Quad::from_rect(number(6)?, number(7)?, number(8)?, number(9)?);
        detections.push(Detection::new(
            fields[11..].join("\t"),
            f64::from(conf) / 100.0,
            quad.corners().to_vec(),
        ));
    }
    Ok(detections)
}
