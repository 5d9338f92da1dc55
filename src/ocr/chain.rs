use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ocr::{OcrError, Recognizer};

/// Outcome of probing one engine during selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Recognizers in priority order. The first one whose probe succeeds serves
/// every request for the lifetime of the process.
#[derive(Default)]
pub struct RecognizerChain {
    providers: Vec<Arc<dyn Recognizer>>,
}

/// The engine picked by [`RecognizerChain::select`], plus the probe history.
#[derive(Clone)]
pub struct EngineSelection {
    recognizer: Arc<dyn Recognizer>,
    attempts: Vec<ProviderAttempt>,
}

impl std::fmt::Debug for EngineSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSelection")
            .field("engine", &self.recognizer.name())
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl EngineSelection {
    /// Wrap an already-initialized recognizer without probing.
    pub fn direct(recognizer: Arc<dyn Recognizer>) -> Self {
        let attempts = vec![ProviderAttempt {
            engine: recognizer.name().to_string(),
            error: None,
        }];
        Self {
            recognizer,
            attempts,
        }
    }

    pub fn recognizer(&self) -> Arc<dyn Recognizer> {
        Arc::clone(&self.recognizer)
    }

    pub fn engine(&self) -> &str {
        self.recognizer.name()
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }
}

impl RecognizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.providers.push(recognizer);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn select(&self) -> Result<EngineSelection, OcrError> {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.probe() {
                Ok(()) => {
                    tracing::info!(engine = provider.name(), "OCR engine ready");
                    attempts.push(ProviderAttempt {
                        engine: provider.name().to_string(),
                        error: None,
                    });
                    return Ok(EngineSelection {
                        recognizer: Arc::clone(provider),
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(engine = provider.name(), error = %e, "OCR engine unavailable, trying next");
                    attempts.push(ProviderAttempt {
                        engine: provider.name().to_string(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Err(OcrError::NoEngine(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Detection;
    use crate::ocr::RecognizeOptions;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRecognizer {
        name: &'static str,
        available: bool,
        probes: AtomicUsize,
    }

    impl StubRecognizer {
        fn new(name: &'static str, available: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                probes: AtomicUsize::new(0),
            })
        }
    }

    impl Recognizer for StubRecognizer {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self) -> Result<(), OcrError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.available {
                Ok(())
            } else {
                Err(OcrError::Unavailable(format!("{} not installed", self.name)))
            }
        }

        fn recognize(&self, _: &Path, _: &RecognizeOptions) -> Result<Vec<Detection>, OcrError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn falls_back_in_priority_order() {
        let paddle = StubRecognizer::new("paddle", false);
        let easy = StubRecognizer::new("easyocr", true);
        let tess = StubRecognizer::new("tesseract", true);

        let selection = RecognizerChain::new()
            .push(paddle.clone())
            .push(easy.clone())
            .push(tess.clone())
            .select()
            .unwrap();

        assert_eq!(selection.engine(), "easyocr");
        assert_eq!(
            selection.attempts(),
            &[
                ProviderAttempt {
                    engine: "paddle".to_string(),
                    error: Some("OCR engine not available: paddle not installed".to_string()),
                },
                ProviderAttempt {
                    engine: "easyocr".to_string(),
                    error: None,
                },
            ]
        );
        assert_eq!(tess.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reports_every_failure_when_nothing_loads() {
        let err = RecognizerChain::new()
            .push(StubRecognizer::new("paddle", false))
            .push(StubRecognizer::new("doctr", false))
            .select()
            .unwrap_err();

        match err {
            OcrError::NoEngine(attempts) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| a.error.is_some()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_chain_has_no_engine() {
        let err = RecognizerChain::new().select().unwrap_err();
        assert_eq!(
            err.to_string(),
            "no OCR engine could be initialized (no engines configured)"
        );
    }
}
