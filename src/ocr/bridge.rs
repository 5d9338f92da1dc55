use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::geometry::Point;
use crate::core::model::Detection;
use crate::ocr::{OcrError, RecognizeOptions, Recognizer};

/// Detection shapes accepted on the script's stdout.
///
/// Wrapper scripts can print records (`{"box", "text", "confidence"}`) or pass
/// the engines' native tuples through untouched: EasyOCR's
/// `[box, text, confidence]` and PaddleOCR's `[box, [text, confidence]]`.
/// A record must carry its engine's confidence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptDetection {
    Record {
        #[serde(rename = "box", alias = "bbox")]
        points: Vec<[f32; 2]>,
        text: String,
        confidence: f64,
    },
    Triple(Vec<[f32; 2]>, String, f64),
    Nested(Vec<[f32; 2]>, (String, f64)),
}

impl From<ScriptDetection> for Detection {
    fn from(raw: ScriptDetection) -> Self {
        let (points, text, confidence) = match raw {
            ScriptDetection::Record {
                points,
                text,
                confidence,
            } => (points, text, confidence),
            ScriptDetection::Triple(points, text, confidence) => (points, text, confidence),
            ScriptDetection::Nested(points, (text, confidence)) => (points, text, confidence),
        };
        Detection::new(text, confidence, points.into_iter().map(Point::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ScriptFailure {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ScriptReady {
    ready: bool,
}

#[derive(Debug, Serialize)]
struct ScriptRequest<'a> {
    image: &'a Path,
    lang: &'a [String],
    gpu: bool,
}

/// A running `--serve` child with its pipes.
#[derive(Debug)]
struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Worker {
    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Write one request line and read one reply line.
    fn exchange(&mut self, request: &str) -> std::io::Result<String> {
        writeln!(self.stdin, "{request}")?;
        self.stdin.flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "worker closed its stdout",
            ));
        }
        Ok(line)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Drives an external recognizer script, typically a thin Python wrapper
/// around PaddleOCR, EasyOCR or DocTR, as a long-lived worker.
///
/// The script is started once as `<interpreter> <script> --serve`. It loads
/// its model, prints `{"ready": true}` (or `{"error": ...}`) and then answers
/// one JSON request line per page on stdin (`{"image", "lang", "gpu"}`) with
/// one JSON line on stdout: a detection array or `{"error": ...}`. Requests
/// are serialized through one worker. A worker that dies is started again on
/// the next request.
#[derive(Debug)]
pub struct ScriptRecognizer {
    name: String,
    interpreter: PathBuf,
    script_path: PathBuf,
    worker: Mutex<Option<Worker>>,
}

impl ScriptRecognizer {
    pub fn new(script_path: PathBuf) -> Self {
        let name = script_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        Self {
            name,
            interpreter: PathBuf::from("python3"),
            script_path,
            worker: Mutex::new(None),
        }
    }

    pub fn with_interpreter(mut self, interpreter: PathBuf) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<Worker>>, OcrError> {
        self.worker
            .lock()
            .map_err(|_| OcrError::Engine(format!("{} worker lock poisoned", self.name)))
    }

    /// Startup failures during recognition fail the page, not the engine.
    fn spawn_for_page(&self) -> Result<Worker, OcrError> {
        self.spawn().map_err(|e| OcrError::Engine(e.to_string()))
    }

    fn spawn(&self) -> Result<Worker, OcrError> {
        if !self.script_path.is_file() {
            return Err(OcrError::Unavailable(format!(
                "script not found: {}",
                self.script_path.display()
            )));
        }

        tracing::info!(engine = %self.name, script = %self.script_path.display(), "starting OCR worker");
        let mut child = Command::new(&self.interpreter)
            .arg(&self.script_path)
            .arg("--serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                OcrError::Unavailable(format!(
                    "failed to invoke {}: {e}",
                    self.interpreter.display()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(OcrError::Unavailable("worker pipes were not captured".to_string()));
        };
        let mut worker = Worker {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let line = worker.read_line().map_err(|e| {
            let status = worker
                .child
                .try_wait()
                .ok()
                .flatten()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "still running".to_string());
            OcrError::Unavailable(format!("worker failed to start: {e} ({status})"))
        })?;
        if let Ok(failure) = serde_json::from_str::<ScriptFailure>(&line) {
            return Err(OcrError::Unavailable(failure.error));
        }
        match serde_json::from_str::<ScriptReady>(&line) {
            Ok(ScriptReady { ready: true }) => Ok(worker),
            _ => Err(OcrError::Unavailable(format!(
                "unexpected worker greeting: {}",
                line.trim()
            ))),
        }
    }
}

impl Recognizer for ScriptRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    /// Starts the worker, which loads the model, unless one is already up.
    fn probe(&self) -> Result<(), OcrError> {
        let mut worker = self.lock_worker()?;
        if worker.as_mut().map_or(true, Worker::has_exited) {
            *worker = Some(self.spawn()?);
        }
        Ok(())
    }

    fn recognize(
        &self,
        image: &Path,
        options: &RecognizeOptions,
    ) -> Result<Vec<Detection>, OcrError> {
        let request = serde_json::to_string(&ScriptRequest {
            image,
            lang: &options.languages,
            gpu: options.gpu,
        })
        .map_err(|e| OcrError::Engine(format!("cannot encode request: {e}")))?;

        let mut guard = self.lock_worker()?;
        tracing::debug!(engine = %self.name, image = %image.display(), "sending page to OCR worker");

        // A worker that died since the last page gets one fresh start.
        let mut restarted = false;
        let reply = loop {
            let mut worker = match guard.take() {
                Some(mut worker) if !restarted => {
                    if worker.has_exited() {
                        tracing::warn!(engine = %self.name, "OCR worker exited; restarting");
                        restarted = true;
                        self.spawn_for_page()?
                    } else {
                        worker
                    }
                }
                _ => {
                    restarted = true;
                    self.spawn_for_page()?
                }
            };
            match worker.exchange(&request) {
                Ok(line) => {
                    *guard = Some(worker);
                    break line;
                }
                Err(e) if restarted => {
                    return Err(OcrError::Engine(format!("OCR worker failed: {e}")));
                }
                Err(e) => {
                    tracing::warn!(engine = %self.name, error = %e, "lost OCR worker mid-request");
                }
            }
        };

        parse_reply(&reply)
    }
}

/// One reply line: a detection array or `{"error": ...}`.
fn parse_reply(line: &str) -> Result<Vec<Detection>, OcrError> {
    if let Ok(failure) = serde_json::from_str::<ScriptFailure>(line) {
        return Err(OcrError::Engine(failure.error));
    }
    parse_detections(line)
}

pub fn parse_detections(stdout: &str) -> Result<Vec<Detection>, OcrError> {
    let raw: Vec<ScriptDetection> =
        serde_json::from_str(stdout.trim()).map_err(|e| OcrError::Parse(e.to_string()))?;
    Ok(raw.into_iter().map(Detection::from).collect())
}
