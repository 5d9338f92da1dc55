use serde::{Deserialize, Serialize};

use crate::core::geometry::{BBox, Point, Quad};

/// One recognized text fragment as returned by a recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub text: String,
    pub confidence: f64,
    pub points: Vec<Point>,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f64, points: Vec<Point>) -> Self {
        Self {
            text: text.into(),
            confidence,
            points,
        }
    }

    pub fn quad(&self) -> Option<Quad> {
        Quad::from_points(&self.points)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Line {
    pub words: Vec<Detection>,
}

impl Line {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.words
            .iter()
            .filter_map(|word| word.quad().map(|q| q.bbox()))
            .reduce(|acc, b| acc.union(&b))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageResult {
    pub page_index: usize,
    pub lines: Vec<Line>,
    /// Mean confidence of the detections kept on this page.
    pub confidence: f64,
    pub detections: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResult {
    /// Gap record for a page that could not be rasterized or recognized.
    pub fn failed(page_index: usize, error: impl Into<String>) -> Self {
        Self {
            page_index,
            lines: Vec::new(),
            confidence: 0.0,
            detections: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(Line::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordDetail {
    pub text: String,
    pub confidence: f64,
    #[serde(rename = "box")]
    pub bbox: [Point; 4],
    pub page: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSummary {
    pub page: usize,
    pub lines: usize,
    pub detections: usize,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PageResult> for PageSummary {
    fn from(page: &PageResult) -> Self {
        Self {
            page: page.page_index,
            lines: page.lines.len(),
            detections: page.detections,
            confidence: page.confidence,
            error: page.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentResult {
    pub text: String,
    pub confidence: f64,
    pub words: Vec<WordDetail>,
    pub pages: usize,
    /// Name of the recognizer that served the request.
    pub engine: String,
    #[serde(default)]
    pub page_results: Vec<PageSummary>,
}

impl DocumentResult {
    pub fn empty(engine: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            words: Vec::new(),
            pages: 0,
            engine: engine.into(),
            page_results: Vec::new(),
        }
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageSummary> {
        self.page_results.iter().filter(|p| p.error.is_some())
    }
}
