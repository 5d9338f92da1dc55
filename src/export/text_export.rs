use anyhow::Result;

use crate::core::model::DocumentResult;
use crate::export::Exporter;

/// Plain reading-order text, one recognized line per output line.
#[derive(Debug, Clone, Default)]
pub struct TextExporter;

impl TextExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Exporter for TextExporter {
    fn render(&self, document: &DocumentResult) -> Result<String> {
        let mut text = document.text.clone();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    fn file_name(&self) -> &'static str {
        "document.txt"
    }
}
