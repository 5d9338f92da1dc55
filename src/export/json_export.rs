use anyhow::Result;

use crate::core::model::DocumentResult;
use crate::export::Exporter;

#[derive(Debug, Clone, Default)]
pub struct JsonExporter {
    pretty: bool,
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Exporter for JsonExporter {
    fn render(&self, document: &DocumentResult) -> Result<String> {
        let data = if self.pretty {
            serde_json::to_string_pretty(document)?
        } else {
            serde_json::to_string(document)?
        };
        Ok(data)
    }

    fn file_name(&self) -> &'static str {
        "document.json"
    }
}
