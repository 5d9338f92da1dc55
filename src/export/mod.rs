pub mod json_export;
pub mod text_export;

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::model::DocumentResult;

pub use json_export::JsonExporter;
pub use text_export::TextExporter;

pub trait Exporter {
    fn render(&self, document: &DocumentResult) -> Result<String>;

    fn file_name(&self) -> &'static str;

    fn export(&self, document: &DocumentResult, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join(self.file_name());
        fs::write(&path, self.render(document)?)?;
        Ok(path)
    }
}
