use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// PDF points per inch; a scale of 1.0 renders at 72 DPI.
const POINTS_PER_INCH: f32 = 72.0;

/// Converts PDF pages into images the recognizer can read.
pub trait Rasterizer: Send + Sync {
    fn page_count(&self, pdf_path: &Path) -> Result<usize>;

    /// Render one page (0-based) at `scale` into `out_dir`, returning the
    /// path of the image written.
    fn render_page(
        &self,
        pdf_path: &Path,
        page_idx: usize,
        scale: f32,
        out_dir: &Path,
    ) -> Result<PathBuf>;
}

/// Rasterizer backed by poppler-utils (`pdfinfo`, `pdftoppm`).
#[derive(Debug, Clone, Default)]
pub struct PopplerRasterizer;

impl PopplerRasterizer {
    pub fn new() -> Self {
        Self
    }
}

pub fn scale_to_dpi(scale: f32) -> u32 {
    (POINTS_PER_INCH * scale).round().max(1.0) as u32
}

impl Rasterizer for PopplerRasterizer {
    fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        let output = Command::new("pdfinfo")
            .arg(pdf_path)
            .output()
            .with_context(|| format!("failed to invoke pdfinfo on {}", pdf_path.display()))?;

        if !output.status.success() {
            anyhow::bail!("pdfinfo failed with status: {}", output.status);
        }

        parse_page_count(&String::from_utf8_lossy(&output.stdout)).with_context(|| {
            format!("could not read page count of {}", pdf_path.display())
        })
    }

    fn render_page(
        &self,
        pdf_path: &Path,
        page_idx: usize,
        scale: f32,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;

        // pdftoppm uses 1-based page indices
        let page_number = page_idx + 1;
        let prefix = out_dir.join(format!("page_{:03}", page_number));

        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(scale_to_dpi(scale).to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .status()
            .with_context(|| "failed to invoke pdftoppm; is poppler-utils installed?")?;

        if !status.success() {
            anyhow::bail!("pdftoppm failed with status: {status}");
        }

        // -singlefile drops the page suffix: `<prefix>.png`
        let image_path = prefix.with_extension("png");
        if !image_path.exists() {
            anyhow::bail!(
                "expected rendered image not found: {}",
                image_path.display()
            );
        }

        Ok(image_path)
    }
}

fn parse_page_count(pdfinfo: &str) -> Result<usize> {
    for line in pdfinfo.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            let num_str = rest.trim();
            let pages: usize = num_str.parse().with_context(|| {
                format!("failed to parse page count from 'Pages:' line: {num_str}")
            })?;
            return Ok(pages);
        }
    }
    anyhow::bail!("pdfinfo output did not contain a 'Pages:' line")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_pages_line() {
        let info = "Producer:       LabCorp\nPages:          3\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info).unwrap(), 3);
    }

    #[test]
    fn missing_pages_line_is_an_error() {
        assert!(parse_page_count("Producer: x\n").is_err());
        assert!(parse_page_count("Pages: many\n").is_err());
    }

    #[test]
    fn scale_maps_to_dpi() {
        assert_eq!(scale_to_dpi(1.0), 72);
        assert_eq!(scale_to_dpi(2.0), 144);
        assert_eq!(scale_to_dpi(1.3), 94);
        assert_eq!(scale_to_dpi(0.0), 1);
    }
}
