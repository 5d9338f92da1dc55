use anyhow::{Context, Result};
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use std::path::{Path, PathBuf};

/// Convert to grayscale and apply a global Otsu threshold.
pub fn binarize_image(image: &GrayImage) -> GrayImage {
    threshold(image, otsu_level(image), ThresholdType::Binary)
}

/// Binarize the image at `input`, writing `<stem>_bin.png` into `out_dir`.
pub fn binarize_file(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    let gray = image::open(input)
        .with_context(|| format!("failed to decode {}", input.display()))?
        .to_luma8();

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let output = out_dir.join(format!("{stem}_bin.png"));

    binarize_image(&gray)
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn two_tone() -> GrayImage {
        GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([40]) } else { Luma([210]) })
    }

    #[test]
    fn separates_dark_ink_from_paper() {
        let out = binarize_image(&two_tone());
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(7, 7)[0], 255);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn only_pixels_above_the_otsu_level_turn_white() {
        let image = GrayImage::from_fn(16, 1, |x, _| Luma([(x * 16) as u8]));
        let level = otsu_level(&image);

        let out = binarize_image(&image);
        for (src, dst) in image.pixels().zip(out.pixels()) {
            let expected = if src[0] > level { 255 } else { 0 };
            assert_eq!(dst[0], expected, "source {} at level {level}", src[0]);
        }
    }

    #[test]
    fn writes_binarized_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("scan.png");
        two_tone().save(&input)?;

        let output = binarize_file(&input, dir.path())?;
        assert_eq!(output.file_name().unwrap(), "scan_bin.png");
        let decoded = image::open(&output)?.to_luma8();
        assert_eq!(decoded.get_pixel(1, 1)[0], 0);
        Ok(())
    }
}
