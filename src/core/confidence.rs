//! Confidence folding.
//!
//! Page confidence is the mean over a page's kept detections. Document
//! confidence weights each page by its detection count, so empty or failed
//! pages carry no weight instead of pulling the average towards zero.

use crate::core::model::PageResult;

pub fn clamp_unit(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).clamp(0.0, 1.0)
    }
}

pub fn weighted_document_confidence(pages: &[PageResult]) -> f64 {
    let (sum, weight) = pages.iter().fold((0.0, 0usize), |(sum, weight), page| {
        (sum + page.confidence * page.detections as f64, weight + page.detections)
    });
    if weight == 0 {
        0.0
    } else {
        (sum / weight as f64).clamp(0.0, 1.0)
    }
}
