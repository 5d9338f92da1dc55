use crate::core::confidence::clamp_unit;
use crate::core::model::{Detection, Line};

/// Vertical distance in pixels beyond which a detection opens a new line.
pub const DEFAULT_LINE_THRESHOLD: f32 = 20.0;

/// Groups unordered detections of one page into reading-order lines.
///
/// Detections are sorted by the center of their top-left/bottom-right
/// diagonal, `(y, x)` ascending. A line is anchored at the `y` of its first
/// member; any detection further than `threshold` from that anchor closes the
/// line. Words inside a line are ordered by `x`.
///
/// The threshold is a fixed pixel distance and does not scale with font size
/// or rendering resolution.
#[derive(Debug, Clone, Copy)]
pub struct LineBuilder {
    threshold: f32,
}

impl Default for LineBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_THRESHOLD)
    }
}

struct Placed {
    x: f32,
    y: f32,
    detection: Detection,
}

impl LineBuilder {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn build(&self, detections: Vec<Detection>) -> Vec<Line> {
        let mut placed: Vec<Placed> = detections.into_iter().filter_map(place).collect();
        placed.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

        let mut lines = Vec::new();
        let mut current: Vec<Placed> = Vec::new();
        let mut anchor_y = 0.0_f32;

        for item in placed {
            if !current.is_empty() && (item.y - anchor_y).abs() > self.threshold {
                lines.push(close_line(std::mem::take(&mut current)));
            }
            if current.is_empty() {
                anchor_y = item.y;
            }
            current.push(item);
        }

        if !current.is_empty() {
            lines.push(close_line(current));
        }

        lines
    }
}

fn place(mut detection: Detection) -> Option<Placed> {
    let Some(quad) = detection.quad() else {
        tracing::warn!(
            text = %detection.text,
            points = detection.points.len(),
            "dropping detection with malformed bounding box"
        );
        return None;
    };
    let Some(confidence) = clamp_unit(detection.confidence) else {
        tracing::warn!(text = %detection.text, "dropping detection with non-finite confidence");
        return None;
    };

    let trimmed = detection.text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() != detection.text.len() {
        detection.text = trimmed.to_string();
    }
    detection.confidence = confidence;

    let (x, y) = quad.center();
    Some(Placed { x, y, detection })
}

fn close_line(mut members: Vec<Placed>) -> Line {
    members.sort_by(|a, b| a.x.total_cmp(&b.x));
    Line {
        words: members.into_iter().map(|p| p.detection).collect(),
    }
}
