use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// Four corners as emitted by a recognizer: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    /// Returns `None` unless exactly four finite corners are given.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let corners: [Point; 4] = points.try_into().ok()?;
        corners.iter().all(Point::is_finite).then_some(Self(corners))
    }

    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> Self {
        let right = left + width;
        let bottom = top + height;
        Self([
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ])
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.0
    }

    /// Midpoint of the top-left/bottom-right diagonal.
    pub fn center(&self) -> (f32, f32) {
        let [tl, _, br, _] = self.0;
        ((tl.x + br.x) * 0.5, (tl.y + br.y) * 0.5)
    }

    pub fn bbox(&self) -> BBox {
        BBox::from_points(&self.0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let seed = BBox::new(first.x, first.y, first.x, first.y);
        Some(rest.iter().fold(seed, |acc, p| {
            acc.union(&BBox::new(p.x, p.y, p.x, p.y))
        }))
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quad_requires_four_finite_corners() {
        let three = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)];
        assert!(Quad::from_points(&three).is_none());

        let nan = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(f32::NAN, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(Quad::from_points(&nan).is_none());
    }

    #[test]
    fn quad_center_uses_diagonal() {
        let quad = Quad::from_rect(10.0, 20.0, 30.0, 10.0);
        assert_eq!(quad.center(), (25.0, 25.0));
    }

    #[test]
    fn bbox_covers_skewed_quad() {
        let points = [
            Point::new(2.0, 1.0),
            Point::new(12.0, 0.0),
            Point::new(13.0, 9.0),
            Point::new(1.0, 10.0),
        ];
        let quad = Quad::from_points(&points).expect("four corners");
        assert_eq!(quad.bbox(), BBox::new(1.0, 0.0, 13.0, 10.0));
        assert_eq!(quad.bbox().width(), 12.0);
    }
}
