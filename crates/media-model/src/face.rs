//! Per-frame face geometry.
//!
//! Regions carry no identity across frames. A detector reports a bounding
//! box and, when available, an ordered contour polygon.

use serde::{Deserialize, Serialize};

use crate::frame::Rotation;

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing all points.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Finite coordinates and strictly positive extent.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Grow on every side by `amount` pixels.
    pub fn inflate(&self, amount: f64) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + 2.0 * amount,
            self.height + 2.0 * amount,
        )
    }
}

/// Geometry of one detected face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Face bounding box.
    pub bounds: Rect,

    /// Ordered closed contour (face oval). Empty when the detector did not
    /// report one.
    #[serde(default)]
    pub contour: Vec<Point>,
}

impl FaceRegion {
    /// Region with only a bounding box.
    pub fn from_bounds(bounds: Rect) -> Self {
        Self {
            bounds,
            contour: Vec::new(),
        }
    }

    pub fn with_contour(bounds: Rect, contour: Vec<Point>) -> Self {
        Self { bounds, contour }
    }

    /// The contour is usable when it has at least three distinct points.
    pub fn has_usable_contour(&self) -> bool {
        let mut distinct: Vec<Point> = Vec::with_capacity(3);
        for p in &self.contour {
            if !distinct.contains(p) {
                distinct.push(*p);
                if distinct.len() >= 3 {
                    return true;
                }
            }
        }
        false
    }

    /// Every coordinate in the region is finite.
    pub fn is_finite(&self) -> bool {
        self.bounds.x.is_finite()
            && self.bounds.y.is_finite()
            && self.bounds.width.is_finite()
            && self.bounds.height.is_finite()
            && self.contour.iter().all(Point::is_finite)
    }

    /// Re-express a region given in upright display space in buffer space.
    pub fn display_to_buffer(
        &self,
        rotation: Rotation,
        buffer_width: u32,
        buffer_height: u32,
    ) -> FaceRegion {
        if rotation == Rotation::Deg0 {
            return self.clone();
        }
        let map = |p: Point| rotation.display_to_buffer(p, buffer_width, buffer_height);
        let corners = [
            map(Point::new(self.bounds.x, self.bounds.y)),
            map(Point::new(self.bounds.right(), self.bounds.bottom())),
        ];
        FaceRegion {
            bounds: Rect::bounding(&corners).unwrap_or(self.bounds),
            contour: self.contour.iter().copied().map(map).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_validity() {
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, 10.0, -1.0).is_valid());
        assert!(!Rect::new(f64::NAN, 0.0, 10.0, 10.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, f64::INFINITY, 10.0).is_valid());
    }

    #[test]
    fn test_contour_needs_three_distinct_points() {
        let bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        let degenerate = FaceRegion::with_contour(
            bounds,
            vec![
                Point::new(1.0, 1.0),
                Point::new(1.0, 1.0),
                Point::new(5.0, 5.0),
            ],
        );
        assert!(!degenerate.has_usable_contour());

        let triangle = FaceRegion::with_contour(
            bounds,
            vec![
                Point::new(1.0, 1.0),
                Point::new(9.0, 1.0),
                Point::new(5.0, 9.0),
            ],
        );
        assert!(triangle.has_usable_contour());
        assert!(!FaceRegion::from_bounds(bounds).has_usable_contour());
    }

    #[test]
    fn test_bounding_rect() {
        let r = Rect::bounding(&[Point::new(3.0, 7.0), Point::new(-1.0, 2.0)]).unwrap();
        assert_eq!(r, Rect::new(-1.0, 2.0, 4.0, 5.0));
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn test_display_to_buffer_swaps_box_axes() {
        // 20 wide, 10 tall box in a 36x64 portrait display of a 64x36 buffer.
        let face = FaceRegion::from_bounds(Rect::new(5.0, 10.0, 20.0, 10.0));
        let mapped = face.display_to_buffer(Rotation::Deg90, 64, 36);
        assert!((mapped.bounds.width - 10.0).abs() < 1e-9);
        assert!((mapped.bounds.height - 20.0).abs() < 1e-9);
        assert!((mapped.bounds.x - 10.0).abs() < 1e-9);
        assert!((mapped.bounds.y - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_contour_defaults_to_empty_in_json() {
        let face: FaceRegion =
            serde_json::from_str(r#"{"bounds":{"x":1,"y":2,"width":3,"height":4}}"#).unwrap();
        assert!(face.contour.is_empty());
        assert!(face.is_finite());
    }
}
