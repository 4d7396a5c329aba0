//! Clip mask construction.
//!
//! Each face contributes one shape. All shapes are rasterized into a single
//! coverage buffer spanning only their combined bounding box, so overlapping
//! faces are blurred exactly once.

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_polygon_mut};
use imageproc::point::Point as PolyPoint;

use clipveil_media_model::{FaceRegion, Point};

/// Bounds on the ellipse padding, as a fraction of the larger box side.
pub const MIN_PADDING_FRACTION: f64 = 0.10;
pub const MAX_PADDING_FRACTION: f64 = 0.20;

/// Coordinates further out than this are clamped before rasterizing.
const COORD_LIMIT: f64 = 1_000_000.0;

const COVERED: Luma<u8> = Luma([255]);

/// Contours enclosing less than this (px²) cover nothing when filled.
const MIN_POLYGON_AREA: f64 = 1.0;

/// Integer pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Grow by `margin` on each side, clipped to a `frame_w` × `frame_h` frame.
    pub fn expand_within(&self, margin: u32, frame_w: u32, frame_h: u32) -> PixelRect {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x1 = (self.x + self.width).saturating_add(margin).min(frame_w);
        let y1 = (self.y + self.height).saturating_add(margin).min(frame_h);
        PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Geometry used to clip one face.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskShape {
    /// Detector contour, open (first point differs from last).
    Polygon(Vec<Point>),

    /// Padded ellipse around the bounding box.
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
}

impl MaskShape {
    /// Shape for one region: the contour when usable and enclosing some
    /// area, otherwise a padded ellipse around the bounding box.
    pub fn for_region(region: &FaceRegion, padding_fraction: f64) -> MaskShape {
        if region.has_usable_contour() {
            let mut points: Vec<Point> = Vec::with_capacity(region.contour.len());
            for p in &region.contour {
                if points.last() != Some(p) {
                    points.push(*p);
                }
            }
            // Closed contours often repeat the first point at the end.
            while points.len() > 3 && points.first() == points.last() {
                points.pop();
            }
            if points.len() >= 3 && polygon_area(&points) >= MIN_POLYGON_AREA {
                return MaskShape::Polygon(points);
            }
            tracing::debug!(points = points.len(), "Flat face contour; masking its bounds");
        }

        let b = region.bounds;
        let padding = clamp_padding(padding_fraction) * b.width.max(b.height);
        let c = b.center();
        MaskShape::Ellipse {
            cx: c.x,
            cy: c.y,
            rx: b.width / 2.0 + padding,
            ry: b.height / 2.0 + padding,
        }
    }

    /// Bounding box as `(min_x, min_y, max_x, max_y)`.
    fn extent(&self) -> (f64, f64, f64, f64) {
        match self {
            MaskShape::Polygon(points) => points.iter().fold(
                (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
                |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
            ),
            MaskShape::Ellipse { cx, cy, rx, ry } => (cx - rx, cy - ry, cx + rx, cy + ry),
        }
    }

    fn rasterize(&self, canvas: &mut GrayImage, origin_x: f64, origin_y: f64) {
        match self {
            MaskShape::Polygon(points) => {
                let poly: Vec<PolyPoint<i32>> = points
                    .iter()
                    .map(|p| PolyPoint::new(to_px(p.x - origin_x), to_px(p.y - origin_y)))
                    .collect();
                // Rounding can still collapse first and last onto the same pixel.
                let end = if poly.len() > 3 && poly.first() == poly.last() {
                    poly.len() - 1
                } else {
                    poly.len()
                };
                if end >= 3 && poly[0] != poly[end - 1] {
                    draw_polygon_mut(canvas, &poly[..end], COVERED);
                }
            }
            MaskShape::Ellipse { cx, cy, rx, ry } => {
                draw_filled_ellipse_mut(
                    canvas,
                    (to_px(cx - origin_x), to_px(cy - origin_y)),
                    to_px(rx.ceil()).max(1),
                    to_px(ry.ceil()).max(1),
                    COVERED,
                );
            }
        }
    }
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    (twice / 2.0).abs()
}

/// Union of all face shapes for one frame.
#[derive(Debug, Clone)]
pub struct UnionMask {
    bounds: PixelRect,
    coverage: GrayImage,
}

impl UnionMask {
    /// Rasterize `shapes` for a `frame_w` × `frame_h` frame.
    ///
    /// Returns `None` when no shape covers any on-frame pixel.
    pub fn build(shapes: &[MaskShape], frame_w: u32, frame_h: u32) -> Option<UnionMask> {
        if shapes.is_empty() || frame_w == 0 || frame_h == 0 {
            return None;
        }

        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for shape in shapes {
            let (a, b, c, d) = shape.extent();
            x0 = x0.min(a);
            y0 = y0.min(b);
            x1 = x1.max(c);
            y1 = y1.max(d);
        }

        let left = x0.floor().clamp(0.0, frame_w as f64) as u32;
        let top = y0.floor().clamp(0.0, frame_h as f64) as u32;
        let right = x1.ceil().clamp(0.0, frame_w as f64) as u32;
        let bottom = y1.ceil().clamp(0.0, frame_h as f64) as u32;
        if right <= left || bottom <= top {
            return None;
        }

        let bounds = PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        };
        let mut coverage = GrayImage::new(bounds.width, bounds.height);
        for shape in shapes {
            shape.rasterize(&mut coverage, left as f64, top as f64);
        }

        let mask = UnionMask { bounds, coverage };
        (mask.covered_pixels() > 0).then_some(mask)
    }

    /// Bounding box of the covered area in frame coordinates.
    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    /// Coverage (0..=255) at a frame pixel.
    pub fn coverage_at(&self, x: u32, y: u32) -> u8 {
        if !self.bounds.contains(x, y) {
            return 0;
        }
        self.coverage.get_pixel(x - self.bounds.x, y - self.bounds.y).0[0]
    }

    pub fn covered_pixels(&self) -> usize {
        self.coverage.pixels().filter(|p| p.0[0] > 0).count()
    }
}

/// Clamp a configured padding fraction into the supported range.
pub fn clamp_padding(fraction: f64) -> f64 {
    if fraction.is_finite() {
        fraction.clamp(MIN_PADDING_FRACTION, MAX_PADDING_FRACTION)
    } else {
        MIN_PADDING_FRACTION
    }
}

fn to_px(v: f64) -> i32 {
    v.round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipveil_media_model::Rect;
    use proptest::prelude::*;

    fn square_contour(x: f64, y: f64, side: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    #[test]
    fn test_contour_preferred_when_usable() {
        let region =
            FaceRegion::with_contour(Rect::new(10.0, 10.0, 20.0, 20.0), square_contour(10.0, 10.0, 20.0));
        assert!(matches!(
            MaskShape::for_region(&region, 0.15),
            MaskShape::Polygon(_)
        ));
    }

    #[test]
    fn test_short_contour_falls_back_to_ellipse() {
        let region = FaceRegion::with_contour(
            Rect::new(10.0, 10.0, 20.0, 40.0),
            vec![Point::new(10.0, 10.0), Point::new(30.0, 50.0)],
        );
        match MaskShape::for_region(&region, 0.15) {
            MaskShape::Ellipse { cx, cy, rx, ry } => {
                assert_eq!((cx, cy), (20.0, 30.0));
                // padding = 0.15 * 40
                assert!((rx - 16.0).abs() < 1e-9);
                assert!((ry - 26.0).abs() < 1e-9);
            }
            other => panic!("expected ellipse, got {other:?}"),
        }
    }

    #[test]
    fn test_collinear_contour_falls_back_to_ellipse() {
        let region = FaceRegion::with_contour(
            Rect::new(10.0, 10.0, 20.0, 20.0),
            vec![
                Point::new(10.0, 10.0),
                Point::new(20.0, 20.0),
                Point::new(30.0, 30.0),
            ],
        );
        let shape = MaskShape::for_region(&region, 0.15);
        assert!(matches!(shape, MaskShape::Ellipse { .. }), "got {shape:?}");

        let mask = UnionMask::build(&[shape], 100, 100).expect("mask");
        assert!(mask.covered_pixels() > 0);
    }

    #[test]
    fn test_polygon_area() {
        assert_eq!(polygon_area(&square_contour(0.0, 0.0, 4.0)), 16.0);
        let line = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        assert_eq!(polygon_area(&line), 0.0);
    }

    #[test]
    fn test_padding_is_clamped() {
        assert_eq!(clamp_padding(0.5), MAX_PADDING_FRACTION);
        assert_eq!(clamp_padding(0.0), MIN_PADDING_FRACTION);
        assert_eq!(clamp_padding(f64::NAN), MIN_PADDING_FRACTION);
        assert_eq!(clamp_padding(0.15), 0.15);
    }

    #[test]
    fn test_repeated_closing_point_is_dropped() {
        let mut contour = square_contour(0.0, 0.0, 10.0);
        contour.push(Point::new(0.0, 0.0));
        let region = FaceRegion::with_contour(Rect::new(0.0, 0.0, 10.0, 10.0), contour);
        match MaskShape::for_region(&region, 0.15) {
            MaskShape::Polygon(points) => assert_eq!(points.len(), 4),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_union_covers_overlap_once() {
        let shapes = vec![
            MaskShape::Polygon(square_contour(10.0, 10.0, 20.0)),
            MaskShape::Polygon(square_contour(20.0, 20.0, 20.0)),
        ];
        let mask = UnionMask::build(&shapes, 64, 64).unwrap();
        assert_eq!(mask.bounds(), PixelRect { x: 10, y: 10, width: 30, height: 30 });
        // Overlap pixel and exclusive pixels all carry plain full coverage.
        assert_eq!(mask.coverage_at(25, 25), 255);
        assert_eq!(mask.coverage_at(12, 12), 255);
        assert_eq!(mask.coverage_at(38, 38), 255);
        // Inside the union bounds but outside both squares.
        assert_eq!(mask.coverage_at(38, 12), 0);
    }

    #[test]
    fn test_off_frame_shapes_yield_no_mask() {
        let shapes = vec![MaskShape::Ellipse {
            cx: -100.0,
            cy: -100.0,
            rx: 10.0,
            ry: 10.0,
        }];
        assert!(UnionMask::build(&shapes, 64, 64).is_none());
    }

    #[test]
    fn test_shape_clipped_at_frame_edge() {
        let shapes = vec![MaskShape::Ellipse {
            cx: 0.0,
            cy: 0.0,
            rx: 10.0,
            ry: 10.0,
        }];
        let mask = UnionMask::build(&shapes, 64, 64).unwrap();
        assert_eq!(mask.bounds().x, 0);
        assert_eq!(mask.bounds().y, 0);
        assert_eq!(mask.coverage_at(2, 2), 255);
        assert_eq!(mask.coverage_at(40, 40), 0);
    }

    #[test]
    fn test_expand_within_clips_to_frame() {
        let r = PixelRect { x: 5, y: 5, width: 10, height: 10 };
        assert_eq!(
            r.expand_within(8, 18, 100),
            PixelRect { x: 0, y: 0, width: 18, height: 23 }
        );
    }

    proptest! {
        #[test]
        fn prop_ellipse_contains_its_box_center(
            x in 0.0f64..200.0,
            y in 0.0f64..200.0,
            w in 2.0f64..80.0,
            h in 2.0f64..80.0,
        ) {
            let region = FaceRegion::from_bounds(Rect::new(x, y, w, h));
            let shape = MaskShape::for_region(&region, 0.15);
            let mask = UnionMask::build(&[shape], 320, 320).unwrap();
            let c = region.bounds.center();
            prop_assert_eq!(mask.coverage_at(c.x as u32, c.y as u32), 255);
        }

        #[test]
        fn prop_mask_never_exceeds_frame(
            x in -50.0f64..300.0,
            y in -50.0f64..300.0,
            side in 1.0f64..120.0,
        ) {
            let region = FaceRegion::from_bounds(Rect::new(x, y, side, side));
            let shape = MaskShape::for_region(&region, 0.2);
            if let Some(mask) = UnionMask::build(&[shape], 256, 256) {
                let b = mask.bounds();
                prop_assert!(b.x + b.width <= 256);
                prop_assert!(b.y + b.height <= 256);
            }
        }
    }
}
