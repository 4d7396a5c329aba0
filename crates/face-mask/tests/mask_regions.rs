use std::time::Duration;

use clipveil_common::clock::FrameBudget;
use clipveil_face_mask::{BlurStyle, FaceMaskEngine, FrameOutcome, MaskConfig};
use clipveil_media_model::{FaceRegion, Frame, Point, Rect, Rotation};
use image::{Rgba, RgbaImage};

const W: u32 = 160;
const H: u32 = 96;

/// 8px checkerboard with a diagonal gradient so blurred values are distinct.
fn pattern() -> RgbaImage {
    RgbaImage::from_fn(W, H, |x, y| {
        let on = ((x / 8) + (y / 8)) % 2 == 0;
        let g = ((x + y) % 256) as u8;
        if on {
            Rgba([240, g, 20, 255])
        } else {
            Rgba([20, 255 - g, 240, 255])
        }
    })
}

fn engine() -> FaceMaskEngine {
    FaceMaskEngine::new(
        MaskConfig {
            style: BlurStyle::Gaussian { sigma: 3.0 },
            ..MaskConfig::default()
        },
        FrameBudget::from_duration(Duration::from_secs(30)),
    )
}

fn run(frame: RgbaImage, faces: &[FaceRegion]) -> RgbaImage {
    match engine().process(Frame::new(frame, Rotation::Deg0, 0), faces) {
        FrameOutcome::Rendered(f) | FrameOutcome::Unmodified(f) => f.pixels,
        FrameOutcome::Dropped => panic!("frame dropped with a generous budget"),
    }
}

fn max_channel_diff(a: &Rgba<u8>, b: &Rgba<u8>) -> u8 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

fn changed(a: &RgbaImage, b: &RgbaImage) -> Vec<(u32, u32)> {
    a.enumerate_pixels()
        .filter(|(x, y, p)| max_channel_diff(p, b.get_pixel(*x, *y)) > 0)
        .map(|(x, y, _)| (x, y))
        .collect()
}

#[test]
fn two_separate_faces_blur_two_separate_areas() {
    let left = FaceRegion::from_bounds(Rect::new(10.0, 30.0, 24.0, 24.0));
    let right = FaceRegion::from_bounds(Rect::new(120.0, 30.0, 24.0, 24.0));

    let original = pattern();
    let both = run(pattern(), &[left.clone(), right.clone()]);

    let diff = changed(&original, &both);
    assert!(!diff.is_empty());

    // Every changed pixel belongs to exactly one of the two padded faces.
    let near = |r: &Rect, (x, y): (u32, u32)| {
        let pad = 0.2 * r.width.max(r.height) + 1.0;
        let (x, y) = (x as f64, y as f64);
        x >= r.x - pad && x <= r.right() + pad && y >= r.y - pad && y <= r.bottom() + pad
    };
    let in_left = diff.iter().filter(|p| near(&left.bounds, **p)).count();
    let in_right = diff.iter().filter(|p| near(&right.bounds, **p)).count();
    assert!(in_left > 0);
    assert!(in_right > 0);
    assert_eq!(in_left + in_right, diff.len());

    // The gap between the faces stays untouched.
    for x in 50..100 {
        assert_eq!(both.get_pixel(x, 42), original.get_pixel(x, 42));
    }

    // Same result as masking each face on its own.
    let sequential = run(run(pattern(), &[left]), &[right]);
    for (x, y, p) in both.enumerate_pixels() {
        assert!(max_channel_diff(p, sequential.get_pixel(x, y)) <= 2, "({x},{y})");
    }
}

#[test]
fn overlapping_faces_blur_union_once() {
    let a = FaceRegion::from_bounds(Rect::new(50.0, 30.0, 30.0, 30.0));
    let b = FaceRegion::from_bounds(Rect::new(70.0, 36.0, 30.0, 30.0));

    let union = run(pattern(), &[a.clone(), b]);
    let single = run(pattern(), &[a]);

    // In the overlap the result equals one blur pass, not a blur of a blur.
    for y in 40..56 {
        for x in 72..80 {
            let d = max_channel_diff(union.get_pixel(x, y), single.get_pixel(x, y));
            assert!(d <= 2, "pixel ({x},{y}) differs by {d}");
        }
    }

    let double = run(single.clone(), &[FaceRegion::from_bounds(Rect::new(
        50.0, 30.0, 30.0, 30.0,
    ))]);
    let twice_blurred_differs = (40..56)
        .flat_map(|y| (72..80).map(move |x| (x, y)))
        .any(|(x, y)| max_channel_diff(double.get_pixel(x, y), single.get_pixel(x, y)) > 2);
    assert!(twice_blurred_differs, "pattern too smooth to detect double blur");
}

#[test]
fn contour_mask_leaves_box_corners_alone() {
    // Diamond contour inside its bounding box: box corners are outside it.
    let bounds = Rect::new(40.0, 20.0, 40.0, 40.0);
    let diamond = vec![
        Point::new(60.0, 20.0),
        Point::new(80.0, 40.0),
        Point::new(60.0, 60.0),
        Point::new(40.0, 40.0),
    ];
    let original = pattern();
    let out = run(pattern(), &[FaceRegion::with_contour(bounds, diamond)]);

    assert_ne!(out.get_pixel(60, 40), original.get_pixel(60, 40));
    assert_eq!(out.get_pixel(42, 22), original.get_pixel(42, 22));
    assert_eq!(out.get_pixel(78, 58), original.get_pixel(78, 58));
}

#[test]
fn pixelate_style_produces_flat_blocks() {
    let engine = FaceMaskEngine::new(
        MaskConfig {
            style: BlurStyle::Pixelate { block: 8 },
            ..MaskConfig::default()
        },
        FrameBudget::from_duration(Duration::from_secs(30)),
    );
    let faces = [FaceRegion::from_bounds(Rect::new(40.0, 24.0, 48.0, 48.0))];
    let out = engine
        .process(Frame::new(pattern(), Rotation::Deg0, 0), &faces)
        .into_frame()
        .unwrap();

    let center = out.pixels.get_pixel(64, 48);
    let neighbour = out.pixels.get_pixel(65, 48);
    let original = pattern();
    assert_ne!(center, original.get_pixel(64, 48));
    // Blocks start at the crop origin (x=24, y=8), so both pixels share one.
    assert_eq!(center, neighbour);
}
