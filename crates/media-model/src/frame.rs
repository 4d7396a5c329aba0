//! Video frames and rotation descriptors.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::face::Point;
use crate::ModelError;

/// Clockwise rotation that must be applied to a buffer to display it upright.
///
/// Portrait phone capture is typically encoded landscape with a 90° flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    Deg0,
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "180")]
    Deg180,
    #[serde(rename = "270")]
    Deg270,
}

impl Rotation {
    /// Parse any integer degree value. Negative values and values past a
    /// full turn are normalized (`-90` becomes `270`).
    pub fn from_degrees(degrees: i64) -> Result<Self, ModelError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(ModelError::InvalidRotation(degrees)),
        }
    }

    /// Normalized angle in degrees.
    pub fn degrees(&self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// True for ±90°, where width and height swap on display.
    pub fn is_quarter_turn(&self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Display size for a buffer of `width` × `height`.
    pub fn corrected_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.is_quarter_turn() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map a point in upright display space back into buffer space.
    ///
    /// `buffer_width` and `buffer_height` are the raw (unrotated) buffer
    /// dimensions.
    pub fn display_to_buffer(&self, p: Point, buffer_width: u32, buffer_height: u32) -> Point {
        let w = buffer_width as f64;
        let h = buffer_height as f64;
        match self {
            Self::Deg0 => p,
            Self::Deg90 => Point::new(p.y, h - p.x),
            Self::Deg180 => Point::new(w - p.x, h - p.y),
            Self::Deg270 => Point::new(w - p.y, p.x),
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// One decoded RGBA8 frame owned by the capture pipeline while processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Pixel buffer in encoded (unrotated) orientation.
    pub pixels: RgbaImage,

    /// Rotation needed to display the buffer upright.
    pub rotation: Rotation,

    /// Capture timestamp relative to the session epoch.
    pub timestamp_ns: u64,
}

impl Frame {
    pub fn new(pixels: RgbaImage, rotation: Rotation, timestamp_ns: u64) -> Self {
        Self {
            pixels,
            rotation,
            timestamp_ns,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Upright display size.
    pub fn display_size(&self) -> (u32, u32) {
        self.rotation.corrected_size(self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rotation_normalizes_negative_degrees() {
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(-270).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-180).unwrap(), Rotation::Deg180);
    }

    #[test]
    fn test_rotation_rejects_odd_angles() {
        assert!(matches!(
            Rotation::from_degrees(45),
            Err(ModelError::InvalidRotation(45))
        ));
    }

    #[test]
    fn test_corrected_size_swaps_on_quarter_turn() {
        assert_eq!(Rotation::Deg90.corrected_size(1920, 1080), (1080, 1920));
        assert_eq!(Rotation::Deg270.corrected_size(1920, 1080), (1080, 1920));
        assert_eq!(Rotation::Deg0.corrected_size(1920, 1080), (1920, 1080));
        assert_eq!(Rotation::Deg180.corrected_size(1920, 1080), (1920, 1080));
    }

    #[test]
    fn test_display_to_buffer_corners() {
        // Buffer 40x20 rotated 90° displays as 20x40.
        let r = Rotation::Deg90;
        let top_left = r.display_to_buffer(Point::new(0.0, 0.0), 40, 20);
        assert_eq!(top_left, Point::new(0.0, 20.0));
        let bottom_right = r.display_to_buffer(Point::new(20.0, 40.0), 40, 20);
        assert_eq!(bottom_right, Point::new(40.0, 0.0));
    }

    #[test]
    fn test_frame_display_size() {
        let frame = Frame::new(RgbaImage::new(64, 36), Rotation::Deg90, 0);
        assert_eq!(frame.display_size(), (36, 64));
    }

    #[test]
    fn test_rotation_serializes_as_degrees() {
        let json = serde_json::to_string(&Rotation::Deg270).unwrap();
        assert_eq!(json, "\"270\"");
    }

    proptest! {
        #[test]
        fn prop_from_degrees_matches_normalized_angle(k in -8i64..8) {
            let r = Rotation::from_degrees(k * 90).unwrap();
            prop_assert_eq!(r.degrees() as i64, (k * 90).rem_euclid(360));
        }

        #[test]
        fn prop_display_points_stay_inside_buffer(
            k in 0i64..4,
            x in 0.0f64..1.0,
            y in 0.0f64..1.0,
        ) {
            let r = Rotation::from_degrees(k * 90).unwrap();
            let (bw, bh) = (64u32, 36u32);
            let (dw, dh) = r.corrected_size(bw, bh);
            let p = r.display_to_buffer(Point::new(x * dw as f64, y * dh as f64), bw, bh);
            prop_assert!(p.x >= -1e-9 && p.x <= bw as f64 + 1e-9);
            prop_assert!(p.y >= -1e-9 && p.y <= bh as f64 + 1e-9);
        }
    }
}
