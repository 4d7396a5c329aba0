//! Blur styles applied to the cropped face area.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::MaskError;

/// How masked pixels are obscured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum BlurStyle {
    /// Gaussian blur with the given sigma in pixels.
    Gaussian { sigma: f32 },

    /// Mosaic of `block` × `block` averaged cells.
    Pixelate { block: u32 },
}

impl Default for BlurStyle {
    fn default() -> Self {
        Self::Gaussian { sigma: 12.0 }
    }
}

impl BlurStyle {
    /// Build from config strings (`"gaussian"` / `"pixelate"`).
    pub fn from_name(name: &str, sigma: f32, block: u32) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gaussian" | "blur" => Some(Self::Gaussian { sigma }),
            "pixelate" | "mosaic" => Some(Self::Pixelate { block }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), MaskError> {
        match *self {
            Self::Gaussian { sigma } if !(sigma.is_finite() && sigma > 0.0) => {
                Err(MaskError::InvalidBlur(format!("sigma {sigma}")))
            }
            Self::Pixelate { block } if block < 2 => {
                Err(MaskError::InvalidBlur(format!("block {block}")))
            }
            _ => Ok(()),
        }
    }

    /// Extra pixels sampled around the mask so edge pixels blur against
    /// real neighbours instead of the crop border.
    pub fn margin(&self) -> u32 {
        match *self {
            Self::Gaussian { sigma } => (sigma * 3.0).ceil() as u32,
            Self::Pixelate { block } => block,
        }
    }

    /// Produce the obscured version of `source`.
    pub fn apply(&self, source: &RgbaImage) -> RgbaImage {
        match *self {
            Self::Gaussian { sigma } => imageproc::filter::gaussian_blur_f32(source, sigma),
            Self::Pixelate { block } => pixelate(source, block),
        }
    }
}

fn pixelate(source: &RgbaImage, block: u32) -> RgbaImage {
    let (width, height) = source.dimensions();
    let mut out = RgbaImage::new(width, height);
    let block = block.max(1);

    for by in (0..height).step_by(block as usize) {
        for bx in (0..width).step_by(block as usize) {
            let bw = block.min(width - bx);
            let bh = block.min(height - by);

            let mut sum = [0u64; 4];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let p = source.get_pixel(x, y);
                    for (acc, channel) in sum.iter_mut().zip(p.0) {
                        *acc += channel as u64;
                    }
                }
            }
            let count = (bw * bh) as u64;
            let avg = Rgba(sum.map(|c| (c / count) as u8));

            for y in by..by + bh {
                for x in bx..bx + bw {
                    out.put_pixel(x, y, avg);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn test_pixelate_averages_blocks() {
        let out = BlurStyle::Pixelate { block: 2 }.apply(&checkerboard(4, 4));
        for p in out.pixels() {
            assert_eq!(p.0, [127, 127, 127, 255]);
        }
    }

    #[test]
    fn test_pixelate_handles_partial_blocks() {
        let out = BlurStyle::Pixelate { block: 4 }.apply(&checkerboard(5, 3));
        assert_eq!(out.dimensions(), (5, 3));
        // Last column is its own 1x3 block: white, black, white.
        assert_eq!(out.get_pixel(4, 0).0, [170, 170, 170, 255]);
    }

    #[test]
    fn test_gaussian_flattens_checkerboard() {
        let out = BlurStyle::Gaussian { sigma: 2.0 }.apply(&checkerboard(16, 16));
        let center = out.get_pixel(8, 8).0;
        assert!(center[0] > 100 && center[0] < 155, "got {center:?}");
    }

    #[test]
    fn test_validate_rejects_degenerate_parameters() {
        assert!(BlurStyle::Gaussian { sigma: 0.0 }.validate().is_err());
        assert!(BlurStyle::Pixelate { block: 1 }.validate().is_err());
        assert!(BlurStyle::default().validate().is_ok());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            BlurStyle::from_name("Pixelate", 4.0, 12),
            Some(BlurStyle::Pixelate { block: 12 })
        );
        assert_eq!(BlurStyle::from_name("smudge", 4.0, 12), None);
    }
}
