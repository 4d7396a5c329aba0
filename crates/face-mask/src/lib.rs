//! Clipveil Face Mask
//!
//! Renders a frame identical to its input except that every detected face
//! region is blurred:
//! - **Mask:** contour polygons or padded ellipses rasterized into one union
//! - **Blur:** gaussian or pixelate, computed only around the union
//! - **Engine:** per-frame entry point with a hard time budget
//!
//! This crate is pure computation. No I/O, no threads.

pub mod blur;
pub mod engine;
pub mod mask;

pub use blur::BlurStyle;
pub use engine::{CoordinateSpace, FaceMaskEngine, FrameOutcome, MaskConfig};
pub use mask::{MaskShape, PixelRect, UnionMask};

/// Per-frame masking failure. Never escapes [`FaceMaskEngine::process`].
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("face {index} has a contour with non-finite points")]
    MalformedContour { index: usize },

    #[error("frame has zero size ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("blur parameter out of range: {0}")]
    InvalidBlur(String),
}
