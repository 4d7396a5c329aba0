//! Clipveil Media Model
//!
//! Defines the data contracts shared between capture, composition, and
//! export:
//! - **Frame:** one decoded RGBA frame with its rotation descriptor
//! - **FaceRegion:** per-frame face geometry (bounding box and contour)
//! - **CaptionTrack:** caption segments with per-word timing
//! - **WatermarkSpec:** static text/image overlay with a fixed anchor
//!
//! Face geometry is expressed in pixel coordinates. Captions use seconds
//! from the start of the clip.

pub mod caption;
pub mod face;
pub mod frame;
pub mod watermark;

pub use caption::*;
pub use face::*;
pub use frame::*;
pub use watermark::*;

/// Errors raised when model values fail validation.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("rotation of {0} degrees is not a multiple of 90")]
    InvalidRotation(i64),

    #[error("caption segment {index}: {reason}")]
    InvalidCaption { index: usize, reason: String },

    #[error("invalid watermark: {0}")]
    InvalidWatermark(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
