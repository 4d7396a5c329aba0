//! Per-frame face anonymization.

use std::time::Duration;

use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clipveil_common::clock::{FrameBudget, FrameDeadline};
use clipveil_common::config::CaptureDefaults;
use clipveil_media_model::{FaceRegion, Frame};

use crate::blur::BlurStyle;
use crate::mask::{MaskShape, UnionMask};
use crate::MaskError;

/// Coordinate space the detector reports face geometry in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Raw pixel buffer coordinates.
    #[default]
    Buffer,

    /// Upright display coordinates; mapped through the frame rotation.
    Display,
}

/// Face mask configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskConfig {
    /// When false the engine returns every frame untouched.
    pub enabled: bool,

    pub style: BlurStyle,

    /// Ellipse padding as a fraction of the larger bounding box side.
    pub padding_fraction: f64,

    pub coordinates: CoordinateSpace,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            style: BlurStyle::default(),
            padding_fraction: 0.15,
            coordinates: CoordinateSpace::Buffer,
        }
    }
}

impl MaskConfig {
    /// Build from the capture section of the app config. Unknown blur style
    /// names fall back to gaussian.
    pub fn from_capture_defaults(defaults: &CaptureDefaults) -> Self {
        let style = BlurStyle::from_name(
            &defaults.blur_style,
            defaults.blur_sigma,
            defaults.pixelate_block,
        )
        .unwrap_or_else(|| {
            warn!(style = %defaults.blur_style, "Unknown blur style, using gaussian");
            BlurStyle::Gaussian {
                sigma: defaults.blur_sigma,
            }
        });
        Self {
            enabled: defaults.anonymize,
            style,
            padding_fraction: defaults.padding_fraction,
            coordinates: CoordinateSpace::Buffer,
        }
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// At least one face was blurred.
    Rendered(Frame),

    /// The input frame, untouched (no faces, disabled, or a per-frame error).
    Unmodified(Frame),

    /// The time budget ran out; the frame is discarded.
    Dropped,
}

impl FrameOutcome {
    /// The frame to display or encode, if any.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Rendered(f) | Self::Unmodified(f) => Some(f),
            Self::Dropped => None,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }
}

enum Step {
    Done,
    NothingToMask,
    OutOfTime,
}

/// Blurs face regions in frames within a fixed per-frame budget.
pub struct FaceMaskEngine {
    config: MaskConfig,
    budget: FrameBudget,
}

impl FaceMaskEngine {
    pub fn new(config: MaskConfig, budget: FrameBudget) -> Self {
        Self { config, budget }
    }

    /// Engine with a budget of one frame interval at `fps`.
    pub fn for_fps(config: MaskConfig, fps: u32) -> Self {
        Self::new(config, FrameBudget::from_fps(fps))
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    pub fn budget(&self) -> Duration {
        self.budget.interval()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Blur every face in `frame`.
    ///
    /// Never fails: per-frame errors are logged and the frame is returned
    /// unmodified. With no faces the input buffer is handed back as is.
    pub fn process(&self, mut frame: Frame, faces: &[FaceRegion]) -> FrameOutcome {
        if !self.config.enabled || faces.is_empty() {
            return FrameOutcome::Unmodified(frame);
        }

        let deadline = self.budget.start();
        match self.mask_frame(&mut frame, faces, &deadline) {
            Ok(Step::Done) => FrameOutcome::Rendered(frame),
            Ok(Step::NothingToMask) => FrameOutcome::Unmodified(frame),
            Ok(Step::OutOfTime) => {
                debug!(
                    timestamp_ns = frame.timestamp_ns,
                    elapsed_us = deadline.elapsed().as_micros() as u64,
                    "Frame budget exceeded, dropping frame"
                );
                FrameOutcome::Dropped
            }
            Err(e) => {
                warn!(
                    timestamp_ns = frame.timestamp_ns,
                    error = %e,
                    "Face masking failed, rendering frame unmodified"
                );
                FrameOutcome::Unmodified(frame)
            }
        }
    }

    /// Nothing is written to `frame` until every fallible step succeeded.
    fn mask_frame(
        &self,
        frame: &mut Frame,
        faces: &[FaceRegion],
        deadline: &FrameDeadline,
    ) -> Result<Step, MaskError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(MaskError::EmptyFrame { width, height });
        }
        self.config.style.validate()?;

        let mut shapes = Vec::with_capacity(faces.len());
        for (index, face) in faces.iter().enumerate() {
            if !face.bounds.is_valid() {
                debug!(index, bounds = ?face.bounds, "Discarding degenerate face region");
                continue;
            }
            if !face.contour.iter().all(|p| p.is_finite()) {
                return Err(MaskError::MalformedContour { index });
            }
            let region = match self.config.coordinates {
                CoordinateSpace::Buffer => face.clone(),
                CoordinateSpace::Display => face.display_to_buffer(frame.rotation, width, height),
            };
            shapes.push(MaskShape::for_region(&region, self.config.padding_fraction));
        }

        let Some(mask) = UnionMask::build(&shapes, width, height) else {
            return Ok(Step::NothingToMask);
        };
        if deadline.expired() {
            return Ok(Step::OutOfTime);
        }

        let area = mask
            .bounds()
            .expand_within(self.config.style.margin(), width, height);
        let crop = imageops::crop_imm(&frame.pixels, area.x, area.y, area.width, area.height)
            .to_image();
        let blurred = self.config.style.apply(&crop);
        if deadline.expired() {
            return Ok(Step::OutOfTime);
        }

        let b = mask.bounds();
        for y in b.y..b.y + b.height {
            for x in b.x..b.x + b.width {
                let coverage = mask.coverage_at(x, y);
                if coverage == 0 {
                    continue;
                }
                let src = *blurred.get_pixel(x - area.x, y - area.y);
                let dst = frame.pixels.get_pixel_mut(x, y);
                if coverage == u8::MAX {
                    *dst = src;
                } else {
                    let a = coverage as u32;
                    for (d, s) in dst.0.iter_mut().zip(src.0) {
                        *d = ((s as u32 * a + *d as u32 * (255 - a)) / 255) as u8;
                    }
                }
            }
        }
        Ok(Step::Done)
    }
}
