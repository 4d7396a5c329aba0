//! Face geometry sources.

use clipveil_media_model::{FaceRegion, Frame, Rect};

/// Failure reported by a face detector for one frame.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detection failed: {0}")]
    Failed(String),
}

/// Supplies per-frame face geometry when capture does not provide it.
pub trait FaceDetector: Send {
    fn name(&self) -> &str;

    /// Detect faces in buffer coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, DetectorError>;
}

/// Used when an external collaborator attaches geometry to every frame.
/// Bare frames carry no faces.
#[derive(Debug, Default)]
pub struct ExternalGeometry;

impl FaceDetector for ExternalGeometry {
    fn name(&self) -> &str {
        "external"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, DetectorError> {
        Ok(Vec::new())
    }
}

/// Reports one face centred in the frame. Stands in for a real model on
/// machines without native detection.
#[derive(Debug, Clone)]
pub struct SimulatedDetector {
    /// Face side length as a fraction of the shorter frame side.
    size_fraction: f64,
}

impl SimulatedDetector {
    pub fn new(size_fraction: f64) -> Self {
        Self {
            size_fraction: size_fraction.clamp(0.05, 1.0),
        }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new(0.35)
    }
}

impl FaceDetector for SimulatedDetector {
    fn name(&self) -> &str {
        "simulated"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, DetectorError> {
        let (w, h) = (frame.width() as f64, frame.height() as f64);
        if w == 0.0 || h == 0.0 {
            return Err(DetectorError::Failed("empty frame".into()));
        }
        let side = w.min(h) * self.size_fraction;
        Ok(vec![FaceRegion::from_bounds(Rect::new(
            (w - side) / 2.0,
            (h - side) / 2.0,
            side,
            side,
        ))])
    }
}
