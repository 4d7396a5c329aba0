use crate::capabilities::{CapabilityReport, CaptureCapabilities};
use crate::detector::{ExternalGeometry, FaceDetector};

/// Host with a working ffmpeg toolchain. Face geometry arrives with each
/// frame from the platform detector.
pub struct NativeCapabilities {
    report: CapabilityReport,
}

impl NativeCapabilities {
    pub fn new(report: CapabilityReport) -> Self {
        Self { report }
    }
}

impl CaptureCapabilities for NativeCapabilities {
    fn name(&self) -> &'static str {
        "native"
    }

    fn report(&self) -> &CapabilityReport {
        &self.report
    }

    fn face_detector(&self) -> Box<dyn FaceDetector> {
        Box::new(ExternalGeometry)
    }
}
