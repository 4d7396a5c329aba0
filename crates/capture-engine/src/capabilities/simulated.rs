use crate::capabilities::{CapabilityReport, CaptureCapabilities};
use crate::detector::{FaceDetector, SimulatedDetector};

/// Fallback for development hosts: a simulated detector reports a centred
/// face so the masking path still runs end to end.
pub struct SimulatedCapabilities {
    report: CapabilityReport,
}

impl SimulatedCapabilities {
    pub fn new(report: CapabilityReport) -> Self {
        Self { report }
    }
}

impl CaptureCapabilities for SimulatedCapabilities {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn report(&self) -> &CapabilityReport {
        &self.report
    }

    fn face_detector(&self) -> Box<dyn FaceDetector> {
        tracing::debug!("Using simulated face detector");
        Box::new(SimulatedDetector::default())
    }
}
