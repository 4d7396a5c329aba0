//! Clipveil Capture Engine
//!
//! Hosts the face mask engine for a live capture session. Frames from the
//! camera are anonymized on a dedicated render thread within a per-frame
//! budget and handed to a sink (preview, encoder, or disk).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CaptureSession                │
//! │  capture ──try_send──▶ [1 slot] ──▶ render   │
//! │                                     thread   │
//! │             ┌──────────────┐   ┌──────────┐  │
//! │             │ FaceDetector │──▶│ FaceMask │  │
//! │             └──────────────┘   │  Engine  │  │
//! │                                └────┬─────┘  │
//! │                                     ▼        │
//! │                                 FrameSink    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Host capabilities (ffmpeg toolchain, detector) are probed once by
//! [`capabilities::detect_capabilities`].

pub mod capabilities;
pub mod detector;
pub mod pipeline;
pub mod session;

pub use capabilities::{detect_capabilities, CapabilityReport, CaptureCapabilities};
pub use detector::{DetectorError, FaceDetector, SimulatedDetector};
pub use pipeline::{FrameSink, PipelineStats, PngSequenceSink};
pub use session::*;
