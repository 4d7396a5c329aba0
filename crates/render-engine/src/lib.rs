//! Clipveil Render Engine
//!
//! Post-capture composition: burns captions and a watermark into a
//! finished clip while keeping its audio and correcting its orientation.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ── ffprobe ── rotation, render size
//!                                │
//! captions.json ── job.ass ──────┤
//!                                ├── LayerStack ── filter graph
//! watermark ─────────────────────┘                     │
//!                                                      ▼
//!                                         ffmpeg (H.264, audio copy)
//!                                                      │
//!                                                      ▼
//!                                     output.mp4 ── verification probe
//! ```

pub mod captions;
pub mod compositor;
pub mod engine;
pub mod export;
pub mod probe;

pub use captions::{build_ass, CaptionStyle};
pub use compositor::{FilterPlan, Layer, LayerStack, LayoutError};
pub use engine::{
    ComposeConfig, ComposeError, CompositionEngine, CompositionJob, FailureStage, JobFailure,
    JobStatus,
};
pub use export::{ExportError, ExportProgress, ExportRunner, FfmpegRunner, ProgressCallback};
pub use probe::{FfprobeProber, ProbeError, SourceInfo, SourceProber};
