//! Capture session management.
//!
//! The session owns a dedicated render thread that runs the face mask
//! engine. Capture hands frames over through a one-slot channel; when the
//! render thread is still busy the new frame is dropped instead of queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clipveil_common::clock::RecordingClock;
use clipveil_common::config::AppConfig;
use clipveil_common::error::{ClipveilError, ClipveilResult};
use clipveil_face_mask::{FaceMaskEngine, FrameOutcome, MaskConfig};
use clipveil_media_model::{FaceRegion, Frame};

use crate::detector::FaceDetector;
use crate::pipeline::{FrameSink, PipelineStats, StatsCounters};

/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Target capture rate; sets the per-frame budget.
    pub fps: u32,

    /// Masking settings. `mask.enabled` seeds the runtime toggle.
    pub mask: MaskConfig,
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            fps: config.capture.fps,
            mask: MaskConfig::from_capture_defaults(&config.capture),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            mask: MaskConfig::default(),
        }
    }
}

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Frames are being accepted.
    Recording,
    /// Render thread joined, sink finished.
    Stopped,
}

enum FrameInput {
    /// Geometry supplied by the capture collaborator.
    WithFaces(Frame, Vec<FaceRegion>),
    /// Geometry comes from the session's detector.
    Detect(Frame),
}

/// A capture session that anonymizes frames on a dedicated render thread.
pub struct CaptureSession {
    config: SessionConfig,
    state: SessionState,
    clock: Option<RecordingClock>,
    anonymize: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,
    sender: Option<SyncSender<FrameInput>>,
    worker: Option<JoinHandle<ClipveilResult<()>>>,
    detector: Option<Box<dyn FaceDetector>>,
    sink: Option<Box<dyn FrameSink>>,
}

impl CaptureSession {
    /// Create a session. Nothing runs until [`CaptureSession::start`].
    pub fn new(
        config: SessionConfig,
        detector: Box<dyn FaceDetector>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        let anonymize = Arc::new(AtomicBool::new(config.mask.enabled));
        Self {
            config,
            state: SessionState::Idle,
            clock: None,
            anonymize,
            stats: Arc::new(StatsCounters::default()),
            sender: None,
            worker: None,
            detector: Some(detector),
            sink: Some(sink),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Spawn the render thread and begin accepting frames.
    pub fn start(&mut self) -> ClipveilResult<()> {
        if self.state != SessionState::Idle {
            return Err(ClipveilError::capture("Session already started"));
        }
        let (Some(detector), Some(sink)) = (self.detector.take(), self.sink.take()) else {
            return Err(ClipveilError::capture("Session resources already consumed"));
        };

        let (tx, rx) = mpsc::sync_channel::<FrameInput>(1);
        let engine = FaceMaskEngine::for_fps(self.config.mask.clone(), self.config.fps);
        let worker = RenderWorker {
            engine,
            detector,
            sink,
            anonymize: self.anonymize.clone(),
            stats: self.stats.clone(),
        };

        let handle = thread::Builder::new()
            .name("clipveil-render".into())
            .spawn(move || worker.run(rx))
            .map_err(|e| ClipveilError::capture(format!("Failed to spawn render thread: {e}")))?;

        tracing::info!(
            fps = self.config.fps,
            budget_ms = 1000.0 / self.config.fps.max(1) as f64,
            anonymize = self.anonymize.load(Ordering::Relaxed),
            "Capture session started"
        );

        self.clock = Some(RecordingClock::start());
        self.sender = Some(tx);
        self.worker = Some(handle);
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Offer a frame with its face geometry. Returns false if the frame was
    /// dropped because the render thread is busy or the session is not
    /// recording.
    pub fn submit(&self, frame: Frame, faces: Vec<FaceRegion>) -> bool {
        self.offer(FrameInput::WithFaces(frame, faces))
    }

    /// Offer a bare frame; the session's detector supplies geometry.
    pub fn submit_detect(&self, frame: Frame) -> bool {
        self.offer(FrameInput::Detect(frame))
    }

    /// Hand over a frame, waiting for the render thread to take it.
    ///
    /// For offline batches where no frame may be dropped.
    pub fn submit_blocking(&self, frame: Frame, faces: Option<Vec<FaceRegion>>) -> ClipveilResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ClipveilError::capture("Session is not recording"))?;
        StatsCounters::bump(&self.stats.submitted);
        let input = match faces {
            Some(faces) => FrameInput::WithFaces(frame, faces),
            None => FrameInput::Detect(frame),
        };
        sender
            .send(input)
            .map_err(|_| ClipveilError::capture("Render thread has exited"))
    }

    fn offer(&self, input: FrameInput) -> bool {
        StatsCounters::bump(&self.stats.submitted);
        let Some(sender) = self.sender.as_ref() else {
            StatsCounters::bump(&self.stats.dropped_busy);
            return false;
        };
        match sender.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                StatsCounters::bump(&self.stats.dropped_busy);
                tracing::trace!("Render thread busy, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                StatsCounters::bump(&self.stats.dropped_busy);
                tracing::warn!("Render thread has exited, dropping frame");
                false
            }
        }
    }

    /// Turn anonymization on or off while recording.
    pub fn set_anonymize(&self, enabled: bool) {
        self.anonymize.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Anonymization toggled");
    }

    pub fn anonymize(&self) -> bool {
        self.anonymize.load(Ordering::Relaxed)
    }

    /// Timestamp for the next captured frame, relative to session start.
    pub fn timestamp_ns(&self) -> u64 {
        self.clock.as_ref().map(|c| c.elapsed_ns()).unwrap_or(0)
    }

    /// Recording duration so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0)
    }

    /// Snapshot of the render-path counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Stop accepting frames, drain the render thread, and finish the sink.
    pub fn stop(&mut self) -> ClipveilResult<PipelineStats> {
        if self.state != SessionState::Recording {
            return Err(ClipveilError::capture("Not recording"));
        }
        // Closing the channel ends the worker loop once the slot drains.
        self.sender = None;
        let result = match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ClipveilError::capture("Render thread panicked"))?,
            None => Ok(()),
        };
        self.state = SessionState::Stopped;

        let stats = self.stats();
        tracing::info!(
            elapsed_secs = self.elapsed_secs(),
            submitted = stats.frames_submitted,
            rendered = stats.frames_rendered,
            unmodified = stats.frames_unmodified,
            dropped = stats.frames_dropped(),
            drop_rate = stats.drop_rate(),
            detector_failures = stats.detector_failures,
            "Capture session stopped"
        );
        result.map(|()| stats)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct RenderWorker {
    engine: FaceMaskEngine,
    detector: Box<dyn FaceDetector>,
    sink: Box<dyn FrameSink>,
    anonymize: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,
}

impl RenderWorker {
    fn run(mut self, rx: Receiver<FrameInput>) -> ClipveilResult<()> {
        for input in rx {
            let enabled = self.anonymize.load(Ordering::Relaxed);
            self.engine.set_enabled(enabled);

            let (frame, faces) = match input {
                FrameInput::WithFaces(frame, faces) => (frame, faces),
                FrameInput::Detect(frame) if enabled => match self.detector.detect(&frame) {
                    Ok(faces) => (frame, faces),
                    Err(e) => {
                        StatsCounters::bump(&self.stats.detector_failures);
                        tracing::warn!(
                            detector = self.detector.name(),
                            timestamp_ns = frame.timestamp_ns,
                            error = %e,
                            "Face detection failed, rendering frame unmodified"
                        );
                        (frame, Vec::new())
                    }
                },
                FrameInput::Detect(frame) => (frame, Vec::new()),
            };

            let (frame, masked) = match self.engine.process(frame, &faces) {
                FrameOutcome::Rendered(frame) => {
                    StatsCounters::bump(&self.stats.rendered);
                    (frame, true)
                }
                FrameOutcome::Unmodified(frame) => {
                    StatsCounters::bump(&self.stats.unmodified);
                    (frame, false)
                }
                FrameOutcome::Dropped => {
                    StatsCounters::bump(&self.stats.dropped_budget);
                    continue;
                }
            };

            if let Err(e) = self.sink.deliver(frame, masked) {
                tracing::warn!(error = %e, "Frame sink rejected frame");
            }
        }

        self.sink.finish()
    }
}
