//! Frame delivery and render-path statistics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops;

use clipveil_common::error::{ClipveilError, ClipveilResult};
use clipveil_media_model::{Frame, Rotation};

/// Receives frames leaving the render thread (preview, encoder, disk).
pub trait FrameSink: Send {
    /// Accept one frame. `masked` is true when faces were blurred.
    fn deliver(&mut self, frame: Frame, masked: bool) -> ClipveilResult<()>;

    /// Flush and release resources when the session stops.
    fn finish(&mut self) -> ClipveilResult<()> {
        Ok(())
    }
}

/// Runtime statistics from the render path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames offered to the session.
    pub frames_submitted: u64,

    /// Frames delivered with at least one face blurred.
    pub frames_rendered: u64,

    /// Frames delivered untouched.
    pub frames_unmodified: u64,

    /// Frames rejected because the render thread was still busy.
    pub frames_dropped_busy: u64,

    /// Frames discarded after exceeding the per-frame budget.
    pub frames_dropped_budget: u64,

    /// Detector calls that failed.
    pub detector_failures: u64,
}

impl PipelineStats {
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped_busy + self.frames_dropped_budget
    }

    /// Drop rate as a percentage.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_submitted == 0 {
            return 0.0;
        }
        self.frames_dropped() as f64 / self.frames_submitted as f64 * 100.0
    }
}

/// Lock-free counters shared between the capture side and the render thread.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub submitted: AtomicU64,
    pub rendered: AtomicU64,
    pub unmodified: AtomicU64,
    pub dropped_busy: AtomicU64,
    pub dropped_budget: AtomicU64,
    pub detector_failures: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_submitted: self.submitted.load(Ordering::Relaxed),
            frames_rendered: self.rendered.load(Ordering::Relaxed),
            frames_unmodified: self.unmodified.load(Ordering::Relaxed),
            frames_dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            frames_dropped_budget: self.dropped_budget.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
        }
    }
}

/// Writes delivered frames as an upright PNG sequence.
pub struct PngSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> ClipveilResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameSink for PngSequenceSink {
    fn deliver(&mut self, frame: Frame, _masked: bool) -> ClipveilResult<()> {
        let upright = match frame.rotation {
            Rotation::Deg0 => frame.pixels,
            Rotation::Deg90 => imageops::rotate90(&frame.pixels),
            Rotation::Deg180 => imageops::rotate180(&frame.pixels),
            Rotation::Deg270 => imageops::rotate270(&frame.pixels),
        };
        let path = self.frame_path(self.written);
        upright
            .save(&path)
            .map_err(|e| ClipveilError::capture(format!("Failed to write {}: {e}", path.display())))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> ClipveilResult<()> {
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.written,
            "PNG sequence complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_drop_rate() {
        let stats = PipelineStats {
            frames_submitted: 200,
            frames_dropped_busy: 6,
            frames_dropped_budget: 4,
            ..PipelineStats::default()
        };
        assert_eq!(stats.frames_dropped(), 10);
        assert!((stats.drop_rate() - 5.0).abs() < 1e-9);
        assert_eq!(PipelineStats::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_png_sink_writes_upright_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::new(dir.path().join("frames")).unwrap();

        let mut pixels = RgbaImage::new(8, 4);
        pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        sink.deliver(Frame::new(pixels, Rotation::Deg90, 0), false)
            .unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 1);
        let written = image::open(sink.dir().join("frame_000000.png"))
            .unwrap()
            .to_rgba8();
        assert_eq!(written.dimensions(), (4, 8));
        // Buffer top-left ends up top-right after a clockwise quarter turn.
        assert_eq!(written.get_pixel(3, 0).0, [255, 0, 0, 255]);
    }
}
