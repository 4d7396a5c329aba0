//! Composition jobs and the engine that runs them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use clipveil_common::config::AppConfig;
use clipveil_media_model::{CaptionTrack, ModelError, WatermarkContent, WatermarkSpec};

use crate::captions::{write_ass, CaptionStyle};
use crate::compositor::{LayerStack, LayoutError};
use crate::export::{ffmpeg_args, ExportError, ExportRunner, FfmpegRunner, ProgressCallback};
use crate::probe::{FfprobeProber, ProbeError, SourceInfo, SourceProber};

/// Lifecycle of a composition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Where a failed job stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    DecodeSetup,
    OverlayComposition,
    ExportMux,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: FailureStage,
    pub reason: String,
}

/// One unit of post-capture video and overlay muxing work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionJob {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub caption_track: CaptionTrack,
    pub watermark: Option<WatermarkSpec>,
    pub status: JobStatus,
    pub failure: Option<JobFailure>,
    pub output_path: Option<PathBuf>,

    /// Encoder runs started for this job.
    pub attempts: u32,

    /// Rotation-corrected size, known once the source is probed.
    pub render_size: Option<(u32, u32)>,
}

impl CompositionJob {
    pub fn new(
        source_path: impl Into<PathBuf>,
        caption_track: CaptionTrack,
        watermark: Option<WatermarkSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: source_path.into(),
            caption_track,
            watermark,
            status: JobStatus::Pending,
            failure: None,
            output_path: None,
            attempts: 0,
            render_size: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn failure_stage(&self) -> Option<FailureStage> {
        self.failure.as_ref().map(|f| f.stage)
    }

    fn fail(&mut self, stage: FailureStage, reason: String) {
        self.status = JobStatus::Failed;
        self.failure = Some(JobFailure { stage, reason });
    }
}

/// Composition failures. The job records them as a stage plus reason.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("invalid overlay input: {0}")]
    InvalidOverlay(#[from] ModelError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("output verification failed: {0}")]
    Verification(String),

    #[error("job cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type StageError = (FailureStage, ComposeError);

fn at<E: Into<ComposeError>>(stage: FailureStage) -> impl FnOnce(E) -> StageError {
    move |e| (stage, e.into())
}

/// Composition engine settings.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Extra attempts after a transient export failure.
    pub max_export_retries: u32,

    /// Pause between export attempts.
    pub retry_delay: Duration,

    pub caption_style: CaptionStyle,

    /// Where outputs and per-job scratch files are written.
    pub output_dir: PathBuf,
}

impl ComposeConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_export_retries: config.composition.max_export_retries,
            retry_delay: Duration::from_secs(1),
            caption_style: CaptionStyle {
                font_scale: config.composition.caption_font_scale,
                ..CaptionStyle::default()
            },
            output_dir: config.exports_dir(),
        }
    }
}

/// Runs composition jobs one at a time.
pub struct CompositionEngine {
    config: ComposeConfig,
    prober: Arc<dyn SourceProber>,
    runner: Arc<dyn ExportRunner>,
    permit: Semaphore,
}

impl CompositionEngine {
    pub fn new(
        config: ComposeConfig,
        prober: Arc<dyn SourceProber>,
        runner: Arc<dyn ExportRunner>,
    ) -> Self {
        Self {
            config,
            prober,
            runner,
            permit: Semaphore::new(1),
        }
    }

    /// Engine using the ffmpeg/ffprobe binaries named in `config`.
    pub fn with_ffmpeg(config: &AppConfig) -> Self {
        Self::new(
            ComposeConfig::from_app_config(config),
            Arc::new(FfprobeProber::new(config.composition.ffprobe.clone())),
            Arc::new(FfmpegRunner::new(config.composition.ffmpeg.clone())),
        )
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Compose `source` with captions and an optional watermark.
    pub async fn compose(
        &self,
        source: &Path,
        captions: CaptionTrack,
        watermark: Option<WatermarkSpec>,
    ) -> CompositionJob {
        let job = CompositionJob::new(source, captions, watermark);
        self.run(job, &CancellationToken::new(), None).await
    }

    /// Run a pending job to a terminal state.
    pub async fn run(
        &self,
        mut job: CompositionJob,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> CompositionJob {
        let _permit = tokio::select! {
            _ = cancel.cancelled() => {
                job.fail(FailureStage::DecodeSetup, ComposeError::Cancelled.to_string());
                return job;
            }
            permit = self.permit.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    job.fail(FailureStage::DecodeSetup, "composition engine closed".into());
                    return job;
                }
            },
        };

        job.status = JobStatus::Processing;
        tracing::info!(
            job_id = %job.id,
            source = %job.source_path.display(),
            captions = job.caption_track.len(),
            watermark = job.watermark.is_some(),
            "Starting composition"
        );

        match self.execute(&mut job, cancel, progress.as_ref()).await {
            Ok(()) => {
                job.status = JobStatus::Completed;
                tracing::info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    output = ?job.output_path,
                    "Composition completed"
                );
            }
            Err((stage, err)) => {
                tracing::warn!(
                    job_id = %job.id,
                    stage = ?stage,
                    attempts = job.attempts,
                    error = %err,
                    "Composition failed"
                );
                job.fail(stage, err.to_string());
            }
        }
        job
    }

    async fn execute(
        &self,
        job: &mut CompositionJob,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), StageError> {
        // Decode setup: the source must be a readable file with video.
        let source = self
            .prober
            .probe(&job.source_path)
            .await
            .map_err(at(FailureStage::DecodeSetup))?;
        let (width, height) = source.render_size();
        job.render_size = Some((width, height));
        tracing::debug!(
            job_id = %job.id,
            raw = ?(source.width, source.height),
            rotation = %source.rotation,
            render = ?(width, height),
            "Resolved render size"
        );

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(at(FailureStage::DecodeSetup))?;
        let output = self.config.output_dir.join(format!("{}.mp4", job.id));
        job.output_path = Some(output.clone());
        check_cancel(cancel, FailureStage::DecodeSetup)?;

        // Overlay composition, all in render-size coordinates.
        let mut scratch = ScratchFiles::default();
        let stack = self
            .build_layers(job, width, height, &mut scratch)
            .await
            .map_err(at(FailureStage::OverlayComposition))?;
        let plan = stack.filter_plan();
        let args = ffmpeg_args(&job.source_path, &plan, &output);
        check_cancel(cancel, FailureStage::OverlayComposition)?;

        // Export and mux, retrying transient failures with the same inputs.
        loop {
            job.attempts += 1;
            let result = self
                .runner
                .run(&args, source.duration_secs, cancel, progress)
                .await;
            let err = match result {
                Ok(()) => break,
                Err(err) => err,
            };
            remove_partial(&output).await;

            let retries_left = job.attempts <= self.config.max_export_retries;
            if !(err.is_transient() && retries_left) {
                return Err((FailureStage::ExportMux, err.into()));
            }
            tracing::debug!(
                job_id = %job.id,
                attempt = job.attempts,
                error = %err,
                "Retrying export"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err((FailureStage::ExportMux, ComposeError::Cancelled));
                }
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }

        let verified = self.verify_output(&output, &source, (width, height)).await;
        if verified.is_err() {
            remove_partial(&output).await;
        }
        verified.map_err(at(FailureStage::ExportMux))
    }

    async fn build_layers(
        &self,
        job: &CompositionJob,
        width: u32,
        height: u32,
        scratch: &mut ScratchFiles,
    ) -> Result<LayerStack, ComposeError> {
        job.caption_track.validate()?;
        if let Some(watermark) = &job.watermark {
            watermark.validate()?;
        }

        let mut stack = LayerStack::new(width, height)?;
        if !job.caption_track.is_empty() {
            let script = self.config.output_dir.join(format!("{}.ass", job.id));
            scratch.push(script.clone());
            write_ass(
                &script,
                &job.caption_track,
                width,
                height,
                &self.config.caption_style,
            )
            .await?;
            stack.push_captions(script);
        }

        if let Some(watermark) = &job.watermark {
            let text_file = match &watermark.content {
                WatermarkContent::Text { text } => {
                    let path = self.config.output_dir.join(format!("{}.wm.txt", job.id));
                    scratch.push(path.clone());
                    tokio::fs::write(&path, text).await?;
                    Some(path)
                }
                WatermarkContent::Image { .. } => None,
            };
            stack.push_watermark(watermark, text_file.as_deref())?;
        }
        Ok(stack)
    }

    /// The output must keep the render size and the source's audio.
    async fn verify_output(
        &self,
        output: &Path,
        source: &SourceInfo,
        render_size: (u32, u32),
    ) -> Result<(), ComposeError> {
        let exported = self.prober.probe(output).await?;
        if exported.render_size() != render_size {
            return Err(ComposeError::Verification(format!(
                "output renders at {:?}, expected {:?}",
                exported.render_size(),
                render_size
            )));
        }
        if source.has_audio() && !exported.has_audio() {
            return Err(ComposeError::Verification(
                "source audio missing from output".into(),
            ));
        }
        let drift = (exported.duration_secs - source.duration_secs).abs();
        if source.duration_secs > 0.0 && drift > 0.5 {
            tracing::warn!(
                source_secs = source.duration_secs,
                output_secs = exported.duration_secs,
                "Output duration differs from source"
            );
        }
        Ok(())
    }
}

fn check_cancel(cancel: &CancellationToken, stage: FailureStage) -> Result<(), StageError> {
    if cancel.is_cancelled() {
        return Err((stage, ComposeError::Cancelled));
    }
    Ok(())
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

/// Per-job files removed when the job ends, however it ends.
#[derive(Default)]
struct ScratchFiles(Vec<PathBuf>);

impl ScratchFiles {
    fn push(&mut self, path: PathBuf) {
        self.0.push(path);
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = std::fs::remove_file(path);
        }
    }
}
