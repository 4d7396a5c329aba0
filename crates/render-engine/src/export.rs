//! Encoder invocation: ffmpeg arguments, progress parsing, and failure
//! classification.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::compositor::FilterPlan;

/// Progress callback for export rendering.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Output timestamp reached by the encoder.
    pub out_time_secs: f64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Encoder reported `progress=end`.
    pub complete: bool,
}

/// Why an encoder run failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    /// Worth retrying with the same inputs.
    #[error("transient export failure: {0}")]
    Transient(String),

    /// Retrying cannot help.
    #[error("export failed: {0}")]
    Permanent(String),

    /// Disk or memory ran out.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Runs one encode to completion.
#[async_trait::async_trait]
pub trait ExportRunner: Send + Sync {
    /// Execute ffmpeg with `args`. `expected_duration_secs` scales
    /// progress reports.
    async fn run(
        &self,
        args: &[String],
        expected_duration_secs: f64,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ExportError>;
}

/// [`ExportRunner`] backed by the ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: String,
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait::async_trait]
impl ExportRunner for FfmpegRunner {
    async fn run(
        &self,
        args: &[String],
        expected_duration_secs: f64,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ExportError> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::Permanent(format!("failed to start {}: {e}", self.binary)))?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::Transient("failed to capture ffmpeg stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::Transient("failed to capture ffmpeg stderr".into()))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Err(err) = BufReader::new(stderr).read_to_string(&mut output).await {
                output.push_str(&format!("<failed to read ffmpeg stderr: {err}>"));
            }
            output
        });

        let start = Instant::now();
        let mut state = ProgressState::default();
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg");
                    }
                    stderr_task.abort();
                    tracing::info!("ffmpeg cancelled");
                    return Err(ExportError::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some((key, value)) = line.trim().split_once('=') else {
                            continue;
                        };
                        state.update(key, value);
                        if key == "progress" {
                            if let Some(cb) = progress {
                                cb(progress_report(
                                    &state,
                                    expected_duration_secs,
                                    start.elapsed().as_secs_f64(),
                                ));
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed reading ffmpeg progress");
                        break;
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ffmpeg");
                }
                stderr_task.abort();
                return Err(ExportError::Cancelled);
            }
            status = child.wait() => status
                .map_err(|e| ExportError::Transient(format!("failed to wait on ffmpeg: {e}")))?,
        };
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if status.success() {
            tracing::info!(
                elapsed_secs = start.elapsed().as_secs_f64(),
                "ffmpeg finished"
            );
            return Ok(());
        }
        Err(classify_failure(status.code(), &stderr_output))
    }
}

/// Full ffmpeg argument list for one composition.
///
/// The source's audio is stream-copied when present, and the output is
/// written upright so it carries no rotation of its own.
pub fn ffmpeg_args(source: &Path, plan: &FilterPlan, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
    args.push("-i".into());
    args.push(source.to_string_lossy().into_owned());
    for input in &plan.extra_inputs {
        args.push("-i".into());
        args.push(input.to_string_lossy().into_owned());
    }
    args.extend(
        [
            "-filter_complex",
            plan.graph.as_str(),
            "-map",
            plan.output_label.as_str(),
            "-map",
            "0:a?",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "copy",
            "-metadata:s:v:0",
            "rotate=0",
            "-movflags",
            "+faststart",
            "-progress",
            "pipe:1",
            "-nostats",
        ]
        .into_iter()
        .map(String::from),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

const RESOURCE_MARKERS: &[&str] = &[
    "no space left on device",
    "cannot allocate memory",
    "out of memory",
    "enospc",
    "enomem",
];

const PERMANENT_MARKERS: &[&str] = &[
    "invalid data found when processing input",
    "no such filter",
    "filter not found",
    "unknown encoder",
    "unrecognized option",
    "option not found",
    "error parsing",
    "no such file or directory",
    "does not contain any stream",
    "invalid argument",
];

/// Classify a failed ffmpeg exit from its status code and stderr.
///
/// Resource exhaustion wins over everything else. A process killed by a
/// signal (no exit code) is treated as transient.
pub fn classify_failure(code: Option<i32>, stderr: &str) -> ExportError {
    let lower = stderr.to_ascii_lowercase();
    let detail = format!(
        "status {}: {}",
        code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
        stderr_tail(stderr, 8)
    );

    if RESOURCE_MARKERS.iter().any(|m| lower.contains(m)) {
        return ExportError::ResourceExhausted(detail);
    }
    if code.is_some() && PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ExportError::Permanent(detail);
    }
    ExportError::Transient(detail)
}

fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(max_lines)..].join(" | ")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, out_time_ms is in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    expected_duration_secs: f64,
    elapsed_secs: f64,
) -> ExportProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };

    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        progress: if state.complete { 1.0 } else { progress },
        out_time_secs: state.out_time_secs,
        eta_secs: if state.complete { 0.0 } else { eta_secs },
        complete: state.complete,
    }
}
