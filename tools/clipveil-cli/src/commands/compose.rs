//! Compose a recorded clip with captions and a watermark.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use clipveil_common::config::AppConfig;
use clipveil_media_model::{Anchor, CaptionTrack, WatermarkSpec};
use clipveil_render_engine::{
    CompositionEngine, CompositionJob, ExportProgress, JobStatus, ProgressCallback,
};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &AppConfig,
    source: PathBuf,
    captions: Option<PathBuf>,
    watermark_text: Option<String>,
    watermark_image: Option<PathBuf>,
    anchor: Anchor,
    opacity: f64,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Composing: {}", source.display());

    let track = match &captions {
        Some(path) => CaptionTrack::load(path)?,
        None => CaptionTrack::empty(),
    };
    let watermark = match (watermark_text, watermark_image) {
        (Some(text), _) => Some(WatermarkSpec::text(text)),
        (None, Some(path)) => Some(WatermarkSpec::image(path)),
        (None, None) => None,
    }
    .map(|spec| spec.with_anchor(anchor).with_opacity(opacity));

    println!("  Captions: {} segment(s)", track.len());
    println!(
        "  Watermark: {}",
        if watermark.is_some() { "yes" } else { "none" }
    );

    let engine = CompositionEngine::with_ffmpeg(config);
    let progress: ProgressCallback = Arc::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:5.1}%  ETA: {:.0}s   ",
            p.progress * 100.0,
            p.eta_secs
        );
        let _ = std::io::stdout().flush();
    });

    let job = CompositionJob::new(&source, track, watermark);
    let cancel = cancel_on_ctrl_c();
    let job = engine.run(job, &cancel, Some(progress)).await;
    println!();

    match job.status {
        JobStatus::Completed => {
            let produced = job
                .output_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Job completed without an output path"))?;
            let final_path = match output {
                Some(dest) => move_file(&produced, &dest)?,
                None => produced,
            };
            if let Some((w, h)) = job.render_size {
                println!("  Render size: {w}x{h}");
            }
            println!("  Attempts: {}", job.attempts);
            println!("Export complete: {}", final_path.display());
            Ok(())
        }
        _ => {
            let reason = job
                .failure
                .map(|f| format!("{:?}: {}", f.stage, f.reason))
                .unwrap_or_else(|| "unknown failure".to_string());
            Err(anyhow::anyhow!("Composition failed at {reason}"))
        }
    }
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling composition");
            child.cancel();
        }
    });
    token
}

fn move_file(from: &Path, to: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(from, to).is_err() {
        // Different filesystem
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(to.to_path_buf())
}
