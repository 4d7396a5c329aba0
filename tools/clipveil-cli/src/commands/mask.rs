//! Blur faces in still frames through a capture session.

use std::path::PathBuf;

use anyhow::Context;

use clipveil_capture_engine::{
    detect_capabilities, CaptureSession, PngSequenceSink, SessionConfig,
};
use clipveil_common::config::AppConfig;
use clipveil_face_mask::BlurStyle;
use clipveil_media_model::{FaceRegion, Frame, Rotation};

pub fn run(
    config: &AppConfig,
    frames: Vec<PathBuf>,
    faces: Option<PathBuf>,
    output: PathBuf,
    rotation: i64,
    style: Option<String>,
    fps: Option<u32>,
) -> anyhow::Result<()> {
    let rotation = Rotation::from_degrees(rotation)?;

    let faces: Option<Vec<FaceRegion>> = match faces {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(serde_json::from_str(&json).context("Face regions must be a JSON array")?)
        }
        None => None,
    };

    let mut session_config = SessionConfig::from_app_config(config);
    if let Some(fps) = fps {
        session_config.fps = fps.max(1);
    }
    if let Some(name) = style {
        session_config.mask.style = BlurStyle::from_name(
            &name,
            config.capture.blur_sigma,
            config.capture.pixelate_block,
        )
        .ok_or_else(|| anyhow::anyhow!("Unknown blur style: {name}. Use: gaussian, pixelate"))?;
    }

    let capabilities = detect_capabilities(&config.composition);
    let detector = capabilities.face_detector();
    println!("Masking {} frame(s)", frames.len());
    println!("  Detector: {}", if faces.is_some() { "supplied geometry" } else { detector.name() });
    println!("  Output: {}", output.display());

    let sink = PngSequenceSink::new(&output)?;
    let mut session = CaptureSession::new(session_config, detector, Box::new(sink));
    session.start()?;

    for path in &frames {
        let pixels = image::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .to_rgba8();
        let frame = Frame::new(pixels, rotation, session.timestamp_ns());
        session.submit_blocking(frame, faces.clone())?;
    }

    let stats = session.stop()?;
    println!();
    println!("Done.");
    println!("  Blurred: {}", stats.frames_rendered);
    println!("  Unmodified: {}", stats.frames_unmodified);
    println!("  Dropped (over budget): {}", stats.frames_dropped_budget);
    if stats.detector_failures > 0 {
        println!("  Detector failures: {}", stats.detector_failures);
    }
    Ok(())
}
