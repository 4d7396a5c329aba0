//! Check host capabilities and configuration.

use std::path::PathBuf;

use clipveil_capture_engine::detect_capabilities;
use clipveil_common::config::AppConfig;

pub fn run(config: &AppConfig, write_config: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Clipveil System Check");
    println!("{}", "=".repeat(50));

    let capabilities = detect_capabilities(&config.composition);
    let report = capabilities.report();
    let line = |ok: bool, what: &str| {
        println!("[{}] {what}", if ok { "OK" } else { "MISSING" });
    };
    line(report.ffmpeg, &format!("ffmpeg ({})", config.composition.ffmpeg));
    line(report.ffprobe, &format!("ffprobe ({})", config.composition.ffprobe));
    line(report.ass_filter, "ffmpeg `ass` filter (captions)");
    line(report.drawtext_filter, "ffmpeg `drawtext` filter (text watermarks)");
    println!("     Capture provider: {}", capabilities.name());
    println!("     Face detector: {}", capabilities.face_detector().name());

    println!();
    println!("Data dir:     {}", config.data_dir.display());
    println!("Exports:      {}", config.exports_dir().display());
    println!("Upload state: {}", config.upload_state_path().display());
    println!("Cache:        {} (cap {} bytes)", config.cache_dir().display(), config.cache.cap_bytes);
    match clipveil_storage::remote_from_config(config) {
        Ok(remote) => println!("Remote store: {}", remote.name()),
        Err(e) => println!("[WARN] Remote store: {e}"),
    }

    if let Some(path) = write_config {
        config.save_to(&path)?;
        println!("Config written: {}", path.display());
    }

    println!();
    if report.can_compose() && report.ass_filter {
        println!("All required capabilities are available. Clipveil is ready.");
    } else {
        println!("Composition needs ffmpeg and ffprobe with libass. See above.");
    }
    Ok(())
}
