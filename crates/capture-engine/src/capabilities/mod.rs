//! Host capability providers. The host is inspected once at startup and
//! either the native provider or the simulated fallback is selected.

use std::process::Command;

use serde::Serialize;

use clipveil_common::config::CompositionDefaults;

use crate::detector::FaceDetector;

/// What the host can do, probed once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    /// ffmpeg is on PATH.
    pub ffmpeg: bool,

    /// ffprobe is on PATH.
    pub ffprobe: bool,

    /// ffmpeg was built with libass (`ass` filter).
    pub ass_filter: bool,

    /// ffmpeg was built with freetype (`drawtext` filter).
    pub drawtext_filter: bool,
}

impl CapabilityReport {
    /// Both tools needed for composition are present.
    pub fn can_compose(&self) -> bool {
        self.ffmpeg && self.ffprobe
    }
}

/// Abstract interface for host capture capabilities.
pub trait CaptureCapabilities: Send + Sync {
    /// Provider name for logs and `clipveil check`.
    fn name(&self) -> &'static str;

    fn report(&self) -> &CapabilityReport;

    /// Face detector used for frames submitted without geometry.
    fn face_detector(&self) -> Box<dyn FaceDetector>;
}

pub mod native;
pub mod simulated;

pub use native::NativeCapabilities;
pub use simulated::SimulatedCapabilities;

/// Probe the host and pick a capability provider.
pub fn detect_capabilities(composition: &CompositionDefaults) -> Box<dyn CaptureCapabilities> {
    let report = probe_host(&composition.ffmpeg, &composition.ffprobe);
    select_capabilities(report)
}

/// Choose a provider for an already probed host.
pub fn select_capabilities(report: CapabilityReport) -> Box<dyn CaptureCapabilities> {
    let provider: Box<dyn CaptureCapabilities> = if report.can_compose() {
        Box::new(NativeCapabilities::new(report))
    } else {
        Box::new(SimulatedCapabilities::new(report))
    };
    tracing::info!(
        provider = provider.name(),
        ffmpeg = provider.report().ffmpeg,
        ffprobe = provider.report().ffprobe,
        ass = provider.report().ass_filter,
        drawtext = provider.report().drawtext_filter,
        "Selected capture capabilities"
    );
    provider
}

/// Run the tools once and record what is available.
pub fn probe_host(ffmpeg: &str, ffprobe: &str) -> CapabilityReport {
    let ffprobe_ok = tool_runs(ffprobe);
    let filters = Command::new(ffmpeg)
        .args(["-hide_banner", "-filters"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned());

    match filters {
        Some(listing) => {
            let names = parse_filter_names(&listing);
            CapabilityReport {
                ffmpeg: true,
                ffprobe: ffprobe_ok,
                ass_filter: names.iter().any(|n| n == "ass"),
                drawtext_filter: names.iter().any(|n| n == "drawtext"),
            }
        }
        None => CapabilityReport {
            ffprobe: ffprobe_ok,
            ..CapabilityReport::default()
        },
    }
}

fn tool_runs(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Filter names from `ffmpeg -filters` output.
///
/// Rows look like ` T.C drawtext          V->V       Draw text ...`; the
/// header block above the `------` separator is skipped.
pub fn parse_filter_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _flags = cols.next()?;
            cols.next().map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Filters:
  T.. = Timeline support
  .S. = Slice threading
  ..C = Command support
  A = Audio input/output
  ------
 ... abench            A->A       Benchmark part of a filtergraph.
 ... ass               V->V       Render ASS subtitles onto input video using the libass library.
 T.C drawtext          V->V       Draw text on top of video frames using libfreetype library.
 ... overlay           VV->V      Overlay a video source on top of the input.
";

    #[test]
    fn test_parse_filter_names_skips_legend() {
        let names = parse_filter_names(LISTING);
        assert_eq!(names, vec!["abench", "ass", "drawtext", "overlay"]);
    }

    #[test]
    fn test_missing_tools_select_simulated() {
        let provider = select_capabilities(CapabilityReport::default());
        assert_eq!(provider.name(), "simulated");
        assert_eq!(provider.face_detector().name(), "simulated");
    }

    #[test]
    fn test_full_toolchain_selects_native() {
        let provider = select_capabilities(CapabilityReport {
            ffmpeg: true,
            ffprobe: true,
            ass_filter: true,
            drawtext_filter: true,
        });
        assert_eq!(provider.name(), "native");
        assert_eq!(provider.face_detector().name(), "external");
    }

    #[test]
    fn test_probe_with_missing_binaries() {
        let report = probe_host(
            "/nonexistent/clipveil-ffmpeg",
            "/nonexistent/clipveil-ffprobe",
        );
        assert_eq!(report, CapabilityReport::default());
        assert!(!report.can_compose());
    }
}
