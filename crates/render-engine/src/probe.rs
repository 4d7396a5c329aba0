//! Source inspection via ffprobe.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use clipveil_media_model::Rotation;

/// What composition needs to know about a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Encoded width of the first video stream.
    pub width: u32,

    /// Encoded height of the first video stream.
    pub height: u32,

    /// Rotation needed to display the video upright.
    pub rotation: Rotation,

    /// Container duration in seconds (0.0 when unknown).
    pub duration_secs: f64,

    pub video_streams: usize,
    pub audio_streams: usize,

    /// Duration of the first audio stream, if any.
    pub audio_duration_secs: Option<f64>,
}

impl SourceInfo {
    /// Rotation-corrected size used for overlay composition.
    pub fn render_size(&self) -> (u32, u32) {
        self.rotation.corrected_size(self.width, self.height)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_streams > 0
    }
}

/// Probe failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("source not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to run ffprobe: {0}")]
    Spawn(String),

    #[error("ffprobe rejected the file: {0}")]
    Unreadable(String),

    #[error("source has no video stream")]
    NoVideo,

    #[error("malformed ffprobe output: {0}")]
    Malformed(String),
}

/// Reads stream metadata from media files.
#[async_trait::async_trait]
pub trait SourceProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<SourceInfo, ProbeError>;
}

/// [`SourceProber`] backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: String,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait::async_trait]
impl SourceProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<SourceInfo, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::NotFound(path.to_path_buf()));
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Spawn(format!("{}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ProbeError::Unreadable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(&json)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            rotation = %info.rotation,
            duration_secs = info.duration_secs,
            audio_streams = info.audio_streams,
            "Probed source"
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    disposition: Option<Disposition>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &str) -> Result<SourceInfo, ProbeError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::Malformed(e.to_string()))?;

    // Cover art shows up as a video stream; it is not the clip.
    let videos: Vec<&ProbeStream> = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .filter(|s| s.disposition.as_ref().map_or(true, |d| d.attached_pic == 0))
        .collect();
    let audios: Vec<&ProbeStream> = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .collect();

    let video = videos.first().ok_or(ProbeError::NoVideo)?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ProbeError::Malformed("video stream without dimensions".into())),
    };

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| parse_secs(f.duration.as_deref()))
        .or_else(|| parse_secs(video.duration.as_deref()))
        .unwrap_or(0.0);

    Ok(SourceInfo {
        width,
        height,
        rotation: stream_rotation(video)?,
        duration_secs,
        video_streams: videos.len(),
        audio_streams: audios.len(),
        audio_duration_secs: audios.first().and_then(|a| parse_secs(a.duration.as_deref())),
    })
}

/// Display-matrix side data wins over the legacy `rotate` tag. The matrix
/// angle is counter-clockwise, the tag clockwise.
fn stream_rotation(stream: &ProbeStream) -> Result<Rotation, ProbeError> {
    let from_matrix = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .map(|ccw| -(ccw.round() as i64));
    let from_tag = stream
        .tags
        .as_ref()
        .and_then(|t| t.rotate.as_deref())
        .and_then(|r| r.trim().parse::<i64>().ok());

    match from_matrix.or(from_tag) {
        Some(deg) => Rotation::from_degrees(deg)
            .map_err(|e| ProbeError::Malformed(e.to_string())),
        None => Ok(Rotation::Deg0),
    }
}

fn parse_secs(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT_PHONE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "width": 1920, "height": 1080,
             "duration": "10.000000",
             "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]},
            {"index": 1, "codec_type": "audio", "duration": "9.984000"}
        ],
        "format": {"duration": "10.010000"}
    }"#;

    #[test]
    fn test_display_matrix_rotation() {
        let info = parse_probe_output(PORTRAIT_PHONE).unwrap();
        assert_eq!(info.rotation, Rotation::Deg90);
        assert_eq!(info.render_size(), (1080, 1920));
        assert!((info.duration_secs - 10.01).abs() < 1e-9);
        assert_eq!(info.audio_duration_secs, Some(9.984));
        assert!(info.has_audio());
    }

    #[test]
    fn test_legacy_rotate_tag() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 1280, "height": 720,
                        "tags": {"rotate": "270"}}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, Rotation::Deg270);
        assert_eq!(info.render_size(), (720, 1280));
        assert!(!info.has_audio());
        assert_eq!(info.duration_secs, 0.0);
    }

    #[test]
    fn test_upside_down_keeps_raw_size() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                        "side_data_list": [{"rotation": 180}]}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, Rotation::Deg180);
        assert_eq!(info.render_size(), (1920, 1080));
    }

    #[test]
    fn test_audio_only_has_no_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(parse_probe_output(json), Err(ProbeError::NoVideo)));
    }

    #[test]
    fn test_cover_art_is_not_video() {
        let json = r#"{"streams": [
            {"codec_type": "audio"},
            {"codec_type": "video", "width": 600, "height": 600,
             "disposition": {"attached_pic": 1}}
        ]}"#;
        assert!(matches!(parse_probe_output(json), Err(ProbeError::NoVideo)));
    }

    #[test]
    fn test_odd_rotation_is_malformed() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 10, "height": 10,
                        "tags": {"rotate": "45"}}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = FfprobeProber::default()
            .probe(Path::new("/nonexistent/clipveil/source.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::NotFound(_)));
    }
}
