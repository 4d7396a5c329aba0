//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ClipveilResult;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for exports, queue state, and the playback cache.
    pub data_dir: PathBuf,

    /// Capture-time anonymization settings.
    #[serde(default)]
    pub capture: CaptureDefaults,

    /// Post-capture composition settings.
    #[serde(default)]
    pub composition: CompositionDefaults,

    /// Upload queue settings.
    #[serde(default)]
    pub upload: UploadDefaults,

    /// Playback cache settings.
    #[serde(default)]
    pub cache: CacheDefaults,

    /// Remote storage collaborator settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Target capture frame rate; sets the per-frame time budget.
    pub fps: u32,

    /// Whether faces are blurred during capture.
    pub anonymize: bool,

    /// Blur style: "gaussian" or "pixelate".
    pub blur_style: String,

    /// Gaussian sigma in pixels.
    pub blur_sigma: f32,

    /// Pixelation block size in pixels.
    pub pixelate_block: u32,

    /// Fallback ellipse padding as a fraction of the larger box side.
    pub padding_fraction: f64,
}

/// Default composition parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionDefaults {
    /// ffmpeg binary name or path.
    pub ffmpeg: String,

    /// ffprobe binary name or path.
    pub ffprobe: String,

    /// Extra attempts for transient export failures.
    pub max_export_retries: u32,

    /// Caption font size as a fraction of the render height.
    pub caption_font_scale: f64,
}

/// Default upload queue parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDefaults {
    /// Number of simultaneous uploads.
    pub max_concurrent_uploads: usize,

    /// Transient failures tolerated before a task is terminal-failed.
    pub max_retries: u32,

    /// First backoff delay in milliseconds.
    pub backoff_initial_ms: u64,

    /// Backoff ceiling in milliseconds.
    pub backoff_max_ms: u64,

    /// Backoff growth factor.
    pub backoff_multiplier: f64,

    /// Persisted task list, relative to `data_dir` unless absolute.
    pub state_file: PathBuf,
}

/// Default playback cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDefaults {
    /// Cache directory, relative to `data_dir` unless absolute.
    pub dir: PathBuf,

    /// Total size cap in bytes.
    pub cap_bytes: u64,
}

/// Remote storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local directory acting as the bucket (used when no URL is set).
    pub bucket_dir: Option<PathBuf>,

    /// Base URL of an HTTP object store (`PUT`/`GET {base_url}/{key}`).
    pub base_url: Option<String>,

    /// Connect and idle-read timeout in seconds for the HTTP store. Whole
    /// transfers are not time-limited.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipveil=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs_default_data(),
            capture: CaptureDefaults::default(),
            composition: CompositionDefaults::default(),
            upload: UploadDefaults::default(),
            cache: CacheDefaults::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            anonymize: true,
            blur_style: "gaussian".to_string(),
            blur_sigma: 12.0,
            pixelate_block: 16,
            padding_fraction: 0.15,
        }
    }
}

impl Default for CompositionDefaults {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            max_export_retries: 2,
            caption_font_scale: 0.045,
        }
    }
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 2,
            max_retries: 5,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_multiplier: 2.0,
            state_file: PathBuf::from("uploads.json"),
        }
    }
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("playback-cache"),
            cap_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_dir: None,
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> ClipveilResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> ClipveilResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, json)?;
        Ok(())
    }

    /// Standard config file location.
    pub fn default_path() -> PathBuf {
        config_file_path()
    }

    /// Absolute path of the persisted upload task list.
    pub fn upload_state_path(&self) -> PathBuf {
        self.resolve(&self.upload.state_file)
    }

    /// Absolute path of the playback cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.cache.dir)
    }

    /// Directory where composed exports are written.
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipveil").join("config.json")
}

/// Default data directory.
fn dirs_default_data() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("clipveil")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.capture.fps, 30);
        assert!(config.capture.anonymize);
        assert_eq!(config.upload.max_concurrent_uploads, 2);
        assert!(config.upload.backoff_initial_ms <= config.upload.backoff_max_ms);
    }

    #[test]
    fn test_relative_paths_resolve_under_data_dir() {
        let mut config = AppConfig::default();
        config.data_dir = PathBuf::from("/var/clipveil");
        assert_eq!(
            config.upload_state_path(),
            PathBuf::from("/var/clipveil/uploads.json")
        );
        config.cache.dir = PathBuf::from("/mnt/cache");
        assert_eq!(config.cache_dir(), PathBuf::from("/mnt/cache"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.upload.max_retries = 9;
        config.storage.base_url = Some("https://media.example.com".to_string());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.upload.max_retries, 9);
        assert_eq!(
            loaded.storage.base_url.as_deref(),
            Some("https://media.example.com")
        );
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.capture.fps, CaptureDefaults::default().fps);
    }

    #[test]
    fn test_partial_config_fills_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "data_dir": "/srv/clipveil" }"#).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.data_dir, PathBuf::from("/srv/clipveil"));
        assert_eq!(loaded.cache.cap_bytes, CacheDefaults::default().cap_bytes);
        assert_eq!(loaded.storage.request_timeout_secs, 30);
    }
}
