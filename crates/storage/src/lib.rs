//! Clipveil Storage
//!
//! The remote object store that finished exports are uploaded to and the
//! playback cache reads from. Two implementations:
//! - [`FsRemoteStore`]: a local directory acting as the bucket
//! - [`HttpRemoteStore`]: `PUT`/`GET {base_url}/{key}` over HTTP
//!
//! Every failure is classified so callers can decide whether to retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clipveil_common::config::AppConfig;

pub mod fs;
pub mod http;

pub use fs::FsRemoteStore;
pub use http::HttpRemoteStore;

/// Cumulative bytes sent so far.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Classified storage failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network unreachable, timeout, server error. Worth retrying.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Rejected request or unusable local file. Retrying cannot help.
    #[error("permanent storage failure: {0}")]
    Permanent(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Remote object storage.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store name for logs.
    fn name(&self) -> &'static str;

    /// Upload `local` under `key`, reporting cumulative bytes sent.
    /// Returns the number of bytes stored.
    async fn put(&self, key: &str, local: &Path, progress: ProgressFn) -> Result<u64, StoreError>;

    /// Download `key` to `dest`. `dest` only appears once complete.
    async fn get(&self, key: &str, dest: &Path) -> Result<u64, StoreError>;
}

/// Build the store described by `config.storage`: HTTP when a base URL is
/// set, otherwise a directory bucket (default `{data_dir}/bucket`).
pub fn remote_from_config(config: &AppConfig) -> Result<Arc<dyn RemoteStore>, StoreError> {
    let storage = &config.storage;
    match &storage.base_url {
        Some(url) => {
            let timeout = Duration::from_secs(storage.request_timeout_secs.max(1));
            Ok(Arc::new(HttpRemoteStore::new(url.clone(), timeout)?))
        }
        None => {
            let dir = storage
                .bucket_dir
                .clone()
                .unwrap_or_else(|| config.data_dir.join("bucket"));
            Ok(Arc::new(FsRemoteStore::new(dir)))
        }
    }
}

/// Keys are relative slash-separated paths of `[A-Za-z0-9._-]` segments.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    let ok = !key.is_empty()
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && seg.chars().all(valid_char));
    if ok {
        Ok(())
    } else {
        Err(StoreError::Permanent(format!("invalid object key {key:?}")))
    }
}

/// Sibling path used while a file is being written.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("user-1/0b6c.mp4").is_ok());
        assert!(validate_key("a/b/c_d.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs.mp4").is_err());
        assert!(validate_key("a/../b.mp4").is_err());
        assert!(validate_key("a//b.mp4").is_err());
        assert!(validate_key("spaces here.mp4").is_err());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/x/clip.mp4")),
            PathBuf::from("/tmp/x/clip.mp4.part")
        );
    }

    #[test]
    fn test_config_without_url_uses_bucket_dir() {
        let mut config = AppConfig::default();
        config.storage.bucket_dir = Some(PathBuf::from("/tmp/clipveil-bucket"));
        let store = remote_from_config(&config).unwrap();
        assert_eq!(store.name(), "fs");
    }

    #[test]
    fn test_config_with_url_uses_http() {
        let mut config = AppConfig::default();
        config.storage.base_url = Some("http://127.0.0.1:9/videos".into());
        let store = remote_from_config(&config).unwrap();
        assert_eq!(store.name(), "http");
    }
}
