//! HTTP object store: `PUT`/`GET {base_url}/{key}`.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{partial_path, validate_key, ProgressFn, RemoteStore, StoreError};

/// Object store reached over plain HTTP.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// `timeout` bounds connecting and each wait for the next read. Whole
    /// transfers are not capped, so large videos on slow links still finish.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .read_timeout(timeout)
            .build()
            .map_err(|e| StoreError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn object_url(&self, key: &str) -> Result<String, StoreError> {
        validate_key(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn put(&self, key: &str, local: &Path, progress: ProgressFn) -> Result<u64, StoreError> {
        let url = self.object_url(key)?;
        let file = tokio::fs::File::open(local).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                StoreError::Permanent(format!("local file missing: {}", local.display()))
            }
            _ => StoreError::Transient(format!("open {}: {e}", local.display())),
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| StoreError::Transient(format!("stat {}: {e}", local.display())))?
            .len();

        let sent = Arc::new(AtomicU64::new(0));
        let counter = sent.clone();
        let body = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                let total = counter.fetch_add(bytes.len() as u64, Ordering::Relaxed)
                    + bytes.len() as u64;
                progress(total);
            }
            chunk
        });

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, key));
        }
        tracing::debug!(key, bytes = size, status = status.as_u16(), "Uploaded object");
        Ok(sent.load(Ordering::Relaxed).max(size))
    }

    async fn get(&self, key: &str, dest: &Path) -> Result<u64, StoreError> {
        let url = self.object_url(key)?;
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, key));
        }

        let transient = |what: &str, e: std::io::Error| StoreError::Transient(format!("{what}: {e}"));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transient("create dir", e))?;
        }
        let partial = partial_path(dest);
        let mut out = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| transient("create", e))?;

        let mut total = 0u64;
        let mut stream = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(request_error(e));
                }
            };
            if let Err(e) = out.write_all(&bytes).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(transient("write", e));
            }
            total += bytes.len() as u64;
        }
        out.flush().await.map_err(|e| transient("flush", e))?;
        drop(out);
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| transient("rename", e))?;
        Ok(total)
    }
}

/// Transport-level failures (connect, timeout, broken body) are transient.
fn request_error(e: reqwest::Error) -> StoreError {
    if e.is_builder() {
        return StoreError::Permanent(format!("invalid request: {e}"));
    }
    StoreError::Transient(format!("request failed: {e}"))
}

/// 404 is NotFound, 408/429 and 5xx are transient, other 4xx permanent.
pub fn status_error(status: StatusCode, key: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(key.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transient(format!("HTTP {status} for {key}"))
        }
        s if s.is_server_error() => StoreError::Transient(format!("HTTP {s} for {key}")),
        s => StoreError::Permanent(format!("HTTP {s} for {key}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "k"),
            StoreError::NotFound("k".into())
        );
        assert!(status_error(StatusCode::BAD_GATEWAY, "k").is_transient());
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "k").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "k").is_transient());
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "k"),
            StoreError::Permanent(_)
        ));
        assert!(matches!(
            status_error(StatusCode::PAYLOAD_TOO_LARGE, "k"),
            StoreError::Permanent(_)
        ));
    }

    #[test]
    fn test_object_url() {
        let store = HttpRemoteStore::new("http://host/videos/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.object_url("u1/a.mp4").unwrap(),
            "http://host/videos/u1/a.mp4"
        );
        assert!(store.object_url("../a.mp4").is_err());
    }

    /// Serve one response whose body arrives in slow chunks.
    async fn trickle_server(chunks: usize, gap: Duration) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n", chunks * 16);
            socket.write_all(head.as_bytes()).await.unwrap();
            for _ in 0..chunks {
                tokio::time::sleep(gap).await;
                if socket.write_all(&[7u8; 16]).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_slow_download_longer_than_timeout_completes() {
        // Total transfer ~750ms against a 400ms timeout; each gap is shorter.
        let base = trickle_server(5, Duration::from_millis(150)).await;
        let store = HttpRemoteStore::new(base, Duration::from_millis(400)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");

        let size = store.get("u1/clip.mp4", &dest).await.unwrap();
        assert_eq!(size, 80);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 80);
    }

    #[tokio::test]
    async fn test_stalled_download_times_out_as_transient() {
        let base = trickle_server(2, Duration::from_millis(1500)).await;
        let store = HttpRemoteStore::new(base, Duration::from_millis(200)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");

        let err = store.get("u1/clip.mp4", &dest).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_permanent_before_any_request() {
        let store = HttpRemoteStore::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = store
            .put("u1/a.mp4", Path::new("/nonexistent/clip.mp4"), Arc::new(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("clip.mp4");
        std::fs::write(&local, b"data").unwrap();

        // Port 9 (discard) is closed on test hosts; the connect is refused.
        let store = HttpRemoteStore::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = store
            .put("u1/a.mp4", &local, Arc::new(|_| {}))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}
