//! Directory-backed bucket.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{partial_path, validate_key, ProgressFn, RemoteStore, StoreError};

const CHUNK: usize = 64 * 1024;

/// Stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsRemoteStore {
    root: PathBuf,
}

impl FsRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `key` lives on disk.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait::async_trait]
impl RemoteStore for FsRemoteStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn put(&self, key: &str, local: &Path, progress: ProgressFn) -> Result<u64, StoreError> {
        let dest = self.object_path(key)?;
        let source = tokio::fs::File::open(local).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                StoreError::Permanent(format!("local file missing: {}", local.display()))
            }
            _ => StoreError::Transient(format!("open {}: {e}", local.display())),
        })?;

        let written = copy_atomically(source, &dest, Some(&progress)).await?;
        tracing::debug!(key, bytes = written, "Stored object");
        Ok(written)
    }

    async fn get(&self, key: &str, dest: &Path) -> Result<u64, StoreError> {
        let object = self.object_path(key)?;
        let source = tokio::fs::File::open(&object).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Transient(format!("open {}: {e}", object.display())),
        })?;
        copy_atomically(source, dest, None).await
    }
}

/// Copy into `dest` through a `.part` sibling that is renamed on success.
async fn copy_atomically(
    mut source: tokio::fs::File,
    dest: &Path,
    progress: Option<&ProgressFn>,
) -> Result<u64, StoreError> {
    let transient = |what: &str, e: std::io::Error| StoreError::Transient(format!("{what}: {e}"));

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| transient("create bucket dir", e))?;
    }
    let partial = partial_path(dest);
    let mut out = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| transient("create", e))?;

    let result: Result<u64, StoreError> = async {
        let mut buf = vec![0u8; CHUNK];
        let mut total = 0u64;
        loop {
            let n = source.read(&mut buf).await.map_err(|e| transient("read", e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .await
                .map_err(|e| transient("write", e))?;
            total += n as u64;
            if let Some(cb) = progress {
                cb(total);
            }
        }
        out.flush().await.map_err(|e| transient("flush", e))?;
        out.sync_all().await.map_err(|e| transient("sync", e))?;
        Ok(total)
    }
    .await;

    match result {
        Ok(total) => {
            tokio::fs::rename(&partial, dest)
                .await
                .map_err(|e| transient("rename", e))?;
            Ok(total)
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(err)
        }
    }
}
