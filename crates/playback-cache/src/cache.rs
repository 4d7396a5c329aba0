//! The playback cache service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use clipveil_common::config::AppConfig;
use clipveil_storage::{RemoteStore, StoreError};

use crate::lru::{CacheEntry, SizedLru};
use crate::CacheError;

const MANIFEST: &str = "index.json";

/// Counters since the cache was opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub total_bytes: u64,
    pub cap_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    key: String,
    file: String,
}

type Flight = Arc<OnceCell<Result<PathBuf, CacheError>>>;

enum Lookup {
    Hit(PathBuf),
    /// Indexed, but the file is gone; the entry was dropped.
    Vanished,
    Absent,
}

/// LRU cache mapping remote video keys to local files.
pub struct PlaybackCache {
    dir: PathBuf,
    remote: Arc<dyn RemoteStore>,
    index: Mutex<SizedLru>,
    flights: Mutex<HashMap<String, Flight>>,
    /// Orders manifest writes; held across the snapshot and the write.
    manifest_writer: tokio::sync::Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PlaybackCache {
    /// Open `dir`, restoring entries from a previous run. Recency of
    /// restored entries follows file modification time; files the index
    /// does not know are removed.
    pub fn open(
        dir: impl Into<PathBuf>,
        cap_bytes: u64,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut lru = SizedLru::new(cap_bytes);
        let mut restored = restore_entries(&dir)?;
        restored.sort_by_key(|e| e.last_accessed_at);
        let known: Vec<PathBuf> = restored.iter().map(|e| e.local_path.clone()).collect();
        for entry in restored {
            lru.restore(entry);
        }
        let overflow = lru.trim();

        remove_orphans(&dir, &known);
        for entry in &overflow {
            remove_file_quietly(&entry.local_path);
        }

        let cache = Self {
            dir,
            remote,
            index: Mutex::new(lru),
            flights: Mutex::new(HashMap::new()),
            manifest_writer: tokio::sync::Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(overflow.len() as u64),
        };
        {
            let index = cache.lock_index();
            if let Err(e) = write_manifest_blocking(&cache.dir, &manifest_entries(&index)) {
                tracing::warn!(error = %e, "Failed to write playback cache index");
            }
            tracing::info!(
                dir = %cache.dir.display(),
                entries = index.len(),
                total_bytes = index.total_bytes(),
                cap_bytes,
                "Opened playback cache"
            );
        }
        Ok(cache)
    }

    pub fn from_app_config(
        config: &AppConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, CacheError> {
        Self::open(config.cache_dir(), config.cache.cap_bytes, remote)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path for `key`, fetching it on a miss. Concurrent misses for
    /// one key share a single fetch.
    pub async fn get(&self, key: &str) -> Result<PathBuf, CacheError> {
        let (flight, vanished) = {
            // Under the flights lock; a fetch that just finished is a hit.
            let mut flights = self.lock_flights();
            let vanished = match self.lookup(key) {
                Lookup::Hit(path) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, "Playback cache hit");
                    return Ok(path);
                }
                Lookup::Vanished => true,
                Lookup::Absent => false,
            };
            (flights.entry(key.to_string()).or_default().clone(), vanished)
        };
        if vanished {
            self.save_manifest().await;
        }
        let result = flight.get_or_init(|| self.fetch(key)).await.clone();

        let mut flights = self.lock_flights();
        if flights.get(key).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
            flights.remove(key);
        }
        result
    }

    /// Current entry for `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.lock_index().peek(key).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.lock_index();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: index.len(),
            total_bytes: index.total_bytes(),
            cap_bytes: index.cap_bytes(),
        }
    }

    /// Entries from least to most recently used.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.lock_index().iter_lru().cloned().collect()
    }

    /// Drop every entry and its file.
    pub async fn clear(&self) {
        let drained = self.lock_index().drain();
        self.save_manifest().await;
        for entry in &drained {
            remove_cached_file(&entry.local_path).await;
        }
        tracing::info!(removed = drained.len(), "Cleared playback cache");
    }

    /// A hit whose file vanished is dropped and reported as a miss.
    fn lookup(&self, key: &str) -> Lookup {
        let Some(path) = self.lock_index().touch(key).map(|e| e.local_path.clone()) else {
            return Lookup::Absent;
        };
        if path.is_file() {
            return Lookup::Hit(path);
        }
        tracing::warn!(key, path = %path.display(), "Cached file vanished");
        self.lock_index().remove(key);
        Lookup::Vanished
    }

    async fn fetch(&self, key: &str) -> Result<PathBuf, CacheError> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let dest = self.dir.join(file_name_for(key));
        tracing::debug!(key, dest = %dest.display(), "Playback cache miss");

        let size = self.remote.get(key, &dest).await.map_err(|e| match e {
            StoreError::NotFound(k) => CacheError::NotFound(k),
            other => CacheError::Fetch(other.to_string()),
        })?;

        let entry = CacheEntry {
            key: key.to_string(),
            local_path: dest.clone(),
            size_bytes: size,
            last_accessed_at: Utc::now(),
        };

        // Victims are chosen under the lock; files go after it is released.
        let outcome = self.lock_index().insert(entry);
        self.save_manifest().await;

        let mut evicted = 0u64;
        for victim in &outcome.evicted {
            if victim.local_path != dest {
                remove_cached_file(&victim.local_path).await;
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            tracing::debug!(key, evicted, "Evicted playback cache entries");
        }
        if outcome.rejected {
            tracing::warn!(key, size, "Video exceeds the cache cap; served uncached");
        }
        Ok(dest)
    }

    fn lock_index(&self) -> MutexGuard<'_, SizedLru> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_flights(&self) -> MutexGuard<'_, HashMap<String, Flight>> {
        self.flights.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rewrite the manifest (temp file, then rename). The index is only
    /// locked while it is copied; the write happens after.
    async fn save_manifest(&self) {
        let _writer = self.manifest_writer.lock().await;
        let manifest = manifest_entries(&self.lock_index());
        let path = self.dir.join(MANIFEST);
        let tmp = self.dir.join(format!("{MANIFEST}.tmp"));
        let result = async {
            let json = serde_json::to_vec_pretty(&manifest).map_err(std::io::Error::other)?;
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write playback cache index");
        }
    }
}

fn manifest_entries(index: &SizedLru) -> Vec<ManifestEntry> {
    index
        .iter_lru()
        .filter_map(|e| {
            Some(ManifestEntry {
                key: e.key.clone(),
                file: e.local_path.file_name()?.to_string_lossy().into_owned(),
            })
        })
        .collect()
}

fn write_manifest_blocking(dir: &Path, manifest: &[ManifestEntry]) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(manifest).map_err(std::io::Error::other)?;
    let tmp = dir.join(format!("{MANIFEST}.tmp"));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, dir.join(MANIFEST))
}

/// Cache file name: hex SHA-256 of the key, keeping its extension.
pub fn file_name_for(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    if let Some(ext) = Path::new(key).extension().and_then(|e| e.to_str()) {
        if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            name.push('.');
            name.push_str(ext);
        }
    }
    name
}

fn restore_entries(dir: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    let manifest_path = dir.join(MANIFEST);
    let manifest: Vec<ManifestEntry> = match std::fs::read_to_string(&manifest_path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Playback cache index is corrupt; starting empty");
                Vec::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for item in manifest {
        // Names that do not match the key were not written by this cache.
        if item.file != file_name_for(&item.key) {
            continue;
        }
        let path = dir.join(&item.file);
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        entries.push(CacheEntry {
            key: item.key,
            local_path: path,
            size_bytes: meta.len(),
            last_accessed_at: modified,
        });
    }
    Ok(entries)
}

fn remove_orphans(dir: &Path, known: &[PathBuf]) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        let is_manifest = path.file_name().is_some_and(|n| n == MANIFEST);
        if path.is_file() && !is_manifest && !known.contains(&path) {
            tracing::debug!(path = %path.display(), "Removing orphaned cache file");
            remove_file_quietly(&path);
        }
    }
}

async fn remove_cached_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}
