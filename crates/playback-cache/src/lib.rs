//! Clipveil Playback Cache
//!
//! Keeps recently watched remote videos on local disk so replays skip the
//! network. Entries are evicted least recently used first once the total
//! size passes the configured cap. Concurrent requests for the same key
//! share one download.

pub mod cache;
pub mod lru;

use std::sync::Arc;

pub use cache::{file_name_for, CacheStats, PlaybackCache};
pub use lru::{CacheEntry, InsertOutcome, SizedLru};

/// Playback cache errors. Cloneable so one fetch result can be handed to
/// every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("video {0:?} does not exist remotely")]
    NotFound(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("cache I/O: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}
