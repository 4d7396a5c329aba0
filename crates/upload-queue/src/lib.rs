//! Clipveil Upload Queue
//!
//! Durably schedules uploads of finished exports and retries them until
//! they succeed or fail permanently:
//! - Tasks are persisted before `enqueue` returns and survive restarts
//! - Bounded concurrency, one attempt per task at a time
//! - Exponential backoff for transient failures, bounded retry count
//! - Paused while offline; resumed immediately when connectivity returns

pub mod backoff;
pub mod events;
pub mod queue;
pub mod store;
pub mod task;

pub use backoff::BackoffPolicy;
pub use events::{TracingObserver, UploadErrorKind, UploadObserver};
pub use queue::{QueueConfig, UploadQueue};
pub use store::TaskStore;
pub use task::{destination_key, TaskId, UploadState, UploadTask};

/// Upload queue errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid destination key {0:?}")]
    InvalidKey(String),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("queue state I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue state is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}
