//! Observer callbacks for upload progress and terminal outcomes.

use serde::Serialize;

use crate::task::TaskId;

/// Why a task ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorKind {
    /// Rejected by the store or the local file is unusable.
    Permanent,

    /// Transient failures exceeded the retry limit.
    RetriesExhausted,
}

/// Receives upload events. Transient retries are not reported.
///
/// Callbacks run on the queue's worker tasks and must not block.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, _task: TaskId, _bytes_sent: u64) {}

    fn on_complete(&self, task: TaskId);

    fn on_error(&self, task: TaskId, kind: UploadErrorKind);
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_progress(&self, task: TaskId, bytes_sent: u64) {
        tracing::trace!(task_id = %task, bytes_sent, "Upload progress");
    }

    fn on_complete(&self, task: TaskId) {
        tracing::info!(task_id = %task, "Upload complete");
    }

    fn on_error(&self, task: TaskId, kind: UploadErrorKind) {
        tracing::warn!(task_id = %task, kind = ?kind, "Upload failed");
    }
}
