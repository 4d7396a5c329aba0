//! Upload task records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Queued,
    Uploading,
    Done,
    Failed,
}

/// One finished export waiting to reach remote storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: TaskId,
    pub local_path: PathBuf,
    pub destination_key: String,
    pub state: UploadState,

    /// Transient failures so far. Never decreases.
    pub retry_count: u32,

    /// Earliest time the next attempt may start; `None` means now.
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub enqueued_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(local_path: impl Into<PathBuf>, destination_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_path: local_path.into(),
            destination_key: destination_key.into(),
            state: UploadState::Queued,
            retry_count: 0,
            next_attempt_at: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Queued and past its backoff.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == UploadState::Queued && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

/// Destination key for a new upload owned by `user_id`.
pub fn destination_key(user_id: &str) -> String {
    format!("{}/{}.mp4", user_id, Uuid::new_v4())
}
