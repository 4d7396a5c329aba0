//! Durable task list, rewritten atomically on every change.

use std::path::{Path, PathBuf};

use crate::task::{UploadState, UploadTask};
use crate::UploadError;

/// JSON file holding the non-terminal upload tasks.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted tasks. A task left `uploading` by a previous run is
    /// back to `queued`; terminal tasks are dropped.
    pub fn load(&self) -> Result<Vec<UploadTask>, UploadError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut tasks: Vec<UploadTask> = serde_json::from_str(&content)?;
        tasks.retain(|t| matches!(t.state, UploadState::Queued | UploadState::Uploading));
        for task in &mut tasks {
            if task.state == UploadState::Uploading {
                tracing::info!(task_id = %task.id, "Resetting interrupted upload");
                task.state = UploadState::Queued;
            }
        }
        Ok(tasks)
    }

    /// Replace the file contents: write a temp sibling, then rename.
    pub fn save(&self, tasks: &[UploadTask]) -> Result<(), UploadError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(tasks)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
