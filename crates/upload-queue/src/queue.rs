//! The upload queue service.
//!
//! One dispatcher task owns scheduling. It wakes on enqueue, connectivity
//! restored, app foreground, a task finishing, and the earliest backoff
//! deadline; it never polls.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use clipveil_common::config::AppConfig;
use clipveil_storage::{validate_key, ProgressFn, RemoteStore, StoreError};

use crate::backoff::BackoffPolicy;
use crate::events::{UploadErrorKind, UploadObserver};
use crate::store::TaskStore;
use crate::task::{TaskId, UploadState, UploadTask};
use crate::UploadError;

/// Upload queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent_uploads: usize,

    /// Transient failures tolerated; one more makes the task terminal.
    pub max_retries: u32,

    pub backoff: BackoffPolicy,

    pub state_path: PathBuf,
}

impl QueueConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_uploads: config.upload.max_concurrent_uploads.max(1),
            max_retries: config.upload.max_retries,
            backoff: BackoffPolicy::from_defaults(&config.upload),
            state_path: config.upload_state_path(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Active tasks in enqueue order.
    tasks: Vec<UploadTask>,

    /// Tasks with an attempt running.
    in_flight: HashSet<TaskId>,

    /// Terminal failures kept in memory for manual retry.
    failed: HashMap<TaskId, UploadTask>,
}

struct Inner {
    config: QueueConfig,
    store: TaskStore,
    remote: Arc<dyn RemoteStore>,
    observer: Arc<dyn UploadObserver>,
    state: Mutex<QueueState>,
    wake: Notify,
    idle: Notify,
    online: AtomicBool,
    shutdown: CancellationToken,
    slots: Arc<Semaphore>,
}

/// Durable upload queue with bounded concurrency.
pub struct UploadQueue {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UploadQueue {
    /// Load persisted tasks. Nothing is uploaded until [`start`](Self::start).
    pub fn open(
        config: QueueConfig,
        remote: Arc<dyn RemoteStore>,
        observer: Arc<dyn UploadObserver>,
    ) -> Result<Self, UploadError> {
        let store = TaskStore::new(config.state_path.clone());
        let tasks = store.load()?;
        tracing::info!(
            state_file = %store.path().display(),
            restored = tasks.len(),
            remote = remote.name(),
            "Opened upload queue"
        );
        let slots = Arc::new(Semaphore::new(config.max_concurrent_uploads.max(1)));
        let inner = Inner {
            config,
            store,
            remote,
            observer,
            state: Mutex::new(QueueState {
                tasks,
                ..QueueState::default()
            }),
            wake: Notify::new(),
            idle: Notify::new(),
            online: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            slots,
        };
        // Restored tasks were persisted as queued by `load`.
        inner.persist(&inner.lock());
        Ok(Self {
            inner: Arc::new(inner),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the dispatcher. Calling it twice has no effect.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_none() {
            let inner = self.inner.clone();
            *worker = Some(tokio::spawn(async move { inner.run().await }));
        }
    }

    /// Stop dispatching and wait for in-flight uploads to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Upload dispatcher ended abnormally");
            }
        }
        tracing::info!("Upload queue stopped");
    }

    /// Persist a new task and wake the dispatcher.
    pub fn enqueue(
        &self,
        local_path: impl Into<PathBuf>,
        destination_key: impl Into<String>,
    ) -> Result<TaskId, UploadError> {
        let destination_key = destination_key.into();
        validate_key(&destination_key).map_err(|_| UploadError::InvalidKey(destination_key.clone()))?;
        let task = UploadTask::new(local_path, destination_key);
        let id = task.id;
        {
            let mut state = self.inner.lock();
            state.tasks.push(task);
            if let Err(e) = self.inner.store.save(&state.tasks) {
                state.tasks.pop();
                return Err(e);
            }
        }
        tracing::info!(task_id = %id, "Enqueued upload");
        self.inner.wake.notify_one();
        Ok(id)
    }

    /// Remove a task that is not uploading. A running upload is left to
    /// finish or fail and reports through the observer as usual. Returns
    /// whether the task was removed.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let found = {
            let mut state = self.inner.lock();
            if state.in_flight.contains(&task_id) {
                tracing::info!(task_id = %task_id, "Upload already running; not cancelled");
                return false;
            }
            let before = state.tasks.len();
            state.tasks.retain(|t| t.id != task_id);
            let removed = state.tasks.len() != before;
            if removed {
                self.inner.persist(&state);
            }
            removed | state.failed.remove(&task_id).is_some()
        };
        if found {
            tracing::info!(task_id = %task_id, "Cancelled upload");
            self.inner.notify_if_idle();
        }
        found
    }

    /// Report connectivity. Coming back online makes backed-off tasks
    /// eligible immediately; their retry counts are unchanged.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            let mut state = self.inner.lock();
            for task in state.tasks.iter_mut() {
                if task.state == UploadState::Queued {
                    task.next_attempt_at = None;
                }
            }
            self.inner.persist(&state);
            drop(state);
            tracing::info!("Connectivity restored");
            self.inner.wake.notify_one();
        } else if !online && was_online {
            tracing::info!("Connectivity lost; uploads paused");
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// The app came to the foreground.
    pub fn on_foreground(&self) {
        self.inner.wake.notify_one();
    }

    /// Resolve once no task is queued or uploading.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Re-enqueue a terminal failure as a fresh task.
    pub fn retry(&self, failed: TaskId) -> Result<TaskId, UploadError> {
        let task = self
            .inner
            .lock()
            .failed
            .remove(&failed)
            .ok_or(UploadError::UnknownTask(failed))?;
        tracing::info!(task_id = %failed, "Manual retry");
        self.enqueue(task.local_path, task.destination_key)
    }

    /// Active tasks in enqueue order.
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.inner.lock().tasks.clone()
    }

    /// Terminal failures still available for [`retry`](Self::retry).
    pub fn failed_tasks(&self) -> Vec<UploadTask> {
        self.inner.lock().failed.values().cloned().collect()
    }

    pub fn state_path(&self) -> &Path {
        self.inner.store.path()
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.in_flight.is_empty()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }
}

/// How one attempt ended.
enum Attempt {
    Uploaded(u64),
    Failed(StoreError),
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &QueueState) {
        if let Err(e) = self.store.save(&state.tasks) {
            tracing::warn!(error = %e, "Failed to persist upload queue");
        }
    }

    fn notify_if_idle(&self) {
        if self.lock().is_idle() {
            self.idle.notify_waiters();
        }
    }

    async fn run(self: Arc<Self>) {
        let mut uploads = JoinSet::new();
        tracing::debug!("Upload dispatcher started");
        loop {
            let next_due = self.dispatch(&mut uploads);
            let timer = async {
                match next_due {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                Some(_) = uploads.join_next(), if !uploads.is_empty() => {}
                _ = timer => {}
            }
        }
        while uploads.join_next().await.is_some() {}
        tracing::debug!("Upload dispatcher stopped");
    }

    /// Start every due task a slot is free for, scanning in enqueue order.
    /// Returns when the earliest backed-off task becomes due.
    fn dispatch(self: &Arc<Self>, uploads: &mut JoinSet<()>) -> Option<Instant> {
        if !self.online.load(Ordering::SeqCst) {
            return None;
        }
        let now = Utc::now();
        let mut next_due: Option<DateTime<Utc>> = None;
        let mut started = false;
        let mut state = self.lock();

        for i in 0..state.tasks.len() {
            let task = &state.tasks[i];
            if task.state != UploadState::Queued || state.in_flight.contains(&task.id) {
                continue;
            }
            if !task.is_due(now) {
                if let Some(at) = task.next_attempt_at {
                    next_due = Some(next_due.map_or(at, |n| n.min(at)));
                }
                continue;
            }
            let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                // Busy; a finishing upload wakes the dispatcher.
                break;
            };

            let task = &mut state.tasks[i];
            task.state = UploadState::Uploading;
            let snapshot = task.clone();
            state.in_flight.insert(snapshot.id);
            started = true;

            tracing::debug!(
                task_id = %snapshot.id,
                retry_count = snapshot.retry_count,
                "Starting upload"
            );
            let inner = self.clone();
            uploads.spawn(async move { inner.attempt(snapshot, permit).await });
        }
        if started {
            self.persist(&state);
        }

        next_due.map(|at| {
            let wait = (at - now).to_std().unwrap_or_default();
            Instant::now() + wait
        })
    }

    async fn attempt(
        self: Arc<Self>,
        task: UploadTask,
        permit: OwnedSemaphorePermit,
    ) {
        let outcome = if !task.local_path.is_file() {
            Attempt::Failed(StoreError::Permanent(format!(
                "local file missing: {}",
                task.local_path.display()
            )))
        } else {
            let observer = self.observer.clone();
            let id = task.id;
            let progress: ProgressFn = Arc::new(move |sent| observer.on_progress(id, sent));
            match self
                .remote
                .put(&task.destination_key, &task.local_path, progress)
                .await
            {
                Ok(bytes) => Attempt::Uploaded(bytes),
                Err(e) => Attempt::Failed(e),
            }
        };
        drop(permit);
        self.finish(task.id, outcome);
        self.wake.notify_one();
    }

    /// Apply an attempt's outcome. The in-flight entry is released only
    /// after the observer has been told, so `wait_idle` sees the callback.
    fn finish(&self, id: TaskId, outcome: Attempt) {
        enum Report {
            Complete,
            Error(UploadErrorKind),
            Nothing,
        }

        let report = {
            let mut state = self.lock();
            match state.position(id) {
                None => {
                    tracing::warn!(task_id = %id, "Finished upload has no task entry");
                    Report::Nothing
                }
                Some(idx) => match outcome {
                    Attempt::Uploaded(bytes) => {
                        let task = state.tasks.remove(idx);
                        tracing::info!(
                            task_id = %id,
                            key = %task.destination_key,
                            bytes,
                            retry_count = task.retry_count,
                            "Upload finished"
                        );
                        self.persist(&state);
                        Report::Complete
                    }
                    Attempt::Failed(err) if err.is_transient() => {
                        let max_retries = self.config.max_retries;
                        let task = &mut state.tasks[idx];
                        task.retry_count = task.retry_count.saturating_add(1);
                        if task.retry_count > max_retries {
                            let mut task = state.tasks.remove(idx);
                            task.state = UploadState::Failed;
                            tracing::warn!(
                                task_id = %id,
                                retry_count = task.retry_count,
                                error = %err,
                                "Upload retries exhausted"
                            );
                            state.failed.insert(id, task);
                            self.persist(&state);
                            Report::Error(UploadErrorKind::RetriesExhausted)
                        } else {
                            let delay = self.config.backoff.delay_for(task.retry_count);
                            task.state = UploadState::Queued;
                            task.next_attempt_at = Some(
                                Utc::now()
                                    + chrono::Duration::from_std(delay)
                                        .unwrap_or_else(|_| chrono::Duration::zero()),
                            );
                            tracing::debug!(
                                task_id = %id,
                                retry_count = task.retry_count,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Upload failed transiently; backing off"
                            );
                            self.persist(&state);
                            Report::Nothing
                        }
                    }
                    Attempt::Failed(err) => {
                        let mut task = state.tasks.remove(idx);
                        task.state = UploadState::Failed;
                        tracing::warn!(task_id = %id, error = %err, "Upload failed permanently");
                        state.failed.insert(id, task);
                        self.persist(&state);
                        Report::Error(UploadErrorKind::Permanent)
                    }
                },
            }
        };

        match report {
            Report::Complete => self.observer.on_complete(id),
            Report::Error(kind) => self.observer.on_error(id, kind),
            Report::Nothing => {}
        }

        self.lock().in_flight.remove(&id);
        self.notify_if_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NullRemote;

    #[async_trait::async_trait]
    impl RemoteStore for NullRemote {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn put(&self, _key: &str, local: &Path, progress: ProgressFn) -> Result<u64, StoreError> {
            let len = std::fs::metadata(local).map(|m| m.len()).unwrap_or(0);
            progress(len);
            Ok(len)
        }

        async fn get(&self, key: &str, _dest: &Path) -> Result<u64, StoreError> {
            Err(StoreError::NotFound(key.into()))
        }
    }

    fn config(dir: &Path) -> QueueConfig {
        QueueConfig {
            max_concurrent_uploads: 2,
            max_retries: 3,
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            },
            state_path: dir.join("uploads.json"),
        }
    }

    fn open(dir: &Path) -> UploadQueue {
        UploadQueue::open(
            config(dir),
            Arc::new(NullRemote),
            Arc::new(crate::TracingObserver),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(dir.path());
        let id = queue.enqueue(dir.path().join("a.mp4"), "u/a.mp4").unwrap();

        let persisted = TaskStore::new(dir.path().join("uploads.json")).load().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, id);
        assert_eq!(persisted[0].state, UploadState::Queued);
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(dir.path());
        assert!(matches!(
            queue.enqueue(dir.path().join("a.mp4"), "../a.mp4"),
            Err(UploadError::InvalidKey(_))
        ));
        assert!(queue.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_tasks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let queue = open(dir.path());
            queue.enqueue(dir.path().join("a.mp4"), "u/a.mp4").unwrap()
        };
        let queue = open(dir.path());
        let tasks = queue.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
    }

    #[tokio::test]
    async fn test_cancel_queued_task() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(dir.path());
        let id = queue.enqueue(dir.path().join("a.mp4"), "u/a.mp4").unwrap();
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(queue.tasks().is_empty());
        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_uploads_drain_and_state_file_empties() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.mp4");
        std::fs::write(&local, b"video").unwrap();

        let queue = open(dir.path());
        queue.start();
        queue.enqueue(&local, "u/a.mp4").unwrap();
        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .unwrap();
        queue.shutdown().await;

        let persisted = TaskStore::new(dir.path().join("uploads.json")).load().unwrap();
        assert!(persisted.is_empty());
    }
}
