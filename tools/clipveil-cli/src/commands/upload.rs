//! Enqueue a finished export and upload it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clipveil_common::config::AppConfig;
use clipveil_upload_queue::{
    destination_key, QueueConfig, TaskId, TracingObserver, UploadErrorKind, UploadObserver,
    UploadQueue,
};

/// Prints terminal outcomes and remembers failures for the exit status.
#[derive(Default)]
pub struct ConsoleObserver {
    failures: Mutex<Vec<(TaskId, UploadErrorKind)>>,
}

impl ConsoleObserver {
    pub fn failures(&self) -> Vec<(TaskId, UploadErrorKind)> {
        self.failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }
}

impl UploadObserver for ConsoleObserver {
    fn on_progress(&self, task: TaskId, bytes_sent: u64) {
        TracingObserver.on_progress(task, bytes_sent);
    }

    fn on_complete(&self, task: TaskId) {
        println!("  [OK] {task}");
    }

    fn on_error(&self, task: TaskId, kind: UploadErrorKind) {
        println!("  [FAIL] {task}: {kind:?}");
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((task, kind));
        }
    }
}

/// Open the queue configured in `config` with a console observer.
pub fn open_queue(config: &AppConfig) -> anyhow::Result<(UploadQueue, Arc<ConsoleObserver>)> {
    let remote = clipveil_storage::remote_from_config(config)?;
    let observer = Arc::new(ConsoleObserver::default());
    let queue = UploadQueue::open(
        QueueConfig::from_app_config(config),
        remote,
        observer.clone(),
    )?;
    Ok((queue, observer))
}

pub async fn run(
    config: &AppConfig,
    file: PathBuf,
    key: Option<String>,
    user: Option<String>,
    no_wait: bool,
) -> anyhow::Result<()> {
    let key = match (key, user) {
        (Some(key), _) => key,
        (None, Some(user)) => destination_key(&user),
        (None, None) => return Err(anyhow::anyhow!("Pass --key or --user")),
    };

    let (queue, observer) = open_queue(config)?;
    let id = queue.enqueue(&file, &key)?;
    println!("Enqueued {} as {key}", file.display());
    println!("  Task: {id}");

    if no_wait {
        println!("  Persisted to {}", queue.state_path().display());
        return Ok(());
    }

    queue.start();
    queue.wait_idle().await;
    queue.shutdown().await;

    let failures = observer.failures();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} upload(s) failed", failures.len()))
    }
}
