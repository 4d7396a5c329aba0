//! Inspect or drain the persisted upload queue.

use clipveil_common::config::AppConfig;

use super::upload::open_queue;
use crate::QueueAction;

pub async fn run(config: &AppConfig, action: QueueAction) -> anyhow::Result<()> {
    let (queue, observer) = open_queue(config)?;

    match action {
        QueueAction::List => {
            let tasks = queue.tasks();
            println!("Upload queue: {}", queue.state_path().display());
            if tasks.is_empty() {
                println!("  (empty)");
            }
            for task in tasks {
                let next = task
                    .next_attempt_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "now".to_string());
                println!(
                    "  {}  {:?}  retries={}  next={}  {} -> {}",
                    task.id,
                    task.state,
                    task.retry_count,
                    next,
                    task.local_path.display(),
                    task.destination_key
                );
            }
        }
        QueueAction::Drain => {
            let pending = queue.tasks().len();
            println!("Draining {pending} task(s)");
            queue.start();
            queue.wait_idle().await;
            queue.shutdown().await;
            let failed = observer.failures().len();
            if failed > 0 {
                return Err(anyhow::anyhow!("{failed} upload(s) failed"));
            }
        }
        QueueAction::Cancel { id } => {
            if !queue.cancel(id) {
                return Err(anyhow::anyhow!("No cancellable task {id}"));
            }
            println!("Cancelled {id}");
        }
    }
    Ok(())
}
