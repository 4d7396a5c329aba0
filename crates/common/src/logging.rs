//! Logging and tracing initialization.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. With `file` set, logs are appended there without
/// ANSI colors; if the file cannot be opened logs stay on stderr.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file = config.file.as_deref().and_then(open_log_file);

    match (config.json, file) {
        (true, Some(file)) => install(
            fmt()
                .with_env_filter(filter())
                .json()
                .with_writer(Mutex::new(file))
                .finish(),
        ),
        (true, None) => install(fmt().with_env_filter(filter()).json().finish()),
        (false, Some(file)) => install(
            fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_writer(Mutex::new(file))
                .finish(),
        ),
        (false, None) => install(
            fmt()
                .with_env_filter(filter())
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        ),
    }
}

fn install<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).ok()?;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("clipveil: cannot open log file {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("clipveil.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_log_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        assert!(open_log_file(dir.path()).is_none());
    }
}
