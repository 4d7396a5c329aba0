//! Error types shared across Clipveil crates.

/// Top-level error type for Clipveil operations.
///
/// Component crates keep their own narrower error enums; this one covers
/// the capture session and configuration I/O.
#[derive(Debug, thiserror::Error)]
pub enum ClipveilError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipveilError.
pub type ClipveilResult<T> = Result<T, ClipveilError>;

impl ClipveilError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }
}
