//! Clipveil Common Utilities
//!
//! Shared infrastructure for all Clipveil crates:
//! - Error types and result aliases
//! - Recording clock and per-frame time budgets
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
