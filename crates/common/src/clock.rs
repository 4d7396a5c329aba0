//! Clock and timing utilities for the capture path.
//!
//! Every capture session is anchored to a monotonic clock epoch recorded
//! at capture start. Per-frame work is bounded by a [`FrameBudget`]
//! derived from the target frame rate.

use std::time::{Duration, Instant};

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment recording started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since recording start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

/// Hard per-frame processing budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    interval: Duration,
}

impl FrameBudget {
    /// Budget for one frame at the given capture rate.
    pub fn from_fps(fps: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / fps.max(1) as u64),
        }
    }

    /// Budget with an explicit duration.
    pub fn from_duration(interval: Duration) -> Self {
        Self { interval }
    }

    /// Length of the budget.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start timing one frame against this budget.
    pub fn start(&self) -> FrameDeadline {
        FrameDeadline {
            started: Instant::now(),
            deadline: Instant::now() + self.interval,
        }
    }
}

/// A started frame timer.
#[derive(Debug, Clone, Copy)]
pub struct FrameDeadline {
    started: Instant,
    deadline: Instant,
}

impl FrameDeadline {
    /// Whether the budget has been used up.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time spent since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        // Should be very small but non-negative
        assert!(clock.elapsed_ns() < 1_000_000_000); // less than 1 second
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((RecordingClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(RecordingClock::secs_to_ns(2.0), 2_000_000_000);
    }

    #[test]
    fn test_budget_from_fps() {
        assert_eq!(
            FrameBudget::from_fps(30).interval(),
            Duration::from_nanos(33_333_333)
        );
        assert_eq!(FrameBudget::from_fps(60).interval().as_millis(), 16);
        // zero fps is clamped rather than dividing by zero
        assert_eq!(FrameBudget::from_fps(0).interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = FrameBudget::from_duration(Duration::ZERO).start();
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_generous_budget_not_expired() {
        let deadline = FrameBudget::from_duration(Duration::from_secs(60)).start();
        assert!(!deadline.expired());
        assert!(deadline.remaining() > Duration::from_secs(59));
    }
}
