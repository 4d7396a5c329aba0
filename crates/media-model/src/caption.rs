//! Caption segments with per-word timing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// One word inside a caption segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionWord {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// A timed caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,

    /// Word timing; may be empty, in which case the whole text shows for
    /// the segment duration.
    #[serde(default)]
    pub words: Vec<CaptionWord>,
}

impl CaptionSegment {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Immutable list of caption segments attached to a composition job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionTrack {
    pub segments: Vec<CaptionSegment>,
}

/// Slack allowed when checking word timing against segment bounds.
const TIMING_TOLERANCE_SECS: f64 = 0.001;

impl CaptionTrack {
    pub fn new(segments: Vec<CaptionSegment>) -> Self {
        Self { segments }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Parse a JSON array of segments.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON array of segments from disk.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::InvalidCaption {
            index: 0,
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&content)
    }

    /// Check timing consistency of every segment and word.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (index, seg) in self.segments.iter().enumerate() {
            let invalid = |reason: String| ModelError::InvalidCaption { index, reason };

            if !seg.start_secs.is_finite() || !seg.end_secs.is_finite() {
                return Err(invalid("non-finite timestamps".into()));
            }
            if seg.start_secs < 0.0 {
                return Err(invalid(format!("negative start {}", seg.start_secs)));
            }
            if seg.end_secs < seg.start_secs {
                return Err(invalid(format!(
                    "end {} before start {}",
                    seg.end_secs, seg.start_secs
                )));
            }
            for w in &seg.words {
                if !w.start_secs.is_finite() || !w.end_secs.is_finite() {
                    return Err(invalid(format!("word '{}' has non-finite timing", w.word)));
                }
                if w.end_secs < w.start_secs {
                    return Err(invalid(format!("word '{}' ends before it starts", w.word)));
                }
                if w.start_secs < seg.start_secs - TIMING_TOLERANCE_SECS
                    || w.end_secs > seg.end_secs + TIMING_TOLERANCE_SECS
                {
                    return Err(invalid(format!("word '{}' lies outside its segment", w.word)));
                }
            }
        }
        Ok(())
    }

    /// End time of the last segment.
    pub fn end_secs(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.end_secs)
            .fold(0.0, f64::max)
    }
}
