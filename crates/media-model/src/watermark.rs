//! Watermark overlay description.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// What the watermark shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatermarkContent {
    Text { text: String },
    Image { path: PathBuf },
}

/// Fixed screen position of the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl Anchor {
    /// Top-left pixel position of an item of `item` size inside a
    /// `container`, keeping `margin` pixels from the anchored edges.
    pub fn place(&self, container: (u32, u32), item: (u32, u32), margin: u32) -> (i64, i64) {
        let (cw, ch) = (container.0 as i64, container.1 as i64);
        let (iw, ih) = (item.0 as i64, item.1 as i64);
        let m = margin as i64;
        match self {
            Self::TopLeft => (m, m),
            Self::TopRight => (cw - iw - m, m),
            Self::BottomLeft => (m, ch - ih - m),
            Self::BottomRight => (cw - iw - m, ch - ih - m),
            Self::Center => ((cw - iw) / 2, (ch - ih) / 2),
        }
    }
}

/// Static watermark burned into every frame of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub content: WatermarkContent,

    #[serde(default)]
    pub anchor: Anchor,

    /// Margin from the anchored edges as a fraction of the shorter render side.
    #[serde(default = "default_margin")]
    pub margin: f64,

    /// 0.0 (invisible) to 1.0 (opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Relative size: text height as a fraction of render height, or image
    /// width as a fraction of render width.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_margin() -> f64 {
    0.03
}

fn default_opacity() -> f64 {
    0.8
}

fn default_scale() -> f64 {
    0.05
}

impl WatermarkSpec {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: WatermarkContent::Text { text: text.into() },
            anchor: Anchor::default(),
            margin: default_margin(),
            opacity: default_opacity(),
            scale: default_scale(),
        }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            content: WatermarkContent::Image { path: path.into() },
            anchor: Anchor::default(),
            margin: default_margin(),
            opacity: default_opacity(),
            scale: 0.2,
        }
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ModelError::InvalidWatermark(format!(
                "opacity {} outside [0, 1]",
                self.opacity
            )));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ModelError::InvalidWatermark(format!(
                "scale {} outside (0, 1]",
                self.scale
            )));
        }
        if !(0.0..0.5).contains(&self.margin) {
            return Err(ModelError::InvalidWatermark(format!(
                "margin {} outside [0, 0.5)",
                self.margin
            )));
        }
        if let WatermarkContent::Text { text } = &self.content {
            if text.trim().is_empty() {
                return Err(ModelError::InvalidWatermark("empty text".into()));
            }
        }
        Ok(())
    }

    /// Margin in pixels for a render of `width` × `height`.
    pub fn margin_px(&self, width: u32, height: u32) -> u32 {
        (self.margin * width.min(height) as f64).round() as u32
    }
}
