//! Overlay layer stack and ffmpeg filter graph construction.
//!
//! Overlays sit on top of the decoded base video as separate layers, laid
//! out in rotation-corrected render coordinates:
//!
//! ```text
//! [0:v] ── scale to render size ── captions (ass) ── watermark ── [vout]
//! ```

use std::path::{Path, PathBuf};

use clipveil_media_model::{Anchor, WatermarkContent, WatermarkSpec};

/// One overlay layer above the base video.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// Burned-in captions from an ASS script.
    Captions { script: PathBuf },

    /// Text watermark read from a UTF-8 file.
    TextWatermark {
        text_file: PathBuf,
        font_size: u32,
        opacity: f64,
        anchor: Anchor,
        margin: u32,
    },

    /// Image watermark scaled to `width` × `height` and placed at `x`, `y`.
    ImageWatermark {
        path: PathBuf,
        width: u32,
        height: u32,
        x: i64,
        y: i64,
        opacity: f64,
    },
}

/// Layers composited over the base video, bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStack {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}

/// Filter graph plus the extra inputs it references.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub graph: String,
    /// Additional `-i` inputs, numbered from 1.
    pub extra_inputs: Vec<PathBuf>,
    /// Label of the final video pad.
    pub output_label: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("watermark image {path}: {message}")]
    WatermarkImage { path: PathBuf, message: String },

    #[error("render size {0}x{1} is empty")]
    EmptyRender(u32, u32),
}

impl LayerStack {
    /// Empty stack for a render of `width` × `height`.
    pub fn new(width: u32, height: u32) -> Result<Self, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::EmptyRender(width, height));
        }
        Ok(Self {
            width,
            height,
            layers: Vec::new(),
        })
    }

    pub fn render_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn push_captions(&mut self, script: impl Into<PathBuf>) {
        self.layers.push(Layer::Captions {
            script: script.into(),
        });
    }

    /// Lay out a watermark against the render size. Text content must
    /// already be written to `text_file`.
    pub fn push_watermark(
        &mut self,
        spec: &WatermarkSpec,
        text_file: Option<&Path>,
    ) -> Result<(), LayoutError> {
        let margin = spec.margin_px(self.width, self.height);
        let layer = match &spec.content {
            WatermarkContent::Text { .. } => Layer::TextWatermark {
                text_file: text_file.map(Path::to_path_buf).unwrap_or_default(),
                font_size: ((self.height as f64 * spec.scale).round() as u32).max(8),
                opacity: spec.opacity,
                anchor: spec.anchor,
                margin,
            },
            WatermarkContent::Image { path } => {
                let (iw, ih) = image::image_dimensions(path).map_err(|e| {
                    LayoutError::WatermarkImage {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })?;
                if iw == 0 || ih == 0 {
                    return Err(LayoutError::WatermarkImage {
                        path: path.clone(),
                        message: "image is empty".into(),
                    });
                }
                let width = even(self.width as f64 * spec.scale);
                let height = even(width as f64 * ih as f64 / iw as f64);
                let (x, y) = spec
                    .anchor
                    .place((self.width, self.height), (width, height), margin);
                Layer::ImageWatermark {
                    path: path.clone(),
                    width,
                    height,
                    x,
                    y,
                    opacity: spec.opacity,
                }
            }
        };
        self.layers.push(layer);
        Ok(())
    }

    /// Build the `-filter_complex` graph for this stack.
    pub fn filter_plan(&self) -> FilterPlan {
        let mut chains = vec![format!(
            "[0:v]scale={}:{},setsar=1[base]",
            self.width, self.height
        )];
        let mut extra_inputs = Vec::new();
        let mut current = "base".to_string();

        for (i, layer) in self.layers.iter().enumerate() {
            let next = format!("l{i}");
            match layer {
                Layer::Captions { script } => {
                    chains.push(format!(
                        "[{current}]ass=filename={}[{next}]",
                        escape_filter_value(&script.to_string_lossy())
                    ));
                }
                Layer::TextWatermark {
                    text_file,
                    font_size,
                    opacity,
                    anchor,
                    margin,
                } => {
                    let (x, y) = drawtext_position(*anchor, *margin);
                    chains.push(format!(
                        "[{current}]drawtext=textfile={}:expansion=none:fontsize={font_size}:fontcolor=white@{opacity:.3}:shadowcolor=black@{shadow:.3}:shadowx=2:shadowy=2:x={x}:y={y}[{next}]",
                        escape_filter_value(&text_file.to_string_lossy()),
                        shadow = opacity * 0.6,
                    ));
                }
                Layer::ImageWatermark {
                    path,
                    width,
                    height,
                    x,
                    y,
                    opacity,
                } => {
                    extra_inputs.push(path.clone());
                    let input = extra_inputs.len();
                    chains.push(format!(
                        "[{input}:v]scale={width}:{height},format=rgba,colorchannelmixer=aa={opacity:.3}[wm{i}]"
                    ));
                    chains.push(format!(
                        "[{current}][wm{i}]overlay=x={x}:y={y}:format=auto[{next}]"
                    ));
                }
            }
            current = next;
        }

        chains.push(format!("[{current}]format=yuv420p[vout]"));
        FilterPlan {
            graph: chains.join(";"),
            extra_inputs,
            output_label: "[vout]".to_string(),
        }
    }
}

/// drawtext position expressions; `w`/`h` are the frame size, `tw`/`th`
/// the rendered text size.
fn drawtext_position(anchor: Anchor, margin: u32) -> (String, String) {
    let m = margin;
    match anchor {
        Anchor::TopLeft => (format!("{m}"), format!("{m}")),
        Anchor::TopRight => (format!("w-tw-{m}"), format!("{m}")),
        Anchor::BottomLeft => (format!("{m}"), format!("h-th-{m}")),
        Anchor::BottomRight => (format!("w-tw-{m}"), format!("h-th-{m}")),
        Anchor::Center => ("(w-tw)/2".to_string(), "(h-th)/2".to_string()),
    }
}

fn even(v: f64) -> u32 {
    let n = v.round().max(2.0) as u32;
    n + (n % 2)
}

/// Escape a literal for use as a filter option value.
///
/// Applied twice: once for the option parser (`\`, `'`, `:`), then for
/// the filter graph parser (`\`, `'`, `[`, `]`, `,`, `;`).
pub fn escape_filter_value(value: &str) -> String {
    let escape = |s: &str, special: &[char]| {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if special.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        out
    };
    let option_level = escape(value, &['\\', '\'', ':']);
    escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_base_layer_only() {
        let plan = LayerStack::new(1080, 1920).unwrap().filter_plan();
        assert_eq!(
            plan.graph,
            "[0:v]scale=1080:1920,setsar=1[base];[base]format=yuv420p[vout]"
        );
        assert!(plan.extra_inputs.is_empty());
    }

    #[test]
    fn test_captions_below_watermark() {
        let mut stack = LayerStack::new(1080, 1920).unwrap();
        stack.push_captions("/tmp/job.ass");
        stack
            .push_watermark(
                &WatermarkSpec::text("@clipveil").with_anchor(Anchor::TopRight),
                Some(Path::new("/tmp/job.wm.txt")),
            )
            .unwrap();
        let graph = stack.filter_plan().graph;

        let ass = graph.find("ass=filename=/tmp/job.ass").unwrap();
        let text = graph.find("drawtext=textfile=/tmp/job.wm.txt").unwrap();
        assert!(ass < text);
        // 0.05 * 1920 font, 0.03 * 1080 margin
        assert!(graph.contains("fontsize=96"));
        assert!(graph.contains("x=w-tw-32:y=32"));
        assert!(graph.ends_with("[l1]format=yuv420p[vout]"));
    }

    #[test]
    fn test_image_watermark_is_placed_in_render_space() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]))
            .save(&logo)
            .unwrap();

        let mut stack = LayerStack::new(1080, 1920).unwrap();
        let spec = WatermarkSpec::image(&logo).with_opacity(0.5);
        stack.push_watermark(&spec, None).unwrap();

        match &stack.layers()[0] {
            Layer::ImageWatermark {
                width, height, x, y, ..
            } => {
                // 0.2 * 1080 = 216 wide, aspect 2:1
                assert_eq!((*width, *height), (216, 108));
                assert_eq!((*x, *y), (1080 - 216 - 32, 1920 - 108 - 32));
            }
            other => panic!("unexpected layer {other:?}"),
        }
        let plan = stack.filter_plan();
        assert_eq!(plan.extra_inputs, vec![logo]);
        assert!(plan.graph.contains("[1:v]scale=216:108,format=rgba,colorchannelmixer=aa=0.500[wm0]"));
        assert!(plan.graph.contains("[base][wm0]overlay=x=832:y=1780"));
    }

    #[test]
    fn test_missing_watermark_image_is_layout_error() {
        let mut stack = LayerStack::new(1080, 1920).unwrap();
        let err = stack
            .push_watermark(&WatermarkSpec::image("/nonexistent/logo.png"), None)
            .unwrap_err();
        assert!(matches!(err, LayoutError::WatermarkImage { .. }));
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("/tmp/plain.ass"), "/tmp/plain.ass");
        assert_eq!(escape_filter_value("/tmp/a:b.ass"), "/tmp/a\\\\:b.ass");
        assert_eq!(escape_filter_value("x[1]"), "x\\[1\\]");
    }

    #[test]
    fn test_empty_render_rejected() {
        assert!(LayerStack::new(0, 1920).is_err());
    }
}
