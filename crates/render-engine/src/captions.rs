//! Caption rendering to Advanced SubStation Alpha.
//!
//! The script's `PlayResX`/`PlayResY` equal the render size, so caption
//! placement happens in rotation-corrected coordinates. Per-word timing is
//! expressed with karaoke `\k` tags (centiseconds).

use std::path::Path;

use clipveil_media_model::{CaptionSegment, CaptionTrack};

/// Caption styling relative to the render size.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    /// Font size as a fraction of the render height.
    pub font_scale: f64,

    /// Bottom margin as a fraction of the render height.
    pub bottom_margin: f64,

    pub font_name: String,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_scale: 0.045,
            bottom_margin: 0.12,
            font_name: "Sans".to_string(),
        }
    }
}

/// Build a complete ASS script for `track` at the given render size.
pub fn build_ass(track: &CaptionTrack, width: u32, height: u32, style: &CaptionStyle) -> String {
    let font_size = ((height as f64 * style.font_scale).round() as u32).max(8);
    let margin_v = (height as f64 * style.bottom_margin).round() as u32;
    let margin_h = (width as f64 * 0.06).round() as u32;
    let outline = (font_size / 12).max(1);

    let mut out = String::new();
    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    out.push_str(&format!("PlayResX: {width}\n"));
    out.push_str(&format!("PlayResY: {height}\n"));
    out.push_str("WrapStyle: 0\n");
    out.push_str("ScaledBorderAndShadow: yes\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str("Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n");
    // Karaoke fills from SecondaryColour (grey) to PrimaryColour (white).
    out.push_str(&format!(
        "Style: Caption,{font},{font_size},&H00FFFFFF,&H00A0A0A0,&H00000000,&H80000000,-1,0,0,0,100,100,0,0,1,{outline},1,2,{margin_h},{margin_h},{margin_v},1\n\n",
        font = style.font_name,
    ));

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for segment in &track.segments {
        out.push_str(&format!(
            "Dialogue: 0,{},{},Caption,,0,0,0,,{}\n",
            format_ass_time(segment.start_secs),
            format_ass_time(segment.end_secs),
            dialogue_text(segment)
        ));
    }
    out
}

/// Write the script for `track` to `path`.
pub async fn write_ass(
    path: &Path,
    track: &CaptionTrack,
    width: u32,
    height: u32,
    style: &CaptionStyle,
) -> std::io::Result<()> {
    tokio::fs::write(path, build_ass(track, width, height, style)).await
}

/// Karaoke text for one segment. Gaps before and between words become
/// empty `\k` spans so each word lights up at its own start time.
fn dialogue_text(segment: &CaptionSegment) -> String {
    if segment.words.is_empty() {
        return escape_ass_text(&segment.text);
    }

    let mut text = String::new();
    let mut cursor = to_centis(segment.start_secs);
    for (i, word) in segment.words.iter().enumerate() {
        let start = to_centis(word.start_secs).max(cursor);
        let end = to_centis(word.end_secs).max(start);
        if start > cursor {
            text.push_str(&format!("{{\\k{}}}", start - cursor));
        }
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&format!("{{\\k{}}}{}", end - start, escape_ass_text(&word.word)));
        cursor = end;
    }
    text
}

fn to_centis(secs: f64) -> u64 {
    (secs.max(0.0) * 100.0).round() as u64
}

/// Format seconds as an ASS timestamp: H:MM:SS.cc
pub fn format_ass_time(secs: f64) -> String {
    let total_cs = to_centis(secs);
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6_000;
    let seconds = (total_cs % 6_000) / 100;
    let centis = total_cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Keep user text from being read as override blocks or line breaks.
fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\u{29F5}")
        .replace('{', "(")
        .replace('}', ")")
        .replace('\n', "\\N")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipveil_media_model::CaptionWord;

    fn word(w: &str, start: f64, end: f64) -> CaptionWord {
        CaptionWord {
            word: w.to_string(),
            start_secs: start,
            end_secs: end,
        }
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(61.5), "0:01:01.50");
        assert_eq!(format_ass_time(3723.456), "1:02:03.46");
    }

    #[test]
    fn test_play_res_matches_render_size() {
        let ass = build_ass(&CaptionTrack::empty(), 1080, 1920, &CaptionStyle::default());
        assert!(ass.contains("PlayResX: 1080\n"));
        assert!(ass.contains("PlayResY: 1920\n"));
        // 0.045 * 1920
        assert!(ass.contains("Style: Caption,Sans,86,"));
    }

    #[tokio::test]
    async fn test_write_ass_writes_the_built_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.ass");
        let style = CaptionStyle::default();
        write_ass(&path, &CaptionTrack::empty(), 720, 1280, &style)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            build_ass(&CaptionTrack::empty(), 720, 1280, &style)
        );
    }

    #[test]
    fn test_karaoke_tags_follow_word_timing() {
        let segment = CaptionSegment {
            start_secs: 1.0,
            end_secs: 3.0,
            text: "hello big world".into(),
            words: vec![
                word("hello", 1.2, 1.6),
                word("big", 1.6, 2.0),
                word("world", 2.25, 3.0),
            ],
        };
        assert_eq!(
            dialogue_text(&segment),
            "{\\k20}{\\k40}hello {\\k40}big{\\k25} {\\k75}world"
        );
    }

    #[test]
    fn test_plain_segment_is_escaped() {
        let segment = CaptionSegment {
            start_secs: 0.0,
            end_secs: 1.0,
            text: "{bold}\nnext".into(),
            words: vec![],
        };
        assert_eq!(dialogue_text(&segment), "(bold)\\Nnext");
    }

    #[test]
    fn test_dialogue_lines_per_segment() {
        let track = CaptionTrack::new(vec![
            CaptionSegment {
                start_secs: 0.0,
                end_secs: 2.0,
                text: "one".into(),
                words: vec![],
            },
            CaptionSegment {
                start_secs: 2.5,
                end_secs: 4.0,
                text: "two".into(),
                words: vec![],
            },
        ]);
        let ass = build_ass(&track, 1080, 1920, &CaptionStyle::default());
        assert!(ass.contains("Dialogue: 0,0:00:00.00,0:00:02.00,Caption,,0,0,0,,one\n"));
        assert!(ass.contains("Dialogue: 0,0:00:02.50,0:00:04.00,Caption,,0,0,0,,two\n"));
    }
}
