//! Text layout and measurement using Parley.
//!
//! Handles text shaping, line breaking, and glyph positioning. When no font is
//! available (headless CI, bare WASM) measurement falls back to a character-width
//! estimate so that layout and autofit still make progress.

use std::borrow::Cow;
use std::ops::Range;

use parley::layout::{Alignment, Layout, PositionedLayoutItem};
use parley::style::{FontStack, FontWeight, LineHeight, StyleProperty};
use parley::{AlignmentOptions, FontContext, LayoutContext};
use taffy::Size;

use crate::element::TextAlign;

/// Text layout engine wrapping Parley.
pub struct TextLayoutEngine {
    font_cx: FontContext,
    layout_cx: LayoutContext<[u8; 4]>,
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_cx: FontContext::new(),
            layout_cx: LayoutContext::new(),
        }
    }

    /// Register a font from binary data. Returns registered family names.
    pub fn register_font(&mut self, data: Vec<u8>) -> Vec<String> {
        let families = self.font_cx.collection.register_fonts(data.into(), None);
        families
            .iter()
            .map(|(id, _info)| {
                self.font_cx
                    .collection
                    .family_name(*id)
                    .unwrap_or("unknown")
                    .to_string()
            })
            .collect()
    }

    fn build(
        &mut self,
        text: &str,
        font_family: Option<&str>,
        font_size: f32,
        font_weight: u16,
        line_height: f32,
    ) -> Layout<[u8; 4]> {
        let mut builder = self
            .layout_cx
            .ranged_builder(&mut self.font_cx, text, 1.0, false);

        builder.push_default(StyleProperty::FontSize(font_size));
        builder.push_default(StyleProperty::FontWeight(FontWeight::new(font_weight as f32)));
        builder.push_default(StyleProperty::LineHeight(LineHeight::FontSizeRelative(
            line_height,
        )));
        if let Some(family) = font_family {
            builder.push_default(StyleProperty::FontStack(FontStack::Source(Cow::Owned(
                family.to_string(),
            ))));
        }

        builder.build(text)
    }

    /// Measure text and return (width, height).
    ///
    /// The height is the rendered content height: line count times
    /// `font_size * line_height`.
    pub fn measure(
        &mut self,
        text: &str,
        font_family: Option<&str>,
        font_weight: u16,
        font_size: f32,
        line_height: f32,
        max_width: Option<f32>,
    ) -> Size<f32> {
        if text.is_empty() {
            return Size {
                width: 0.0,
                height: font_size * line_height,
            };
        }

        let mut layout = self.build(text, font_family, font_size, font_weight, line_height);
        layout.break_all_lines(max_width);

        let width = layout.width();
        let height = layout.height();

        // No font available: Parley reports zero dimensions.
        if width == 0.0 || height == 0.0 {
            return fallback_measure(text, font_size, line_height, max_width);
        }

        Size { width, height }
    }

    /// Lay out text with full glyph positions.
    #[allow(clippy::too_many_arguments)]
    pub fn layout(
        &mut self,
        text: &str,
        font_family: &str,
        font_size: f32,
        font_weight: u16,
        line_height: f32,
        text_align: TextAlign,
        max_width: f32,
    ) -> TextLayoutResult {
        if text.is_empty() {
            return TextLayoutResult {
                width: 0.0,
                height: font_size * line_height,
                lines: vec![],
            };
        }

        let mut layout = self.build(text, Some(font_family), font_size, font_weight, line_height);
        layout.break_all_lines(Some(max_width));

        let alignment = match text_align {
            TextAlign::Left => Alignment::Start,
            TextAlign::Center => Alignment::Center,
            TextAlign::Right => Alignment::End,
            TextAlign::Justify => Alignment::Justify,
        };
        layout.align(Some(max_width), alignment, AlignmentOptions::default());

        let mut lines = Vec::new();

        for line in layout.lines() {
            let metrics = line.metrics();
            let mut line_glyphs = Vec::new();
            let mut line_start: Option<usize> = None;
            let mut line_end: usize = 0;
            let mut line_width: f32 = 0.0;

            for item in line.items() {
                if let PositionedLayoutItem::GlyphRun(positioned_run) = item {
                    let run_x = positioned_run.offset();
                    let run = positioned_run.run();
                    let range = run.text_range();
                    line_start = Some(line_start.map_or(range.start, |s| s.min(range.start)));
                    line_end = line_end.max(range.end);

                    for glyph in positioned_run.glyphs() {
                        line_width = line_width.max(run_x + glyph.x + glyph.advance);
                        line_glyphs.push(PositionedGlyph {
                            glyph_id: glyph.id,
                            x: run_x + glyph.x,
                            y: glyph.y,
                            advance: glyph.advance,
                        });
                    }
                }
            }

            let range = match line_start {
                Some(start) => start..start + text[start..line_end].trim_end().len(),
                None => line_end..line_end,
            };

            lines.push(TextLine {
                text: text[range.clone()].to_string(),
                range,
                width: line_width,
                baseline: metrics.baseline,
                ascent: metrics.ascent,
                descent: metrics.descent,
                glyphs: line_glyphs,
            });
        }

        // Lines without glyph runs mean no font was available.
        let has_content = lines.iter().any(|l| !l.text.is_empty());
        if !has_content {
            return fallback_layout(text, font_size, line_height, max_width);
        }

        TextLayoutResult {
            width: layout.width(),
            height: layout.height(),
            lines,
        }
    }
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of rendered lines for a content height, rounded to the nearest line.
pub fn line_count(content_height: f32, font_size: f32, line_height: f32) -> u32 {
    let row = font_size * line_height;
    if row <= 0.0 || !content_height.is_finite() {
        return 0;
    }
    (content_height / row).round().max(0.0) as u32
}

/// Result of text layout.
#[derive(Debug, Clone)]
pub struct TextLayoutResult {
    pub width: f32,
    pub height: f32,
    pub lines: Vec<TextLine>,
}

/// A line of laid out text.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    /// Byte range of the (right-trimmed) line within the source text.
    pub range: Range<usize>,
    /// Advance width of the line's content.
    pub width: f32,
    pub baseline: f32,
    pub ascent: f32,
    pub descent: f32,
    pub glyphs: Vec<PositionedGlyph>,
}

/// A positioned glyph.
#[derive(Debug, Clone)]
pub struct PositionedGlyph {
    pub glyph_id: u32,
    pub x: f32,
    pub y: f32,
    pub advance: f32,
}

// ============================================================================
// Fallback text measurement/layout (used when no font is available)
// ============================================================================

/// Approximate average character width as a fraction of font size.
const CHAR_WIDTH_RATIO: f32 = 0.55;
/// Approximate ascent as a fraction of font size.
const ASCENT_RATIO: f32 = 0.8;
/// Approximate descent as a fraction of font size.
const DESCENT_RATIO: f32 = 0.2;

/// Estimate text width for a string at a given font size.
fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * CHAR_WIDTH_RATIO
}

/// Word-wrap into byte ranges of `text`. Hard breaks (`\n`) always start a new line.
fn word_wrap(text: &str, font_size: f32, max_width: Option<f32>) -> Vec<Range<usize>> {
    let max = max_width.unwrap_or(f32::MAX);
    let space_width = font_size * CHAR_WIDTH_RATIO;
    let mut lines = Vec::new();
    let mut paragraph_start = 0;

    for paragraph in text.split('\n') {
        let mut current: Option<Range<usize>> = None;
        let mut current_width: f32 = 0.0;

        let mut offset = 0;
        for word in paragraph.split_whitespace() {
            let local = offset + paragraph[offset..].find(word).unwrap_or(0);
            offset = local + word.len();
            let start = paragraph_start + local;
            let end = start + word.len();
            let word_width = estimate_text_width(word, font_size);

            match current.as_mut() {
                Some(line) if current_width + space_width + word_width <= max => {
                    line.end = end;
                    current_width += space_width + word_width;
                }
                Some(line) => {
                    lines.push(line.clone());
                    current = Some(start..end);
                    current_width = word_width;
                }
                None => {
                    current = Some(start..end);
                    current_width = word_width;
                }
            }
        }

        lines.push(current.unwrap_or(paragraph_start..paragraph_start));
        paragraph_start += paragraph.len() + 1;
    }

    lines
}

/// Fallback measurement when Parley returns zero dimensions.
fn fallback_measure(
    text: &str,
    font_size: f32,
    line_height: f32,
    max_width: Option<f32>,
) -> Size<f32> {
    let wrapped = word_wrap(text, font_size, max_width);
    let row_height = font_size * line_height;
    let width = wrapped
        .iter()
        .map(|r| estimate_text_width(&text[r.clone()], font_size))
        .fold(0.0_f32, f32::max);
    let width = match max_width {
        Some(mw) => width.min(mw),
        None => width,
    };
    Size {
        width,
        height: row_height * wrapped.len() as f32,
    }
}

/// Fallback layout when Parley produces no glyph runs.
fn fallback_layout(
    text: &str,
    font_size: f32,
    line_height: f32,
    max_width: f32,
) -> TextLayoutResult {
    let wrapped = word_wrap(text, font_size, Some(max_width));
    let row_height = font_size * line_height;
    let ascent = font_size * ASCENT_RATIO;
    let descent = font_size * DESCENT_RATIO;

    let lines: Vec<TextLine> = wrapped
        .iter()
        .enumerate()
        .map(|(i, range)| {
            let line_text = &text[range.clone()];
            TextLine {
                text: line_text.to_string(),
                range: range.clone(),
                width: estimate_text_width(line_text, font_size).min(max_width),
                // Half-leading above the ascent keeps glyphs centred in the row.
                baseline: row_height * i as f32 + (row_height - font_size) / 2.0 + ascent,
                ascent,
                descent,
                glyphs: vec![],
            }
        })
        .collect();

    let width = lines.iter().map(|l| l.width).fold(0.0_f32, f32::max);

    TextLayoutResult {
        width,
        height: row_height * lines.len() as f32,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slices<'a>(text: &'a str, ranges: &[Range<usize>]) -> Vec<&'a str> {
        ranges.iter().map(|r| &text[r.clone()]).collect()
    }

    #[test]
    fn test_word_wrap_ranges() {
        // 10px font: 5.5px per char, so 25px holds one short word per line.
        let text = "aaa bb  cc";
        let lines = word_wrap(text, 10.0, Some(25.0));
        assert_eq!(slices(text, &lines), vec!["aaa", "bb", "cc"]);

        let lines = word_wrap(text, 10.0, None);
        assert_eq!(slices(text, &lines), vec!["aaa bb  cc"]);
    }

    #[test]
    fn test_word_wrap_hard_breaks() {
        let text = "one\n\ntwo three";
        let lines = word_wrap(text, 10.0, None);
        assert_eq!(slices(text, &lines), vec!["one", "", "two three"]);
    }

    #[test]
    fn test_fallback_measure_counts_rows() {
        let size = fallback_measure("aaa bb cc", 10.0, 0.8, Some(25.0));
        assert_eq!(size.height, 3.0 * 10.0 * 0.8);
        assert_eq!(line_count(size.height, 10.0, 0.8), 3);
    }

    #[test]
    fn test_fallback_layout_lines_have_ranges() {
        let text = "alpha beta";
        let result = fallback_layout(text, 10.0, 1.0, 30.0);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[1].text, "beta");
        assert_eq!(&text[result.lines[1].range.clone()], "beta");
        assert!(result.lines[1].baseline > result.lines[0].baseline);
    }

    #[test]
    fn test_line_count_rounding() {
        assert_eq!(line_count(66.93, 83.66, 0.8), 1);
        assert_eq!(line_count(200.0, 83.66, 0.8), 3);
        assert_eq!(line_count(0.0, 10.0, 0.8), 0);
        assert_eq!(line_count(10.0, 0.0, 0.8), 0);
    }

    #[test]
    fn test_measure_empty_text_is_one_row() {
        let mut engine = TextLayoutEngine::new();
        let size = engine.measure("", None, 400, 20.0, 0.8, Some(100.0));
        assert_eq!(size.width, 0.0);
        assert_eq!(size.height, 16.0);
    }
}
