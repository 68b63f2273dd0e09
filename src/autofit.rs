//! Heading autofit.
//!
//! Finds the largest font size at which a text element wraps into no more
//! than a given number of lines.

use serde::Deserialize;

use crate::document::{Document, NodeId, NodeKind};
use crate::layout::{LayoutEngine, LayoutError, TextStyleResolved};
use crate::text::line_count;

/// Safety cap on bisection rounds.
const MAX_ITERATIONS: usize = 64;

/// Parameters of one autofit run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutofitParams {
    /// Size tried first and upper bound of the search
    pub default_font_size: f32,
    /// Lower bound of the search
    pub min_font_size: f32,
    /// Line budget
    pub max_lines: u32,
    /// Line height as a multiple of the font size
    pub line_height_ratio: f32,
    /// Search granularity
    #[serde(skip)]
    pub step: f32,
}

impl Default for AutofitParams {
    fn default() -> Self {
        Self {
            default_font_size: 83.66,
            min_font_size: 10.0,
            max_lines: 3,
            line_height_ratio: 0.8,
            step: 0.1,
        }
    }
}

impl AutofitParams {
    fn fits(&self, content_height: f32, font_size: f32) -> bool {
        line_count(content_height, font_size, self.line_height_ratio) <= self.max_lines
    }
}

/// Pick a font size given a closure that measures content height at a size.
///
/// The default size wins when it already fits. Otherwise the range
/// `[min, default]` is bisected and the largest fitting midpoint is kept,
/// falling back to the minimum.
pub fn fit(params: &AutofitParams, mut content_height: impl FnMut(f32) -> f32) -> f32 {
    let default = params.default_font_size;
    if params.fits(content_height(default), default) {
        return default;
    }

    let step = if params.step > 0.0 { params.step } else { 0.1 };
    let mut low = params.min_font_size;
    let mut high = default;
    let mut best = params.min_font_size;
    let mut iterations = 0;

    while low <= high && iterations < MAX_ITERATIONS {
        let mid = (low + high) / 2.0;
        if params.fits(content_height(mid), mid) {
            best = mid;
            low = mid + step;
        } else {
            high = mid - step;
        }
        iterations += 1;
    }

    best
}

/// Autofit a text node of the document in place.
///
/// Returns the applied size, or `None` when `node` is not a text node.
/// A node that is not displayed measures zero height and keeps the default
/// size.
pub fn autofit_text(
    engine: &mut LayoutEngine,
    doc: &mut Document,
    node: NodeId,
    params: &AutofitParams,
) -> Result<Option<f32>, LayoutError> {
    let NodeKind::Text { content, style } = &doc.node(node).kind else {
        tracing::warn!(node = node.index(), "autofit target is not a text node");
        return Ok(None);
    };
    let text = content.text.clone();
    let resolved = TextStyleResolved::resolve(style);
    let family = style.font_family.clone();

    let width = if doc.is_displayed(node) {
        let layout = engine.compute_layout(doc)?;
        layout.content_width(node)
    } else {
        None
    };

    let text_engine = &mut engine.text_engine;
    let size = fit(params, |size| match width {
        Some(width) => {
            text_engine
                .measure(
                    &text,
                    family.as_deref(),
                    resolved.font_weight,
                    size,
                    params.line_height_ratio,
                    Some(width),
                )
                .height
        }
        None => 0.0,
    });

    doc.set_font_size(node, size, params.line_height_ratio);
    tracing::debug!(node = node.index(), font_size = size, ?width, "autofit applied");
    Ok(Some(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RichText;
    use crate::element::Element;
    use proptest::prelude::*;

    /// Fixed-advance wrapper: every char is half an em wide.
    fn synthetic(chars: usize, width: f32, ratio: f32) -> impl FnMut(f32) -> f32 {
        move |size| {
            let per_line = ((width / (size * 0.5)).floor() as usize).max(1);
            let lines = chars.div_ceil(per_line).max(1);
            lines as f32 * size * ratio
        }
    }

    fn params(max_lines: u32) -> AutofitParams {
        AutofitParams {
            max_lines,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_size_kept_when_it_fits() {
        let p = params(3);
        assert_eq!(fit(&p, synthetic(10, 600.0, 0.8)), 83.66);
    }

    #[test]
    fn test_shrinks_long_text() {
        let p = params(2);
        let size = fit(&p, synthetic(80, 600.0, 0.8));
        assert!(size < 83.66);
        assert!(size >= 10.0);
        let mut measure = synthetic(80, 600.0, 0.8);
        assert!(line_count(measure(size), size, 0.8) <= 2);
    }

    #[test]
    fn test_falls_back_to_minimum() {
        let p = params(1);
        assert_eq!(fit(&p, |size| 10.0 * size * 0.8), 10.0);
    }

    #[test]
    fn test_zero_height_keeps_default() {
        assert_eq!(fit(&params(1), |_| 0.0), 83.66);
    }

    #[test]
    fn test_autofit_text_applies_size_and_ratio() {
        let element: Element = serde_json::from_str(
            r#"{ "type": "flex", "style": { "width": 300 }, "children": [
                { "type": "text", "content": "", "style": { "fontSize": 83.66 } }
            ]}"#,
        )
        .unwrap();
        let mut doc = Document::from_element(&element, 1200.0);
        let heading = doc.node(doc.root()).children[0];
        doc.set_text(
            heading,
            RichText::plain("A heading long enough to need several lines at full size"),
        );

        let mut engine = LayoutEngine::new();
        let size = autofit_text(&mut engine, &mut doc, heading, &params(3))
            .unwrap()
            .unwrap();

        assert!(size < 83.66);
        assert_eq!(doc.font_size(heading), Some(size));
    }

    #[test]
    fn test_autofit_ignores_non_text() {
        let element: Element = serde_json::from_str(r#"{ "type": "box" }"#).unwrap();
        let mut doc = Document::from_element(&element, 1200.0);
        let root = doc.root();
        let mut engine = LayoutEngine::new();
        assert_eq!(
            autofit_text(&mut engine, &mut doc, root, &params(3)).unwrap(),
            None
        );
    }

    proptest! {
        #[test]
        fn prop_longer_text_never_gets_larger(
            base in 1usize..120,
            extra in 0usize..120,
            width in 150.0f32..900.0,
            max_lines in 1u32..4,
        ) {
            let p = params(max_lines);
            let short = fit(&p, synthetic(base, width, 0.8));
            let long = fit(&p, synthetic(base + extra, width, 0.8));
            prop_assert!(long <= short);
        }

        #[test]
        fn prop_result_within_bounds(chars in 1usize..400, width in 50.0f32..900.0) {
            let p = params(3);
            let size = fit(&p, synthetic(chars, width, 0.8));
            prop_assert!(size >= p.min_font_size && size <= p.default_font_size);
        }
    }
}
