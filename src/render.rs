//! Render tree generation from layout results.
//!
//! Converts a laid-out subtree into a flat list of render commands
//! that can be converted to SVG. The captured node is placed at the origin.

use taffy::NodeId;

use crate::document::{Document, NodeId as DocNodeId, NodeKind};
use crate::element::{Color, ObjectFit, TextAlign};
use crate::layout::{ElementType, LayoutResult};
use crate::text::TextLayoutEngine;

/// A rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Render commands that can be converted to SVG.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    /// Draw a filled rectangle
    FillRect {
        rect: Rect,
        color: Color,
        border_radius: [f32; 4],
    },

    /// Draw text, one `<tspan>` run per accent segment
    Text {
        font_family: String,
        font_size: f32,
        font_weight: u16,
        color: Color,
        accent_color: Option<Color>,
        lines: Vec<TextLineRender>,
    },

    /// Draw an image
    Image {
        rect: Rect,
        src: String,
        object_fit: ObjectFit,
        border_radius: [f32; 4],
    },
}

/// A line of text for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLineRender {
    pub x: f32,
    pub y: f32,
    pub spans: Vec<TextSpan>,
}

impl TextLineRender {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub accent: bool,
}

/// The render tree - a flat list of commands in draw order.
#[derive(Debug)]
pub struct RenderTree {
    pub commands: Vec<RenderCommand>,
    pub width: f32,
    pub height: f32,
}

/// Build render tree for the subtree rooted at `capture`.
///
/// Returns `None` when the node was not laid out.
pub fn build_render_tree(
    layout: &LayoutResult,
    doc: &Document,
    capture: DocNodeId,
    text_engine: &mut TextLayoutEngine,
) -> Option<RenderTree> {
    let taffy_id = *layout.nodes.get(&capture)?;
    let capture_layout = layout.taffy.layout(taffy_id).ok()?;

    let mut commands = Vec::new();
    render_node(
        layout,
        doc,
        taffy_id,
        -capture_layout.location.x,
        -capture_layout.location.y,
        &mut commands,
        text_engine,
    );

    Some(RenderTree {
        commands,
        width: capture_layout.size.width,
        height: capture_layout.size.height,
    })
}

fn render_node(
    layout: &LayoutResult,
    doc: &Document,
    node_id: NodeId,
    parent_x: f32,
    parent_y: f32,
    commands: &mut Vec<RenderCommand>,
    text_engine: &mut TextLayoutEngine,
) {
    let Ok(node_layout) = layout.taffy.layout(node_id) else {
        return;
    };
    let Some(data) = layout.node_data.get(&node_id) else {
        return;
    };
    if data.hidden {
        return;
    }

    let x = parent_x + node_layout.location.x;
    let y = parent_y + node_layout.location.y;
    let width = node_layout.size.width;
    let height = node_layout.size.height;
    let rect = Rect {
        x,
        y,
        width,
        height,
    };

    let visual = &data.visual;

    if let Some(bg_color) = visual.background_color.filter(|c| c.a > 0) {
        commands.push(RenderCommand::FillRect {
            rect,
            color: bg_color,
            border_radius: visual.border_radius,
        });
    }

    match &data.element_type {
        ElementType::Box | ElementType::Flex => {
            if let Ok(children) = layout.taffy.children(node_id) {
                for child_id in children {
                    render_node(layout, doc, child_id, x, y, commands, text_engine);
                }
            }
        }

        ElementType::Text { style } => {
            let NodeKind::Text { content, .. } = &doc.node(data.node).kind else {
                return;
            };
            if content.text.is_empty() {
                return;
            }

            let text_layout = text_engine.layout(
                &content.text,
                &style.font_family,
                style.font_size,
                style.font_weight,
                style.line_height,
                style.text_align,
                width,
            );

            let lines = text_layout
                .lines
                .iter()
                .filter(|line| !line.range.is_empty())
                .map(|line| {
                    let offset = line
                        .glyphs
                        .first()
                        .map(|g| g.x)
                        .unwrap_or_else(|| align_offset(style.text_align, width, line.width));
                    TextLineRender {
                        x: x + offset,
                        y: y + line.baseline,
                        spans: content
                            .segments(line.range.clone())
                            .into_iter()
                            .map(|(range, accent)| TextSpan {
                                text: content.text[range].to_string(),
                                accent,
                            })
                            .collect(),
                    }
                })
                .collect::<Vec<_>>();

            if !lines.is_empty() {
                commands.push(RenderCommand::Text {
                    font_family: style.font_family.clone(),
                    font_size: style.font_size,
                    font_weight: style.font_weight,
                    color: style.color,
                    accent_color: style.accent_color,
                    lines,
                });
            }
        }

        ElementType::Image {
            src, object_fit, ..
        } => {
            if !src.is_empty() && width > 0.0 && height > 0.0 {
                commands.push(RenderCommand::Image {
                    rect,
                    src: src.clone(),
                    object_fit: *object_fit,
                    border_radius: visual.border_radius,
                });
            }
        }
    }
}

fn align_offset(align: TextAlign, container: f32, line: f32) -> f32 {
    match align {
        TextAlign::Left | TextAlign::Justify => 0.0,
        TextAlign::Center => ((container - line) / 2.0).max(0.0),
        TextAlign::Right => (container - line).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RichText;
    use crate::element::Element;
    use crate::layout::LayoutEngine;

    fn card_doc() -> Document {
        let json = r###"{
            "type": "flex",
            "style": { "flexDirection": "column", "padding": 10 },
            "children": [
                { "type": "box", "style": { "height": 30 } },
                { "type": "flex", "id": "card", "style": { "width": 200, "backgroundColor": "#3B1A35", "flexDirection": "column" }, "children": [
                    { "type": "text", "class": "heading", "content": "Hi", "style": { "fontSize": 20, "accentColor": "#ff0000" } },
                    { "type": "box", "class": "hidden", "style": { "display": "none", "height": 50 }, "children": [
                        { "type": "text", "content": "never" }
                    ]}
                ]}
            ]
        }"###;
        let element: Element = serde_json::from_str(json).unwrap();
        Document::from_element(&element, 800.0)
    }

    /// Absolute border-box rectangle of a document node.
    fn absolute_rect(layout: &LayoutResult, doc: &Document, node: DocNodeId) -> Option<Rect> {
        let own = layout.taffy.layout(*layout.nodes.get(&node)?).ok()?;
        let mut x = own.location.x;
        let mut y = own.location.y;
        for ancestor in doc.ancestors(node) {
            let l = layout.taffy.layout(*layout.nodes.get(&ancestor)?).ok()?;
            x += l.location.x;
            y += l.location.y;
        }
        Some(Rect {
            x,
            y,
            width: own.size.width,
            height: own.size.height,
        })
    }

    #[test]
    fn test_capture_is_placed_at_origin() {
        let doc = card_doc();
        let card = doc.node(doc.root()).children[1];
        let mut engine = LayoutEngine::new();
        let layout = engine.compute_layout(&doc).unwrap();

        let abs = absolute_rect(&layout, &doc, card).unwrap();
        assert_eq!((abs.x, abs.y), (10.0, 40.0));

        let tree = build_render_tree(&layout, &doc, card, &mut engine.text_engine).unwrap();
        assert_eq!(tree.width, 200.0);
        match &tree.commands[0] {
            RenderCommand::FillRect { rect, .. } => {
                assert_eq!((rect.x, rect.y), (0.0, 0.0));
            }
            other => panic!("expected background first, got {other:?}"),
        }
    }

    #[test]
    fn test_hidden_subtree_is_skipped() {
        let doc = card_doc();
        let card = doc.node(doc.root()).children[1];
        let mut engine = LayoutEngine::new();
        let layout = engine.compute_layout(&doc).unwrap();
        let tree = build_render_tree(&layout, &doc, card, &mut engine.text_engine).unwrap();

        let texts: Vec<String> = tree
            .commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::Text { lines, .. } => {
                    Some(lines.iter().map(|l| l.text()).collect::<String>())
                }
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hi".to_string()]);
    }

    #[test]
    fn test_accent_spans_follow_markup() {
        let mut doc = card_doc();
        let card = doc.node(doc.root()).children[1];
        let heading = doc.node(card).children[0];
        doc.set_text(heading, RichText::heading("a [b] c"));

        let mut engine = LayoutEngine::new();
        let layout = engine.compute_layout(&doc).unwrap();
        let tree = build_render_tree(&layout, &doc, card, &mut engine.text_engine).unwrap();

        let spans: Vec<(String, bool)> = tree
            .commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::Text { lines, .. } => Some(lines.clone()),
                _ => None,
            })
            .flatten()
            .flat_map(|l| l.spans)
            .map(|s| (s.text, s.accent))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("a ".to_string(), false),
                ("b".to_string(), true),
                (" c".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_align_offset() {
        assert_eq!(align_offset(TextAlign::Left, 100.0, 40.0), 0.0);
        assert_eq!(align_offset(TextAlign::Center, 100.0, 40.0), 30.0);
        assert_eq!(align_offset(TextAlign::Right, 100.0, 40.0), 60.0);
    }
}
