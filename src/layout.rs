//! Layout computation using Taffy.
//!
//! Builds a Taffy layout tree from a [`Document`] and computes layout at the
//! document's viewport width.

use std::collections::HashMap;

use taffy::prelude::*;
use taffy::style::Style;

use crate::document::{Document, NodeId as DocNodeId, NodeKind};
use crate::element::{
    self, AlignItems as ElemAlignItems, BorderRadius, BoxStyle, Color,
    FlexDirection as ElemFlexDirection, FlexStyle, ImageStyle, ObjectFit, Spacing, TextAlign,
    TextStyle,
};
use crate::text::TextLayoutEngine;

pub(crate) const DEFAULT_FONT_FAMILY: &str = "sans-serif";
pub(crate) const DEFAULT_FONT_SIZE: f32 = 16.0;
pub(crate) const DEFAULT_LINE_HEIGHT: f32 = 1.2;

/// Context attached to Taffy leaf nodes that need measurement.
#[derive(Debug, Clone)]
pub enum NodeContext {
    /// Text node that needs Parley for measurement
    Text(TextContext),
    /// Image with intrinsic dimensions
    Image { width: f32, height: f32 },
}

/// Text measurement context.
#[derive(Debug, Clone)]
pub struct TextContext {
    pub content: String,
    pub font_family: Option<String>,
    pub font_size: f32,
    pub font_weight: u16,
    pub line_height: f32,
}

/// Result of layout computation.
pub struct LayoutResult {
    /// The Taffy tree with computed layout
    pub taffy: TaffyTree<NodeContext>,
    /// Root node ID
    pub root: NodeId,
    /// Data for each laid out node
    pub node_data: HashMap<NodeId, NodeData>,
    /// Document node to Taffy node
    pub nodes: HashMap<DocNodeId, NodeId>,
}

impl LayoutResult {
    /// Width available to a node's content (border box minus padding).
    pub fn content_width(&self, node: DocNodeId) -> Option<f32> {
        let layout = self.taffy.layout(*self.nodes.get(&node)?).ok()?;
        let inset = layout.padding.left + layout.padding.right;
        Some((layout.size.width - inset).max(0.0))
    }
}

/// Data associated with each laid out node.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Document node this layout node was built from
    pub node: DocNodeId,
    /// The element type for rendering
    pub element_type: ElementType,
    /// Visual style for rendering
    pub visual: VisualStyle,
    /// Whether the node is displayed at all
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub enum ElementType {
    Box,
    Flex,
    Text { style: TextStyleResolved },
    Image { src: String, cross_origin: bool, object_fit: ObjectFit },
}

/// Resolved text style with defaults applied.
#[derive(Debug, Clone)]
pub struct TextStyleResolved {
    pub font_family: String,
    pub font_size: f32,
    pub font_weight: u16,
    pub line_height: f32,
    pub text_align: TextAlign,
    pub color: Color,
    pub accent_color: Option<Color>,
}

impl TextStyleResolved {
    pub fn resolve(style: &TextStyle) -> Self {
        Self {
            font_family: style
                .font_family
                .clone()
                .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
            font_size: style.font_size.unwrap_or(DEFAULT_FONT_SIZE),
            font_weight: style.font_weight.map(|w| w.0).unwrap_or(400),
            line_height: style.line_height.unwrap_or(DEFAULT_LINE_HEIGHT),
            text_align: style.text_align.unwrap_or_default(),
            color: style.color.unwrap_or(Color::BLACK),
            accent_color: style.accent_color,
        }
    }
}

/// Visual properties for rendering.
#[derive(Debug, Clone, Default)]
pub struct VisualStyle {
    pub background_color: Option<Color>,
    pub border_radius: [f32; 4],
}

/// Layout engine that builds and computes layout.
pub struct LayoutEngine {
    pub text_engine: TextLayoutEngine,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self {
            text_engine: TextLayoutEngine::new(),
        }
    }

    /// Build layout tree from the document and compute layout.
    pub fn compute_layout(&mut self, doc: &Document) -> Result<LayoutResult, LayoutError> {
        let mut taffy: TaffyTree<NodeContext> = TaffyTree::new();
        let mut node_data = HashMap::new();
        let mut nodes = HashMap::new();

        let root = build_node(&mut taffy, &mut node_data, &mut nodes, doc, doc.root())?;

        let available_space = Size {
            width: AvailableSpace::Definite(doc.viewport_width()),
            height: AvailableSpace::MaxContent,
        };

        let text_engine = &mut self.text_engine;

        taffy.compute_layout_with_measure(
            root,
            available_space,
            |known_dimensions, available_space, _node_id, node_context, _style| {
                measure_function(known_dimensions, available_space, node_context, text_engine)
            },
        )?;

        Ok(LayoutResult {
            taffy,
            root,
            node_data,
            nodes,
        })
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_node(
    taffy: &mut TaffyTree<NodeContext>,
    node_data: &mut HashMap<NodeId, NodeData>,
    nodes: &mut HashMap<DocNodeId, NodeId>,
    doc: &Document,
    doc_id: DocNodeId,
) -> Result<NodeId, LayoutError> {
    let node = doc.node(doc_id);
    let display = doc.effective_display(doc_id);
    let hidden = display == element::Display::None;

    let (node_id, element_type, visual) = match &node.kind {
        NodeKind::Box(style) => {
            let child_ids = node
                .children
                .iter()
                .map(|child| build_node(taffy, node_data, nodes, doc, *child))
                .collect::<Result<Vec<_>, _>>()?;
            let node_id = taffy.new_with_children(box_style_to_taffy(style, display), &child_ids)?;
            (node_id, ElementType::Box, box_visual(style))
        }
        NodeKind::Flex(style) => {
            let child_ids = node
                .children
                .iter()
                .map(|child| build_node(taffy, node_data, nodes, doc, *child))
                .collect::<Result<Vec<_>, _>>()?;
            let node_id = taffy.new_with_children(flex_style_to_taffy(style, display), &child_ids)?;
            (node_id, ElementType::Flex, flex_visual(style))
        }
        NodeKind::Text { content, style } => {
            let resolved = TextStyleResolved::resolve(style);
            let text_context = NodeContext::Text(TextContext {
                content: content.text.clone(),
                font_family: style.font_family.clone(),
                font_size: resolved.font_size,
                font_weight: resolved.font_weight,
                line_height: resolved.line_height,
            });
            let node_id =
                taffy.new_leaf_with_context(text_style_to_taffy(style, display), text_context)?;
            (node_id, ElementType::Text { style: resolved }, VisualStyle::default())
        }
        NodeKind::Image {
            src,
            width,
            height,
            style,
            cross_origin,
        } => {
            let image_context = NodeContext::Image {
                width: *width,
                height: *height,
            };
            let node_id = taffy.new_leaf_with_context(
                image_style_to_taffy(style, *width, *height, display),
                image_context,
            )?;
            let visual = VisualStyle {
                border_radius: corners(&style.border_radius),
                ..Default::default()
            };
            let element_type = ElementType::Image {
                src: src.clone(),
                cross_origin: *cross_origin,
                object_fit: style.object_fit.unwrap_or_default(),
            };
            (node_id, element_type, visual)
        }
    };

    node_data.insert(
        node_id,
        NodeData {
            node: doc_id,
            element_type,
            visual,
            hidden,
        },
    );
    nodes.insert(doc_id, node_id);

    Ok(node_id)
}

fn corners(radius: &Option<BorderRadius>) -> [f32; 4] {
    radius.as_ref().map(|r| r.to_corners()).unwrap_or([0.0; 4])
}

fn box_visual(style: &BoxStyle) -> VisualStyle {
    VisualStyle {
        background_color: style.background_color,
        border_radius: corners(&style.border_radius),
    }
}

fn flex_visual(style: &FlexStyle) -> VisualStyle {
    VisualStyle {
        background_color: style.background_color,
        border_radius: corners(&style.border_radius),
    }
}

/// Measure function for leaf nodes.
fn measure_function(
    known_dimensions: Size<Option<f32>>,
    available_space: Size<AvailableSpace>,
    node_context: Option<&mut NodeContext>,
    text_engine: &mut TextLayoutEngine,
) -> Size<f32> {
    match node_context {
        Some(NodeContext::Text(ctx)) => {
            if let (Some(width), Some(height)) = (known_dimensions.width, known_dimensions.height) {
                return Size { width, height };
            }

            let available_width = match known_dimensions.width {
                Some(w) => Some(w),
                None => match available_space.width {
                    AvailableSpace::Definite(w) => Some(w),
                    AvailableSpace::MinContent => Some(0.0),
                    AvailableSpace::MaxContent => None,
                },
            };

            let measured = text_engine.measure(
                &ctx.content,
                ctx.font_family.as_deref(),
                ctx.font_weight,
                ctx.font_size,
                ctx.line_height,
                available_width,
            );
            Size {
                width: known_dimensions.width.unwrap_or(measured.width),
                height: known_dimensions.height.unwrap_or(measured.height),
            }
        }
        Some(NodeContext::Image { width, height }) => Size {
            width: known_dimensions.width.unwrap_or(*width),
            height: known_dimensions.height.unwrap_or(*height),
        },
        None => Size::ZERO,
    }
}

// ============================================================================
// Style conversion functions
// ============================================================================

fn to_taffy_display(display: element::Display) -> taffy::Display {
    match display {
        element::Display::None => taffy::Display::None,
        element::Display::Block => taffy::Display::Block,
        element::Display::Flex => taffy::Display::Flex,
    }
}

fn box_style_to_taffy(style: &BoxStyle, display: element::Display) -> Style {
    Style {
        display: to_taffy_display(display),
        size: Size {
            width: pixels_to_taffy(style.width),
            height: pixels_to_taffy(style.height),
        },
        padding: spacing_to_taffy_rect(&style.padding),
        ..Default::default()
    }
}

fn flex_style_to_taffy(style: &FlexStyle, display: element::Display) -> Style {
    Style {
        display: to_taffy_display(display),
        size: Size {
            width: pixels_to_taffy(style.width),
            height: pixels_to_taffy(style.height),
        },
        padding: spacing_to_taffy_rect(&style.padding),
        flex_direction: match style.flex_direction {
            Some(ElemFlexDirection::Row) | None => taffy::FlexDirection::Row,
            Some(ElemFlexDirection::Column) => taffy::FlexDirection::Column,
            Some(ElemFlexDirection::RowReverse) => taffy::FlexDirection::RowReverse,
            Some(ElemFlexDirection::ColumnReverse) => taffy::FlexDirection::ColumnReverse,
        },
        align_items: Some(match style.align_items {
            Some(ElemAlignItems::FlexStart) => taffy::AlignItems::FlexStart,
            Some(ElemAlignItems::FlexEnd) => taffy::AlignItems::FlexEnd,
            Some(ElemAlignItems::Center) => taffy::AlignItems::Center,
            Some(ElemAlignItems::Stretch) | None => taffy::AlignItems::Stretch,
            Some(ElemAlignItems::Baseline) => taffy::AlignItems::Baseline,
        }),
        gap: Size {
            width: length(style.gap.unwrap_or(0.0)),
            height: length(style.gap.unwrap_or(0.0)),
        },
        ..Default::default()
    }
}

fn text_style_to_taffy(style: &TextStyle, display: element::Display) -> Style {
    Style {
        display: match display {
            element::Display::None => taffy::Display::None,
            _ => taffy::Display::Block,
        },
        flex_grow: style.flex_grow.unwrap_or(0.0),
        flex_shrink: style.flex_shrink.unwrap_or(1.0),
        ..Default::default()
    }
}

fn image_style_to_taffy(
    style: &ImageStyle,
    intrinsic_width: f32,
    intrinsic_height: f32,
    display: element::Display,
) -> Style {
    Style {
        display: match display {
            element::Display::None => taffy::Display::None,
            _ => taffy::Display::Block,
        },
        size: Size {
            width: length(intrinsic_width),
            height: length(intrinsic_height),
        },
        flex_grow: style.flex_grow.unwrap_or(0.0),
        flex_shrink: style.flex_shrink.unwrap_or(1.0),
        ..Default::default()
    }
}

fn pixels_to_taffy(px: Option<f32>) -> taffy::Dimension {
    px.map(taffy::Dimension::length).unwrap_or(taffy::Dimension::auto())
}

fn spacing_to_taffy_rect(spacing: &Option<Spacing>) -> Rect<LengthPercentage> {
    let [top, right, bottom, left] = spacing.as_ref().map(|s| s.to_edges()).unwrap_or([0.0; 4]);
    Rect {
        top: LengthPercentage::length(top),
        right: LengthPercentage::length(right),
        bottom: LengthPercentage::length(bottom),
        left: LengthPercentage::length(left),
    }
}

/// Layout error type.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Taffy error: {0}")]
    Taffy(#[from] taffy::TaffyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn doc(viewport: f32) -> Document {
        let json = r###"{
            "type": "box",
            "style": { "collapseBelow": 600 },
            "children": [
                { "type": "flex", "style": { "width": 500, "padding": 20, "flexDirection": "column" }, "children": [
                    { "type": "text", "content": "Hello", "style": { "fontSize": 20 } },
                    { "type": "image", "src": "", "width": 120, "height": 80 }
                ]}
            ]
        }"###;
        let element: Element = serde_json::from_str(json).unwrap();
        Document::from_element(&element, viewport)
    }

    #[test]
    fn test_content_width_excludes_padding() {
        let doc = doc(1024.0);
        let mut engine = LayoutEngine::new();
        let layout = engine.compute_layout(&doc).unwrap();

        let flex = doc.node(doc.root()).children[0];
        assert_eq!(layout.content_width(flex), Some(460.0));

        let text = doc.node(flex).children[0];
        assert_eq!(layout.content_width(text), Some(460.0));
    }

    #[test]
    fn test_collapsed_container_has_zero_size() {
        let doc = doc(480.0);
        let mut engine = LayoutEngine::new();
        let layout = engine.compute_layout(&doc).unwrap();

        let flex = doc.node(doc.root()).children[0];
        let taffy_id = layout.nodes[&flex];
        assert_eq!(layout.taffy.layout(taffy_id).unwrap().size.width, 0.0);
        assert!(layout.node_data[&layout.root].hidden);
    }
}
