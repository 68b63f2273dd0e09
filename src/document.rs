//! Mutable preview surface.
//!
//! A [`Document`] is an arena of nodes built from a template [`Element`] tree. The card
//! controller writes field text, font sizes and image sources into it; layout and
//! rasterization read it back.

use std::ops::Range;

use crate::element::{BoxStyle, Display, Element, FlexStyle, ImageStyle, TextStyle};

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Text with accent runs.
///
/// Accent ranges are byte ranges into `text` and never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    pub text: String,
    pub accents: Vec<Range<usize>>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accents: Vec::new(),
        }
    }

    /// Parse heading markup: `[word]` becomes an accent run and the brackets are
    /// dropped. Empty brackets and unclosed brackets stay literal.
    pub fn heading(input: &str) -> Self {
        let mut text = String::with_capacity(input.len());
        let mut accents = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            match after.find(']') {
                Some(close) if close > 0 && !after[..close].contains('[') => {
                    text.push_str(&rest[..open]);
                    let start = text.len();
                    text.push_str(&after[..close]);
                    accents.push(start..text.len());
                    rest = &after[close + 1..];
                }
                _ => {
                    text.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }
        text.push_str(rest);

        Self { text, accents }
    }

    /// Split `range` into `(sub_range, is_accent)` segments in order.
    pub fn segments(&self, range: Range<usize>) -> Vec<(Range<usize>, bool)> {
        let mut segments = Vec::new();
        let mut cursor = range.start;
        for accent in &self.accents {
            let start = accent.start.max(range.start);
            let end = accent.end.min(range.end);
            if start >= end {
                continue;
            }
            if cursor < start {
                segments.push((cursor..start, false));
            }
            segments.push((start..end, true));
            cursor = end;
        }
        if cursor < range.end {
            segments.push((cursor..range.end, false));
        }
        segments
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Box(BoxStyle),
    Flex(FlexStyle),
    Text {
        content: RichText,
        style: TextStyle,
    },
    Image {
        src: String,
        width: f32,
        height: f32,
        style: ImageStyle,
        /// Whether the image may be sampled by the rasterizer.
        cross_origin: bool,
    },
}

impl NodeKind {
    /// Type name used by type selectors.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Box(_) => "box",
            NodeKind::Flex(_) => "flex",
            NodeKind::Text { .. } => "text",
            NodeKind::Image { .. } => "image",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Inline display override, as set by scripts. `None` leaves the template's style.
    pub inline_display: Option<Display>,
}

impl Node {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// The preview node tree of one card.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    viewport_width: f32,
}

impl Document {
    /// Build a document from a template element tree.
    pub fn from_element(element: &Element, viewport_width: f32) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            viewport_width,
        };
        doc.insert(element, None);
        doc
    }

    fn insert(&mut self, element: &Element, parent: Option<NodeId>) -> NodeId {
        let node_id = NodeId(self.nodes.len());
        let (kind, children) = match element {
            Element::Box {
                style, children, ..
            } => (NodeKind::Box(style.clone()), children.as_slice()),
            Element::Flex {
                style, children, ..
            } => (NodeKind::Flex(style.clone()), children.as_slice()),
            Element::Text { content, style, .. } => (
                NodeKind::Text {
                    content: RichText::plain(content.clone()),
                    style: style.clone(),
                },
                &[][..],
            ),
            Element::Image {
                src,
                width,
                height,
                style,
                ..
            } => (
                NodeKind::Image {
                    src: src.clone(),
                    width: *width,
                    height: *height,
                    style: style.clone(),
                    cross_origin: false,
                },
                &[][..],
            ),
        };

        self.nodes.push(Node {
            id: element.id().map(str::to_string),
            classes: element.classes(),
            parent,
            children: Vec::new(),
            kind,
            inline_display: None,
        });

        for child in children {
            let child_id = self.insert(child, Some(node_id));
            self.nodes[node_id.0].children.push(child_id);
        }

        node_id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |p| self.node(*p).parent)
    }

    /// Descendants of `scope` in document order, excluding `scope` itself.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(scope).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// The display value layout should use, after inline overrides and responsive
    /// collapse rules.
    pub fn effective_display(&self, id: NodeId) -> Display {
        let node = self.node(id);
        if let Some(display) = node.inline_display {
            return display;
        }
        let (display, collapse_below, natural) = match &node.kind {
            NodeKind::Box(style) => (style.display, style.collapse_below, Display::Block),
            NodeKind::Flex(style) => (style.display, style.collapse_below, Display::Flex),
            NodeKind::Text { .. } | NodeKind::Image { .. } => (None, None, Display::Block),
        };
        if collapse_below.is_some_and(|bp| self.viewport_width <= bp) {
            return Display::None;
        }
        display.unwrap_or(natural)
    }

    /// Whether the node and all of its ancestors are displayed.
    pub fn is_displayed(&self, id: NodeId) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .all(|n| self.effective_display(n) != Display::None)
    }

    /// Replace a text node's content. Returns `false` for non-text nodes.
    pub fn set_text(&mut self, id: NodeId, text: RichText) -> bool {
        match &mut self.node_mut(id).kind {
            NodeKind::Text { content, .. } => {
                *content = text;
                true
            }
            _ => false,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&RichText> {
        match &self.node(id).kind {
            NodeKind::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Set inline font size and line-height ratio on a text node.
    pub fn set_font_size(&mut self, id: NodeId, font_size: f32, line_height: f32) -> bool {
        match &mut self.node_mut(id).kind {
            NodeKind::Text { style, .. } => {
                style.font_size = Some(font_size);
                style.line_height = Some(line_height);
                true
            }
            _ => false,
        }
    }

    pub fn font_size(&self, id: NodeId) -> Option<f32> {
        match &self.node(id).kind {
            NodeKind::Text { style, .. } => style.font_size,
            _ => None,
        }
    }

    /// Set an image node's source and mark it cross-origin-safe.
    pub fn set_image_src(&mut self, id: NodeId, src: &str) -> bool {
        match &mut self.node_mut(id).kind {
            NodeKind::Image {
                src: current,
                cross_origin,
                ..
            } => {
                *current = src.to_string();
                *cross_origin = true;
                true
            }
            _ => false,
        }
    }

    pub fn image_src(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Image { src, .. } => Some(src),
            _ => None,
        }
    }

    /// Mark every image in the document as cross-origin-safe.
    pub fn mark_images_cross_origin(&mut self) -> usize {
        let mut marked = 0;
        for node in &mut self.nodes {
            if let NodeKind::Image { cross_origin, .. } = &mut node.kind {
                *cross_origin = true;
                marked += 1;
            }
        }
        marked
    }
}
