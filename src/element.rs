//! Element types for card templates.
//!
//! Defines the JSON element tree a template is written in. The tree is parsed once and
//! turned into a mutable [`Document`](crate::document::Document) that the card
//! controller edits.

use serde::Deserialize;

/// Template element - Box, Flex, Text, or Image.
///
/// Every element may carry an `id` and a space-separated `class` list; selectors in
/// card configs resolve against those.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// Block container element
    Box {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        style: BoxStyle,
        #[serde(default)]
        children: Vec<Element>,
    },
    /// Flex container element
    Flex {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        style: FlexStyle,
        #[serde(default)]
        children: Vec<Element>,
    },
    /// Text leaf element
    Text {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        content: String,
        #[serde(default)]
        style: TextStyle,
    },
    /// Image element with intrinsic dimensions
    Image {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        src: String,
        width: f32,
        height: f32,
        #[serde(default)]
        style: ImageStyle,
    },
}

impl Element {
    /// The element's `id` attribute.
    pub fn id(&self) -> Option<&str> {
        match self {
            Element::Box { id, .. }
            | Element::Flex { id, .. }
            | Element::Text { id, .. }
            | Element::Image { id, .. } => id.as_deref(),
        }
    }

    /// The element's class names, split on whitespace.
    pub fn classes(&self) -> Vec<String> {
        let class = match self {
            Element::Box { class, .. }
            | Element::Flex { class, .. }
            | Element::Text { class, .. }
            | Element::Image { class, .. } => class.as_deref(),
        };
        class
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Spacing types
// ============================================================================

/// Padding - a single number or a space-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Spacing {
    Uniform(f32),
    Multi(String), // e.g., "10 20" or "10 20 30 40"
}

impl Default for Spacing {
    fn default() -> Self {
        Spacing::Uniform(0.0)
    }
}

impl Spacing {
    /// Parse into [top, right, bottom, left] values.
    pub fn to_edges(&self) -> [f32; 4] {
        match self {
            Spacing::Uniform(v) => [*v, *v, *v, *v],
            Spacing::Multi(s) => {
                let parts: Vec<f32> = s
                    .split_whitespace()
                    .filter_map(|p| p.parse().ok())
                    .collect();
                match parts.len() {
                    1 => [parts[0], parts[0], parts[0], parts[0]],
                    2 => [parts[0], parts[1], parts[0], parts[1]], // vertical, horizontal
                    3 => [parts[0], parts[1], parts[2], parts[1]], // top, horizontal, bottom
                    4 => [parts[0], parts[1], parts[2], parts[3]], // top, right, bottom, left
                    _ => [0.0, 0.0, 0.0, 0.0],
                }
            }
        }
    }
}

/// Border radius - single value or per-corner.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BorderRadius {
    Uniform(f32),
    Multi(String), // e.g., "8 8 0 0" for top-left, top-right, bottom-right, bottom-left
}

impl Default for BorderRadius {
    fn default() -> Self {
        BorderRadius::Uniform(0.0)
    }
}

impl BorderRadius {
    /// Parse into [top-left, top-right, bottom-right, bottom-left] values.
    pub fn to_corners(&self) -> [f32; 4] {
        match self {
            BorderRadius::Uniform(v) => [*v, *v, *v, *v],
            BorderRadius::Multi(s) => {
                let parts: Vec<f32> = s
                    .split_whitespace()
                    .filter_map(|p| p.parse().ok())
                    .collect();
                match parts.len() {
                    1 => [parts[0], parts[0], parts[0], parts[0]],
                    2 => [parts[0], parts[1], parts[0], parts[1]],
                    4 => [parts[0], parts[1], parts[2], parts[3]],
                    _ => [0.0, 0.0, 0.0, 0.0],
                }
            }
        }
    }
}

// ============================================================================
// Color type
// ============================================================================

/// Color value - supports hex (#RGB, #RRGGBB, #RRGGBBAA) and rgb/rgba functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self { r: 0, g: 0, b: 0, a: 0 };
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Self = Self { r: 255, g: 255, b: 255, a: 255 };

    /// Convert to CSS color string for SVG output.
    pub fn to_css(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else if self.a == 0 {
            "none".to_string()
        } else {
            format!(
                "rgba({},{},{},{:.3})",
                self.r,
                self.g,
                self.b,
                self.a as f32 / 255.0
            )
        }
    }

    /// Parse a color string.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        if let Some(hex) = s.strip_prefix('#') {
            return match hex.len() {
                3 => {
                    let r = u8::from_str_radix(hex.get(0..1)?, 16).ok()? * 17;
                    let g = u8::from_str_radix(hex.get(1..2)?, 16).ok()? * 17;
                    let b = u8::from_str_radix(hex.get(2..3)?, 16).ok()? * 17;
                    Some(Self { r, g, b, a: 255 })
                }
                6 => {
                    let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                    let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                    let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                    Some(Self { r, g, b, a: 255 })
                }
                8 => {
                    let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                    let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                    let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                    let a = u8::from_str_radix(hex.get(6..8)?, 16).ok()?;
                    Some(Self { r, g, b, a })
                }
                _ => None,
            };
        }

        // rgb(r, g, b) or rgba(r, g, b, a)
        if s.starts_with("rgb") {
            let inner = s
                .trim_start_matches("rgba")
                .trim_start_matches("rgb")
                .trim_start_matches('(')
                .trim_end_matches(')');
            let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();

            if parts.len() >= 3 {
                let r = parts[0].parse().ok()?;
                let g = parts[1].parse().ok()?;
                let b = parts[2].parse().ok()?;
                let a = if parts.len() >= 4 {
                    let a_float: f32 = parts[3].parse().ok()?;
                    (a_float * 255.0) as u8
                } else {
                    255
                };
                return Some(Self { r, g, b, a });
            }
        }

        match s.to_lowercase().as_str() {
            "transparent" => Some(Self::TRANSPARENT),
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid color: {}", s)))
    }
}

// ============================================================================
// Enum types for flex properties
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Display {
    #[default]
    Block,
    Flex,
    None,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlexDirection {
    #[default]
    Row,
    Column,
    RowReverse,
    ColumnReverse,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignItems {
    FlexStart,
    FlexEnd,
    Center,
    #[default]
    Stretch,
    Baseline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    #[default]
    Contain,
    Cover,
    Fill,
}

/// Font weight - can be a number (100-900) or keyword.
#[derive(Debug, Clone, Copy)]
pub struct FontWeight(pub u16);

impl Default for FontWeight {
    fn default() -> Self {
        Self(400)
    }
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum FontWeightValue {
            Number(u16),
            String(String),
        }

        match FontWeightValue::deserialize(deserializer)? {
            FontWeightValue::Number(n) => Ok(FontWeight(n)),
            FontWeightValue::String(s) => match s.to_lowercase().as_str() {
                "normal" => Ok(FontWeight(400)),
                "bold" => Ok(FontWeight(700)),
                _ => s
                    .parse()
                    .map(FontWeight)
                    .map_err(|_| serde::de::Error::custom("invalid font weight")),
            },
        }
    }
}

// ============================================================================
// Style structs
// ============================================================================

/// Style for Box elements (block container).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoxStyle {
    pub display: Option<Display>,
    /// Hide the element while the viewport is at most this wide.
    pub collapse_below: Option<f32>,

    /// Fixed width in pixels
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub padding: Option<Spacing>,

    pub background_color: Option<Color>,
    pub border_radius: Option<BorderRadius>,
}

/// Style for Flex elements (flex container).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlexStyle {
    pub display: Option<Display>,
    /// Hide the element while the viewport is at most this wide.
    pub collapse_below: Option<f32>,

    pub width: Option<f32>,
    pub height: Option<f32>,
    pub padding: Option<Spacing>,

    pub flex_direction: Option<FlexDirection>,
    pub align_items: Option<AlignItems>,
    pub gap: Option<f32>,

    pub background_color: Option<Color>,
    pub border_radius: Option<BorderRadius>,
}

/// Style for Text elements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub font_weight: Option<FontWeight>,
    pub line_height: Option<f32>,
    pub text_align: Option<TextAlign>,
    pub color: Option<Color>,
    /// Color for `[bracketed]` heading runs.
    pub accent_color: Option<Color>,

    pub flex_grow: Option<f32>,
    pub flex_shrink: Option<f32>,
}

/// Style for Image elements. The box is always the element's intrinsic
/// `width`/`height`; `objectFit` places the picture inside it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageStyle {
    pub object_fit: Option<ObjectFit>,
    pub border_radius: Option<BorderRadius>,

    pub flex_grow: Option<f32>,
    pub flex_shrink: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_element_with_attributes() {
        let json = r###"{
            "type": "flex",
            "id": "id-card",
            "class": "card  card--cover",
            "style": { "flexDirection": "column", "width": 400, "padding": 20, "backgroundColor": "#fff" },
            "children": [
                {
                    "type": "text",
                    "class": "design-heading",
                    "content": "Hello World",
                    "style": { "fontSize": 24, "color": "#333", "accentColor": "#f0a" }
                }
            ]
        }"###;

        let element: Element = serde_json::from_str(json).unwrap();
        assert_eq!(element.id(), Some("id-card"));
        assert_eq!(element.classes(), vec!["card", "card--cover"]);
        match element {
            Element::Flex { style, children, .. } => {
                assert!(matches!(style.flex_direction, Some(FlexDirection::Column)));
                assert_eq!(children.len(), 1);
                match &children[0] {
                    Element::Text { style, .. } => {
                        assert_eq!(style.accent_color, Color::parse("#ff00aa"));
                    }
                    _ => panic!("Expected Text element"),
                }
            }
            _ => panic!("Expected Flex element"),
        }
    }

    #[test]
    fn test_collapse_below() {
        let json = r###"{ "type": "box", "style": { "collapseBelow": 1024 } }"###;
        let element: Element = serde_json::from_str(json).unwrap();
        match element {
            Element::Box { style, .. } => assert_eq!(style.collapse_below, Some(1024.0)),
            _ => panic!("Expected Box element"),
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(Color::parse("#fff").unwrap().r, 255);
        assert_eq!(Color::parse("#000000").unwrap().r, 0);
        assert_eq!(
            Color::parse("#3B1A35"),
            Some(Color { r: 0x3b, g: 0x1a, b: 0x35, a: 255 })
        );
        assert_eq!(Color::parse("rgb(255, 0, 0)").unwrap().r, 255);
        assert_eq!(Color::parse("rgba(0, 0, 255, 0.5)").unwrap().a, 127);
        assert_eq!(Color::parse("#12"), None);
    }

    #[test]
    fn test_spacing_edges() {
        assert_eq!(Spacing::Uniform(10.0).to_edges(), [10.0, 10.0, 10.0, 10.0]);
        assert_eq!(
            Spacing::Multi("10 20".to_string()).to_edges(),
            [10.0, 20.0, 10.0, 20.0]
        );
        assert_eq!(
            Spacing::Multi("10 20 30 40".to_string()).to_edges(),
            [10.0, 20.0, 30.0, 40.0]
        );
    }

    #[test]
    fn test_styles_reject_percent_widths() {
        let json = r###"{ "type": "box", "style": { "width": "50%" } }"###;
        assert!(serde_json::from_str::<Element>(json).is_err());
    }

    #[test]
    fn test_unknown_style_keys_are_ignored() {
        let json = r###"{
            "type": "image", "src": "", "width": 342, "height": 342,
            "style": { "objectFit": "cover", "margin": 8, "opacity": 0.5 }
        }"###;
        let element: Element = serde_json::from_str(json).unwrap();
        match element {
            Element::Image { width, style, .. } => {
                assert_eq!(width, 342.0);
                assert_eq!(style.object_fit, Some(ObjectFit::Cover));
            }
            _ => panic!("Expected Image element"),
        }
    }
}
