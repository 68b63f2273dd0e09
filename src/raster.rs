//! Rasterization of a card subtree.
//!
//! The native path lays the document out, emits SVG for the capture root and
//! renders that with `resvg` into an RGBA canvas.

use std::sync::Arc;

use image::RgbaImage;
use resvg::tiny_skia::{self, Pixmap, Transform};
use resvg::usvg;

use crate::document::{Document, NodeId, NodeKind};
use crate::element::Color;
use crate::layout::{LayoutEngine, LayoutError};
use crate::render::build_render_tree;
use crate::svg::{SvgOptions, generate_svg};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("capture root was not laid out")]
    NotLaidOut,
    #[error("capture root has zero size")]
    EmptyCapture,
    #[error("remote image {src} is not cross-origin enabled")]
    TaintedImage { src: String },
    #[error("SVG parse error: {0}")]
    Svg(#[from] usvg::Error),
    #[error("could not allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
}

/// Settings for one rasterization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    pub background: Color,
    /// Device pixels per layout pixel
    pub scale: f32,
    /// Request remote images with CORS
    pub cross_origin: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            background: Color::TRANSPARENT,
            scale: 1.0,
            cross_origin: true,
        }
    }
}

/// Turns a document subtree into pixels.
pub trait Rasterizer {
    fn rasterize(
        &mut self,
        doc: &Document,
        root: NodeId,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RenderError>;
}

/// Render the subtree at `root` as an SVG string.
pub fn render_svg(
    engine: &mut LayoutEngine,
    doc: &Document,
    root: NodeId,
    options: &SvgOptions,
) -> Result<(String, f32, f32), RenderError> {
    let layout = engine.compute_layout(doc)?;
    let tree = build_render_tree(&layout, doc, root, &mut engine.text_engine)
        .ok_or(RenderError::NotLaidOut)?;
    Ok((generate_svg(&tree, options), tree.width, tree.height))
}

/// Remote images under `root` that would taint the canvas.
fn tainted_images(doc: &Document, root: NodeId, cross_origin: bool) -> Option<String> {
    std::iter::once(root)
        .chain(doc.descendants(root))
        .filter(|id| doc.is_displayed(*id))
        .find_map(|id| match &doc.node(id).kind {
            NodeKind::Image {
                src,
                cross_origin: marked,
                ..
            } if is_remote(src) && !(cross_origin && *marked) => Some(src.clone()),
            _ => None,
        })
}

fn is_remote(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// SVG-backed rasterizer using `resvg`.
pub struct SvgRasterizer {
    layout: LayoutEngine,
    fontdb: Arc<usvg::fontdb::Database>,
}

impl SvgRasterizer {
    /// Rasterizer with the system fonts loaded.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Self {
            layout: LayoutEngine::new(),
            fontdb: Arc::new(db),
        }
    }

    /// Make a font available to both measurement and drawing.
    pub fn register_font(&mut self, data: Vec<u8>) -> Vec<String> {
        Arc::make_mut(&mut self.fontdb).load_font_data(data.clone());
        self.layout.text_engine.register_font(data)
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(
        &mut self,
        doc: &Document,
        root: NodeId,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RenderError> {
        if let Some(src) = tainted_images(doc, root, options.cross_origin) {
            tracing::error!(%src, "refusing to sample tainted image");
            return Err(RenderError::TaintedImage { src });
        }

        let svg_options = SvgOptions {
            xml_declaration: false,
            ..Default::default()
        };
        let (svg, width, height) = render_svg(&mut self.layout, doc, root, &svg_options)?;
        if width <= 0.0 || height <= 0.0 {
            return Err(RenderError::EmptyCapture);
        }

        let mut opt = usvg::Options::default();
        opt.fontdb = self.fontdb.clone();
        let tree = usvg::Tree::from_str(&svg, &opt)?;

        let scale = if options.scale > 0.0 { options.scale } else { 1.0 };
        let px_width = (width * scale).ceil() as u32;
        let px_height = (height * scale).ceil() as u32;
        let mut pixmap = Pixmap::new(px_width, px_height).ok_or(RenderError::Canvas {
            width: px_width,
            height: px_height,
        })?;

        let bg = options.background;
        pixmap.fill(tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        let data = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect::<Vec<u8>>();
        RgbaImage::from_raw(px_width, px_height, data).ok_or(RenderError::Canvas {
            width: px_width,
            height: px_height,
        })
    }
}
