//! Card export: rasterize, encode, name and download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::document::{Document, NodeId};
use crate::element::{Color, Display};
use crate::encode::{Blob, EncodeError, NativePngEncoder, PngEncoder};
use crate::layout::LayoutError;
use crate::raster::{RasterOptions, Rasterizer, RenderError, SvgRasterizer};
use crate::validation::{MissingFields, ValidationGate};

/// User message shown for any failure after the gate.
pub const EXPORT_FAILED_MESSAGE: &str = "There was an issue generating the image. Try again.";

/// Export settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    /// Canvas fill behind the card
    pub background: Color,
    /// Device pixels per layout pixel
    pub scale: f32,
    /// Viewport width at or below which the preview container is forced visible
    pub breakpoint: f32,
    /// Base file name when the heading is empty
    pub fallback_name: String,
    pub idle_label: String,
    pub busy_label: String,
    pub cross_origin: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            background: Color {
                r: 0x3B,
                g: 0x1A,
                b: 0x35,
                a: 255,
            },
            scale: 4.0,
            breakpoint: 1024.0,
            fallback_name: "design".to_string(),
            idle_label: "Download".to_string(),
            busy_label: "Downloading…".to_string(),
            cross_origin: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{0}")]
    Incomplete(MissingFields),
    #[error("an export is already in progress")]
    Busy,
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
}

impl ExportError {
    /// Message suitable for an alert.
    pub fn user_message(&self) -> String {
        match self {
            ExportError::Incomplete(missing) => missing.to_string(),
            ExportError::Busy => "An export is already in progress.".to_string(),
            ExportError::Render(_) | ExportError::Encode(_) | ExportError::Download(_) => {
                EXPORT_FAILED_MESSAGE.to_string()
            }
        }
    }
}

/// Per-card count of downloads by base name.
#[derive(Debug, Clone, Default)]
pub struct DownloadCounter {
    counts: HashMap<String, u32>,
}

impl DownloadCounter {
    /// Bump the count for `base` and return the file name to use.
    pub fn allocate(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        filename(base, *count)
    }

    pub fn count(&self, base: &str) -> u32 {
        self.counts.get(base).copied().unwrap_or(0)
    }
}

/// `base.png` for the first download, `base-n.png` after that.
pub fn filename(base: &str, n: u32) -> String {
    if n > 1 {
        format!("{base}-{n}.png")
    } else {
        format!("{base}.png")
    }
}

/// Base name for a heading, falling back when it is blank.
pub fn base_name<'a>(heading: &'a str, fallback: &'a str) -> &'a str {
    match heading.trim() {
        "" => fallback,
        trimmed => trimmed,
    }
}

/// Receives finished files.
pub trait Downloader {
    fn download(&mut self, blob: &Blob, filename: &str) -> Result<(), DownloadError>;
}

/// Writes downloads into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a logical file name lands on disk.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        let safe: String = filename
            .chars()
            .map(|c| match c {
                '/' | '\\' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let safe = match safe.as_str() {
            "" | "." | ".." => "_".to_string(),
            _ => safe,
        };
        self.dir.join(safe)
    }
}

impl Downloader for DirectoryDownloader {
    fn download(&mut self, blob: &Blob, filename: &str) -> Result<(), DownloadError> {
        let path = self.path_for(filename);
        std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, &blob.bytes))
            .map_err(|source| DownloadError::Io { path, source })
    }
}

/// Keeps downloads in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingDownloader {
    pub downloads: Vec<(String, Blob)>,
}

impl Downloader for CollectingDownloader {
    fn download(&mut self, blob: &Blob, filename: &str) -> Result<(), DownloadError> {
        self.downloads.push((filename.to_string(), blob.clone()));
        Ok(())
    }
}

/// Export button state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUi {
    pub label: String,
    pub in_progress: bool,
}

impl ExportUi {
    pub fn new(options: &ExportOptions) -> Self {
        Self {
            label: options.idle_label.clone(),
            in_progress: false,
        }
    }
}

/// Holds the busy state for the length of an export.
///
/// Dropping the scope restores the label and the container's inline display.
pub struct ExportScope<'a> {
    ui: &'a mut ExportUi,
    doc: &'a mut Document,
    idle_label: String,
    forced: Option<(NodeId, Option<Display>)>,
}

impl<'a> ExportScope<'a> {
    pub fn enter(
        ui: &'a mut ExportUi,
        doc: &'a mut Document,
        container: Option<NodeId>,
        options: &ExportOptions,
    ) -> Result<Self, ExportError> {
        if ui.in_progress {
            return Err(ExportError::Busy);
        }
        ui.in_progress = true;
        ui.label = options.busy_label.clone();

        let forced = match container {
            Some(id) if doc.viewport_width() <= options.breakpoint => {
                let node = doc.node_mut(id);
                let prior = node.inline_display.replace(Display::Block);
                Some((id, prior))
            }
            _ => None,
        };

        Ok(Self {
            ui,
            doc,
            idle_label: options.idle_label.clone(),
            forced,
        })
    }

    pub fn document(&mut self) -> &mut Document {
        self.doc
    }
}

impl Drop for ExportScope<'_> {
    fn drop(&mut self) {
        if let Some((id, prior)) = self.forced.take() {
            self.doc.node_mut(id).inline_display = prior;
        }
        self.ui.label = std::mem::take(&mut self.idle_label);
        self.ui.in_progress = false;
    }
}

/// Runs on the document after the scope forces the preview visible and
/// before capture.
pub type PrepareCapture<'a> = dyn FnMut(&mut Document) -> Result<(), LayoutError> + 'a;

/// Everything an export needs from one card.
pub struct ExportJob<'a> {
    pub doc: &'a mut Document,
    pub root: NodeId,
    pub container: Option<NodeId>,
    pub ui: &'a mut ExportUi,
    pub gate: &'a ValidationGate,
    pub heading: &'a str,
    pub counter: &'a mut DownloadCounter,
    pub prepare: Option<&'a mut PrepareCapture<'a>>,
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// Rasterizer and encoder pair plus export settings.
pub struct ExportPipeline<R: Rasterizer = SvgRasterizer, E: PngEncoder = NativePngEncoder> {
    pub rasterizer: R,
    pub encoder: E,
    pub options: ExportOptions,
}

impl ExportPipeline {
    /// Pipeline on the native rasterizer and encoder.
    pub fn native(options: ExportOptions) -> Self {
        Self::new(SvgRasterizer::new(), NativePngEncoder, options)
    }
}

impl<R: Rasterizer, E: PngEncoder> ExportPipeline<R, E> {
    pub fn new(rasterizer: R, encoder: E, options: ExportOptions) -> Self {
        Self {
            rasterizer,
            encoder,
            options,
        }
    }

    pub fn run(
        &mut self,
        job: ExportJob<'_>,
        downloader: &mut dyn Downloader,
    ) -> Result<ExportOutcome, ExportError> {
        if let Some(missing) = job.gate.missing() {
            return Err(ExportError::Incomplete(missing));
        }

        let mut scope = ExportScope::enter(job.ui, job.doc, job.container, &self.options)?;
        let prepared = match job.prepare {
            Some(prepare) => prepare(scope.document()).map_err(RenderError::from),
            None => Ok(()),
        };
        let result = match prepared {
            Ok(()) => self.capture(scope.document(), job.root, job.heading, job.counter, downloader),
            Err(err) => Err(err.into()),
        };
        drop(scope);

        match &result {
            Ok(outcome) => tracing::info!(
                filename = %outcome.filename,
                width = outcome.width,
                height = outcome.height,
                "export complete"
            ),
            Err(err) => tracing::error!(error = %err, "export failed"),
        }
        result
    }

    fn capture(
        &mut self,
        doc: &mut Document,
        root: NodeId,
        heading: &str,
        counter: &mut DownloadCounter,
        downloader: &mut dyn Downloader,
    ) -> Result<ExportOutcome, ExportError> {
        doc.mark_images_cross_origin();

        let raster = RasterOptions {
            background: self.options.background,
            scale: self.options.scale,
            cross_origin: self.options.cross_origin,
        };
        let canvas = self.rasterizer.rasterize(doc, root, &raster)?;
        let blob = self.encoder.encode_png(&canvas)?;

        let filename = counter.allocate(base_name(heading, &self.options.fallback_name));
        downloader.download(&blob, &filename)?;

        Ok(ExportOutcome {
            filename,
            width: canvas.width(),
            height: canvas.height(),
            bytes: blob.bytes.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::element::Element;
    use crate::validation::FieldValues;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    /// Rasterizer that paints a solid canvas and records what it saw.
    #[derive(Default)]
    pub(crate) struct SolidRasterizer {
        pub calls: usize,
        pub seen_display: Vec<Display>,
        pub fail: bool,
        pub container: Option<NodeId>,
        pub heading: Option<NodeId>,
        pub seen_font_size: Vec<Option<f32>>,
    }

    impl Rasterizer for SolidRasterizer {
        fn rasterize(
            &mut self,
            doc: &Document,
            _root: NodeId,
            options: &RasterOptions,
        ) -> Result<RgbaImage, RenderError> {
            self.calls += 1;
            if let Some(id) = self.container {
                self.seen_display.push(doc.effective_display(id));
            }
            if let Some(id) = self.heading {
                self.seen_font_size.push(doc.font_size(id));
            }
            if self.fail {
                return Err(RenderError::EmptyCapture);
            }
            let c = options.background;
            Ok(RgbaImage::from_pixel(8, 4, Rgba([c.r, c.g, c.b, c.a])))
        }
    }

    fn doc(viewport: f32) -> Document {
        let element: Element = serde_json::from_str(
            r#"{ "type": "box", "class": "preview_block", "style": { "collapseBelow": 1024 },
                 "children": [ { "type": "box", "id": "card" } ] }"#,
        )
        .unwrap();
        Document::from_element(&element, viewport)
    }

    fn open_gate() -> ValidationGate {
        ValidationGate::new(&FieldValues {
            has_image: true,
            heading: "h".into(),
            content: "c".into(),
            content_2: "c".into(),
        })
    }

    struct Card {
        doc: Document,
        ui: ExportUi,
        gate: ValidationGate,
        counter: DownloadCounter,
    }

    impl Card {
        fn new(viewport: f32) -> Self {
            Self {
                doc: doc(viewport),
                ui: ExportUi::new(&ExportOptions::default()),
                gate: open_gate(),
                counter: DownloadCounter::default(),
            }
        }

        fn job<'a>(&'a mut self, heading: &'a str) -> ExportJob<'a> {
            let root = self.doc.node(self.doc.root()).children[0];
            let container = Some(self.doc.root());
            ExportJob {
                doc: &mut self.doc,
                root,
                container,
                ui: &mut self.ui,
                gate: &self.gate,
                heading,
                counter: &mut self.counter,
                prepare: None,
            }
        }
    }

    fn pipeline(rasterizer: SolidRasterizer) -> ExportPipeline<SolidRasterizer, NativePngEncoder> {
        ExportPipeline::new(rasterizer, NativePngEncoder, ExportOptions::default())
    }

    #[test]
    fn test_filenames_dedupe() {
        let mut counter = DownloadCounter::default();
        assert_eq!(counter.allocate("X"), "X.png");
        assert_eq!(counter.allocate("X"), "X-2.png");
        assert_eq!(counter.allocate("Y"), "Y.png");
        assert_eq!(counter.allocate("X"), "X-3.png");
        assert_eq!(counter.count("X"), 3);
    }

    #[test]
    fn test_base_name_falls_back() {
        assert_eq!(base_name("  Hello  ", "design"), "Hello");
        assert_eq!(base_name(" \n ", "design"), "design");
    }

    #[test]
    fn test_export_downloads_and_names() {
        let mut card = Card::new(1440.0);
        let mut pipeline = pipeline(SolidRasterizer::default());
        let mut downloads = CollectingDownloader::default();

        let first = pipeline.run(card.job(" Launch "), &mut downloads).unwrap();
        let second = pipeline.run(card.job("Launch"), &mut downloads).unwrap();
        let third = pipeline.run(card.job(""), &mut downloads).unwrap();

        assert_eq!(
            (first.filename.as_str(), second.filename.as_str(), third.filename.as_str()),
            ("Launch.png", "Launch-2.png", "design.png")
        );
        assert_eq!((first.width, first.height), (8, 4));
        assert_eq!(downloads.downloads.len(), 3);
        assert_eq!(downloads.downloads[0].1.mime, "image/png");
        assert_eq!(card.ui, ExportUi::new(&ExportOptions::default()));
    }

    #[test]
    fn test_closed_gate_has_no_side_effects() {
        let mut card = Card::new(1440.0);
        card.gate = ValidationGate::default();
        let mut pipeline = pipeline(SolidRasterizer::default());
        let mut downloads = CollectingDownloader::default();

        let err = pipeline.run(card.job("h"), &mut downloads).unwrap_err();
        insta::assert_snapshot!(
            err.user_message(),
            @"Please provide: mugshot image, heading, content #1, content #2."
        );
        assert_eq!(pipeline.rasterizer.calls, 0);
        assert_eq!(card.counter.count("h"), 0);
        assert!(downloads.downloads.is_empty());
    }

    #[test]
    fn test_narrow_viewport_forces_container_visible() {
        let mut card = Card::new(800.0);
        let container = card.doc.root();
        let rasterizer = SolidRasterizer {
            container: Some(container),
            ..Default::default()
        };
        let mut pipeline = pipeline(rasterizer);
        let mut downloads = CollectingDownloader::default();

        pipeline.run(card.job("h"), &mut downloads).unwrap();
        assert_eq!(pipeline.rasterizer.seen_display, vec![Display::Block]);
        assert_eq!(card.doc.node(container).inline_display, None);
        assert_eq!(card.doc.effective_display(container), Display::None);
    }

    #[test]
    fn test_failure_restores_ui_and_keeps_counter() {
        let mut card = Card::new(800.0);
        let mut pipeline = pipeline(SolidRasterizer {
            fail: true,
            ..Default::default()
        });
        let mut downloads = CollectingDownloader::default();

        let err = pipeline.run(card.job("h"), &mut downloads).unwrap_err();
        assert_eq!(err.user_message(), EXPORT_FAILED_MESSAGE);
        assert_eq!(card.ui.label, "Download");
        assert!(!card.ui.in_progress);
        assert_eq!(card.counter.count("h"), 0);
        let container = card.doc.root();
        assert_eq!(card.doc.node(container).inline_display, None);
    }

    #[test]
    fn test_prepare_runs_inside_forced_scope() {
        let mut card = Card::new(800.0);
        let container = card.doc.root();
        let mut pipeline = pipeline(SolidRasterizer::default());
        let mut downloads = CollectingDownloader::default();

        let mut seen = Vec::new();
        let mut record = |doc: &mut Document| -> Result<(), LayoutError> {
            seen.push(doc.effective_display(container));
            Ok(())
        };
        let mut job = card.job("h");
        job.prepare = Some(&mut record);
        pipeline.run(job, &mut downloads).unwrap();

        assert_eq!(seen, vec![Display::Block]);
        assert_eq!(pipeline.rasterizer.calls, 1);
    }

    #[test]
    fn test_prepare_failure_skips_capture() {
        let mut card = Card::new(800.0);
        let mut pipeline = pipeline(SolidRasterizer::default());
        let mut downloads = CollectingDownloader::default();

        let mut broken = |_: &mut Document| -> Result<(), LayoutError> {
            Err(LayoutError::Taffy(taffy::TaffyError::InvalidInputNode(
                taffy::NodeId::from(0u64),
            )))
        };
        let mut job = card.job("h");
        job.prepare = Some(&mut broken);
        let err = pipeline.run(job, &mut downloads).unwrap_err();

        assert!(matches!(err, ExportError::Render(RenderError::Layout(_))));
        assert_eq!(pipeline.rasterizer.calls, 0);
        assert_eq!(card.counter.count("h"), 0);
        assert!(!card.ui.in_progress);
        let container = card.doc.root();
        assert_eq!(card.doc.node(container).inline_display, None);
    }

    #[test]
    fn test_busy_scope_rejects_reentry() {
        let mut card = Card::new(1440.0);
        card.ui.in_progress = true;
        let mut pipeline = pipeline(SolidRasterizer::default());
        let mut downloads = CollectingDownloader::default();

        assert!(matches!(
            pipeline.run(card.job("h"), &mut downloads),
            Err(ExportError::Busy)
        ));
        assert_eq!(pipeline.rasterizer.calls, 0);
    }

    #[test]
    fn test_scope_sets_busy_label() {
        let options = ExportOptions::default();
        let mut ui = ExportUi::new(&options);
        let mut doc = doc(800.0);
        let root = doc.root();
        {
            let mut scope = ExportScope::enter(&mut ui, &mut doc, Some(root), &options).unwrap();
            assert_eq!(scope.document().effective_display(root), Display::Block);
        }
        assert_eq!(ui.label, "Download");
        assert_eq!(doc.effective_display(root), Display::None);
    }

    #[test]
    fn test_directory_downloader_sanitizes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut downloader = DirectoryDownloader::new(tmp.path().join("out"));
        let blob = Blob {
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        downloader.download(&blob, "a/b\nc.png").unwrap();

        let path = downloader.path_for("a/b\nc.png");
        assert_eq!(path.file_name().unwrap(), "a_b_c.png");
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
        assert_eq!(downloader.path_for("..").file_name().unwrap(), "_");
    }
}
