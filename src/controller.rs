//! The card controller.
//!
//! One [`CardController`] drives one card: it owns the card's copy of the page
//! document, keeps the preview in sync with the user's fields, runs autofit,
//! manages the crop session and hands exports to an [`ExportPipeline`].

use crate::autofit::{AutofitParams, autofit_text};
use crate::config::{CardConfig, ConfigError, StudioConfig};
use crate::crop::{
    CropError, CropHandle, CropPhase, CropRect, CropSession, CropSurface, ImageCropper,
    SelectedFile,
};
use crate::document::{Document, NodeId, RichText};
use crate::element::{Color, Element};
use crate::encode::{EncodedImage, PngEncoder};
use crate::export::{
    DownloadCounter, Downloader, ExportError, ExportJob, ExportOptions, ExportOutcome,
    ExportPipeline, ExportUi, PrepareCapture,
};
use crate::layout::{LayoutEngine, LayoutError};
use crate::raster::{Rasterizer, RenderError, render_svg};
use crate::selector::SelectorChain;
use crate::svg::SvgOptions;
use crate::validation::{FieldValues, MissingFields, ValidationGate};

/// Mutable state of one card.
#[derive(Debug)]
pub struct CardState<H: CropHandle> {
    /// Raw field input and whether an image is saved
    pub values: FieldValues,
    pub crop: CropSession<H>,
    pub downloads: DownloadCounter,
    /// Name of the last accepted upload
    pub chosen_file: Option<String>,
    pub export_ui: ExportUi,
    pub gate: ValidationGate,
}

impl<H: CropHandle> CardState<H> {
    fn new(options: &ExportOptions) -> Self {
        Self {
            values: FieldValues::default(),
            crop: CropSession::new(),
            downloads: DownloadCounter::default(),
            chosen_file: None,
            export_ui: ExportUi::new(options),
            gate: ValidationGate::default(),
        }
    }
}

/// Drives one card's preview, crop session and export.
pub struct CardController<S: CropSurface = ImageCropper> {
    config: CardConfig,
    doc: Document,
    root: NodeId,
    container: Option<NodeId>,
    engine: LayoutEngine,
    surface: S,
    background: Color,
    state: CardState<S::Handle>,
}

impl CardController<ImageCropper> {
    /// Controller for card `id` with the native crop surface.
    pub fn from_studio(studio: &StudioConfig, id: &str) -> Result<Self, ConfigError> {
        Self::new(
            studio.card(id)?.clone(),
            &studio.template,
            studio.viewport_width,
            &studio.export,
            ImageCropper,
        )
    }
}

impl<S: CropSurface> CardController<S> {
    pub fn new(
        config: CardConfig,
        template: &Element,
        viewport_width: f32,
        export: &ExportOptions,
        surface: S,
    ) -> Result<Self, ConfigError> {
        let mut doc = Document::from_element(template, viewport_width);
        let page = doc.root();
        let root = config
            .root
            .resolve_first(&doc, page)
            .ok_or_else(|| ConfigError::MissingRoot {
                card: config.id.clone(),
            })?;
        let container = config
            .preview_container
            .as_ref()
            .and_then(|chain| chain.resolve_first(&doc, page));

        if let Some(src) = &config.placeholder_image {
            if let Some(target) = config.image_targets.resolve_first(&doc, root) {
                doc.set_image_src(target, src);
            }
        }

        let mut controller = Self {
            config,
            doc,
            root,
            container,
            engine: LayoutEngine::new(),
            surface,
            background: export.background,
            state: CardState::new(export),
        };
        controller.render_heading();
        controller.render_content();
        controller.render_content_2();
        Ok(controller)
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Capture root of the card.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn state(&self) -> &CardState<S::Handle> {
        &self.state
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        self.state.crop.image()
    }

    pub fn crop_phase(&self) -> CropPhase {
        self.state.crop.phase()
    }

    pub fn chosen_file_name(&self) -> Option<&str> {
        self.state.chosen_file.as_deref()
    }

    /// Edit and delete controls are shown while an image is kept.
    pub fn has_image_controls(&self) -> bool {
        self.state.crop.image().is_some()
    }

    pub fn export_label(&self) -> &str {
        &self.state.export_ui.label
    }

    pub fn can_export(&self) -> bool {
        self.state.gate.is_enabled()
    }

    pub fn missing_fields(&self) -> Option<MissingFields> {
        self.state.gate.missing()
    }

    /// Font size of the first heading target.
    pub fn heading_font_size(&self) -> Option<f32> {
        self.config
            .heading_targets
            .resolve(&self.doc, self.root)
            .into_iter()
            .find_map(|id| self.doc.font_size(id))
    }

    /// Make a font available for measurement and preview.
    pub fn register_font(&mut self, data: Vec<u8>) -> Vec<String> {
        self.engine.text_engine.register_font(data)
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    pub fn set_heading(&mut self, value: &str) -> Result<(), LayoutError> {
        self.state.values.heading = value.to_string();
        if self.render_heading() {
            self.fit_headings()?;
        }
        self.refresh_gate();
        Ok(())
    }

    pub fn set_content(&mut self, value: &str) {
        self.state.values.content = value.to_string();
        self.render_content();
        self.refresh_gate();
    }

    pub fn set_content_2(&mut self, value: &str) {
        self.state.values.content_2 = value.to_string();
        self.render_content_2();
        self.refresh_gate();
    }

    /// Track a viewport change and refit the heading.
    pub fn resize(&mut self, viewport_width: f32) -> Result<(), LayoutError> {
        self.doc.set_viewport_width(viewport_width);
        if !self.state.values.heading.trim().is_empty() {
            self.fit_headings()?;
        }
        Ok(())
    }

    /// Write the heading into its targets. Returns whether it needs fitting.
    fn render_heading(&mut self) -> bool {
        let value = &self.state.values.heading;
        let blank = value.trim().is_empty();
        let text = if blank {
            RichText::heading(&self.config.defaults.heading)
        } else {
            RichText::heading(value)
        };
        let targets = write_text(&mut self.doc, &self.config.heading_targets, self.root, text);

        if blank {
            let fit = self.config.heading_fit;
            for id in targets {
                self.doc
                    .set_font_size(id, fit.default_font_size, fit.line_height_ratio);
            }
        }
        !blank
    }

    fn fit_headings(&mut self) -> Result<(), LayoutError> {
        fit_targets(
            &mut self.engine,
            &mut self.doc,
            &self.config.heading_targets,
            self.root,
            &self.config.heading_fit,
        )
    }

    fn render_content(&mut self) {
        let text = content_or_default(&self.state.values.content, &self.config.defaults.content);
        write_text(&mut self.doc, &self.config.content_targets, self.root, text);
    }

    fn render_content_2(&mut self) {
        let text = content_or_default(&self.state.values.content_2, &self.config.defaults.content2);
        write_text(&mut self.doc, &self.config.content2_targets, self.root, text);
    }

    fn refresh_gate(&mut self) {
        self.state.values.has_image = self.state.crop.image().is_some();
        self.state.gate.recompute(&self.state.values);
    }

    // ------------------------------------------------------------------
    // Image
    // ------------------------------------------------------------------

    /// Accept an upload and open it for cropping.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), CropError> {
        let name = file.name.clone();
        let options = self.config.crop.crop_options();
        self.state.crop.select_file(&mut self.surface, file, &options)?;
        self.state.chosen_file = Some(name);
        self.refresh_gate();
        Ok(())
    }

    /// Move the crop box of the open surface.
    pub fn set_crop_box(&mut self, rect: CropRect) -> Result<(), CropError> {
        self.state.crop.set_crop_box(rect)
    }

    /// Save the crop and show it in the card.
    pub fn save_crop(&mut self, crop: Option<CropRect>) -> Result<(), CropError> {
        let options = self.config.crop.canvas_options();
        let url = self.state.crop.save(crop, &options)?.data_url();

        let targets = self.config.image_targets.resolve(&self.doc, self.root);
        if targets.is_empty() {
            tracing::warn!(card = %self.config.id, "no image target for saved crop");
        }
        for id in targets {
            self.doc.set_image_src(id, &url);
        }
        self.refresh_gate();
        Ok(())
    }

    pub fn edit_image(&mut self) -> Result<(), CropError> {
        let options = self.config.crop.crop_options();
        self.state.crop.edit(&mut self.surface, &options)
    }

    /// Close the crop surface without saving.
    pub fn cancel_crop(&mut self) -> bool {
        let closed = self.state.crop.cancel();
        self.refresh_gate();
        closed
    }

    /// Remove the image and reset the session.
    pub fn delete_image(&mut self) {
        self.state.crop.delete();
        self.state.chosen_file = None;
        for id in self.config.image_targets.resolve_all_groups(&self.doc, self.root) {
            self.doc.set_image_src(id, "");
        }
        self.refresh_gate();
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// SVG of the card as currently shown.
    pub fn preview_svg(&mut self) -> Result<String, RenderError> {
        let options = SvgOptions {
            background: Some(self.background),
            ..Default::default()
        };
        let (svg, _, _) = render_svg(&mut self.engine, &self.doc, self.root, &options)?;
        Ok(svg)
    }

    /// Run the export pipeline for this card.
    pub fn export<R: Rasterizer, E: PngEncoder>(
        &mut self,
        pipeline: &mut ExportPipeline<R, E>,
        downloader: &mut dyn Downloader,
    ) -> Result<ExportOutcome, ExportError> {
        let fitted = !self.state.values.heading.trim().is_empty();
        let engine = &mut self.engine;
        let targets = &self.config.heading_targets;
        let params = &self.config.heading_fit;
        let root = self.root;
        let mut refit = |doc: &mut Document| fit_targets(engine, doc, targets, root, params);

        let job = ExportJob {
            doc: &mut self.doc,
            root: self.root,
            container: self.container,
            ui: &mut self.state.export_ui,
            gate: &self.state.gate,
            heading: &self.state.values.heading,
            counter: &mut self.state.downloads,
            prepare: fitted.then_some(&mut refit as &mut PrepareCapture<'_>),
        };
        let result = pipeline.run(job, downloader);

        // The scope has restored the preview; fit the heading to it again.
        if fitted {
            if let Err(err) = self.fit_headings() {
                tracing::warn!(card = %self.config.id, error = %err, "heading refit after export failed");
            }
        }
        result
    }
}

/// Autofit every node of the first matching group.
fn fit_targets(
    engine: &mut LayoutEngine,
    doc: &mut Document,
    chain: &SelectorChain,
    scope: NodeId,
    params: &AutofitParams,
) -> Result<(), LayoutError> {
    for id in chain.resolve(doc, scope) {
        autofit_text(engine, doc, id, params)?;
    }
    Ok(())
}

/// Write `text` into every node of the first matching group.
fn write_text(doc: &mut Document, chain: &SelectorChain, scope: NodeId, text: RichText) -> Vec<NodeId> {
    let mut written = Vec::new();
    for id in chain.resolve(doc, scope) {
        if doc.set_text(id, text.clone()) {
            written.push(id);
        } else {
            tracing::warn!(node = id.index(), "skipping non-text target");
        }
    }
    written
}

fn content_or_default(value: &str, default: &str) -> RichText {
    if value.trim().is_empty() {
        RichText::plain(default)
    } else {
        RichText::plain(value)
    }
}
