//! cardsmith - fill-in card templates with autofit headings, image cropping and
//! PNG export.
//!
//! A page template is a JSON element tree. Each card on the page is described by a
//! [`CardConfig`]: selector chains that map the user's fields onto template nodes,
//! crop geometry, the heading's line budget and default copy. A [`CardController`]
//! keeps one card's preview in sync and exports it through an [`ExportPipeline`].
//!
//! # Example
//!
//! ```ignore
//! use cardsmith::{CardController, DirectoryDownloader, ExportPipeline, StudioConfig};
//!
//! let studio = StudioConfig::builtin()?;
//! let mut card = CardController::from_studio(&studio, "card-1")?;
//! card.set_heading("Seun raised [$5.6M]")?;
//! card.set_content("But 9 years ago...");
//! card.set_content_2("Here's how...");
//! card.select_file(file)?;
//! card.save_crop(None)?;
//!
//! let mut pipeline = ExportPipeline::native(studio.export.clone());
//! let outcome = card.export(&mut pipeline, &mut DirectoryDownloader::new("out"))?;
//! println!("{}", outcome.filename);
//! ```

pub mod autofit;
pub mod config;
pub mod controller;
pub mod crop;
pub mod document;
pub mod element;
pub mod encode;
pub mod export;
pub mod layout;
pub mod presets;
pub mod raster;
pub mod render;
pub mod selector;
pub mod svg;
pub mod text;
pub mod validation;

use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use autofit::AutofitParams;
pub use config::{CardConfig, ConfigError, StudioConfig};
pub use controller::CardController;
pub use crop::{CropError, CropRect, ImageCropper, SelectedFile};
pub use document::{Document, NodeId};
pub use element::Element;
pub use encode::{DataUrlPngEncoder, NativePngEncoder, PngEncoder};
pub use export::{
    CollectingDownloader, DirectoryDownloader, Downloader, ExportError, ExportOptions,
    ExportPipeline,
};
pub use layout::LayoutEngine;
pub use raster::{Rasterizer, SvgRasterizer};
pub use selector::{Selector, SelectorChain};
pub use validation::ValidationGate;

// ============================================================================
// WASM bindings
// ============================================================================

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// A finished export handed back to JavaScript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub filename: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// One card, driven from JavaScript.
///
/// The page wires inputs, the crop modal and the download button to these
/// methods; errors come back as strings ready for an alert.
#[wasm_bindgen]
pub struct CardHandle {
    controller: CardController,
    pipeline: ExportPipeline<SvgRasterizer, DataUrlPngEncoder>,
}

#[wasm_bindgen]
impl CardHandle {
    /// Create a handle for `card_id`, optionally from a studio config JSON.
    #[wasm_bindgen(constructor)]
    pub fn new(card_id: &str, config_json: Option<String>) -> Result<CardHandle, JsValue> {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        let studio = match config_json {
            Some(json) => StudioConfig::from_json(&json),
            None => StudioConfig::builtin(),
        }
        .map_err(js_error)?;
        let controller = CardController::from_studio(&studio, card_id).map_err(js_error)?;
        let pipeline = ExportPipeline::new(
            SvgRasterizer::new(),
            DataUrlPngEncoder,
            studio.export.clone(),
        );
        Ok(CardHandle {
            controller,
            pipeline,
        })
    }

    /// Register a font for both measurement and export. Returns family names.
    #[wasm_bindgen(js_name = registerFont)]
    pub fn register_font(&mut self, data: Vec<u8>) -> Vec<String> {
        self.pipeline.rasterizer.register_font(data.clone());
        self.controller.register_font(data)
    }

    #[wasm_bindgen(js_name = setHeading)]
    pub fn set_heading(&mut self, value: &str) -> Result<(), JsValue> {
        self.controller.set_heading(value).map_err(js_error)
    }

    #[wasm_bindgen(js_name = setContent)]
    pub fn set_content(&mut self, value: &str) {
        self.controller.set_content(value)
    }

    #[wasm_bindgen(js_name = setContent2)]
    pub fn set_content_2(&mut self, value: &str) {
        self.controller.set_content_2(value)
    }

    pub fn resize(&mut self, viewport_width: f32) -> Result<(), JsValue> {
        self.controller.resize(viewport_width).map_err(js_error)
    }

    #[wasm_bindgen(js_name = selectFile)]
    pub fn select_file(&mut self, name: String, mime: String, bytes: Vec<u8>) -> Result<(), JsValue> {
        self.controller
            .select_file(SelectedFile { name, mime, bytes })
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = setCropBox)]
    pub fn set_crop_box(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), JsValue> {
        self.controller
            .set_crop_box(CropRect {
                x,
                y,
                width,
                height,
            })
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = saveCrop)]
    pub fn save_crop(&mut self) -> Result<(), JsValue> {
        self.controller.save_crop(None).map_err(js_error)
    }

    #[wasm_bindgen(js_name = editImage)]
    pub fn edit_image(&mut self) -> Result<(), JsValue> {
        self.controller.edit_image().map_err(js_error)
    }

    #[wasm_bindgen(js_name = cancelCrop)]
    pub fn cancel_crop(&mut self) -> bool {
        self.controller.cancel_crop()
    }

    #[wasm_bindgen(js_name = deleteImage)]
    pub fn delete_image(&mut self) {
        self.controller.delete_image()
    }

    #[wasm_bindgen(js_name = canExport)]
    pub fn can_export(&self) -> bool {
        self.controller.can_export()
    }

    /// `Please provide: ...` message, or nothing when the card is complete.
    #[wasm_bindgen(js_name = missingMessage)]
    pub fn missing_message(&self) -> Option<String> {
        self.controller.missing_fields().map(|m| m.to_string())
    }

    #[wasm_bindgen(js_name = hasImageControls)]
    pub fn has_image_controls(&self) -> bool {
        self.controller.has_image_controls()
    }

    #[wasm_bindgen(js_name = chosenFileName)]
    pub fn chosen_file_name(&self) -> Option<String> {
        self.controller.chosen_file_name().map(str::to_string)
    }

    #[wasm_bindgen(js_name = exportLabel)]
    pub fn export_label(&self) -> String {
        self.controller.export_label().to_string()
    }

    #[wasm_bindgen(js_name = imageDataUrl)]
    pub fn image_data_url(&self) -> Option<String> {
        self.controller.image().map(|image| image.data_url())
    }

    #[wasm_bindgen(js_name = previewSvg)]
    pub fn preview_svg(&mut self) -> Result<String, JsValue> {
        self.controller.preview_svg().map_err(js_error)
    }

    /// Run the export; resolves to `{ filename, mime, width, height, bytes }`.
    pub fn export(&mut self) -> Result<JsValue, JsValue> {
        let mut downloads = CollectingDownloader::default();
        let outcome = self
            .controller
            .export(&mut self.pipeline, &mut downloads)
            .map_err(|e| JsValue::from_str(&e.user_message()))?;
        let Some((_, blob)) = downloads.downloads.pop() else {
            return Err(JsValue::from_str(export::EXPORT_FAILED_MESSAGE));
        };
        let file = ExportedFile {
            filename: outcome.filename,
            mime: blob.mime,
            width: outcome.width,
            height: outcome.height,
            bytes: blob.bytes,
        };
        serde_wasm_bindgen::to_value(&file)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

/// Get version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
