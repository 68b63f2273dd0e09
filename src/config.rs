//! Card and studio configuration.
//!
//! Everything is plain serde data in camelCase JSON. A studio file may
//! override the export settings, the viewport, the page template and the
//! card list; anything left out falls back to the built-in presets.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::autofit::AutofitParams;
use crate::crop::{CanvasOptions, CropOptions, CropOutput, Smoothing};
use crate::element::Element;
use crate::export::ExportOptions;
use crate::presets;
use crate::selector::{SelectorChain, SelectorError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error("card `{card}`: root selector matches nothing in the template")]
    MissingRoot { card: String },
    #[error("unknown card `{0}`")]
    UnknownCard(String),
    #[error("duplicate card id `{0}`")]
    DuplicateCard(String),
}

/// Output size of a saved crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Crop geometry for a card.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CropConfig {
    pub aspect_ratio: Option<f32>,
    /// `None` keeps the crop box's natural size
    pub output: Option<OutputSize>,
    pub view_mode: u8,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: Some(1.0),
            output: None,
            view_mode: 2,
        }
    }
}

impl CropConfig {
    pub fn crop_options(&self) -> CropOptions {
        CropOptions {
            aspect_ratio: self.aspect_ratio,
            view_mode: self.view_mode,
        }
    }

    pub fn canvas_options(&self) -> CanvasOptions {
        CanvasOptions {
            output: match self.output {
                Some(OutputSize { width, height }) => CropOutput::Fixed { width, height },
                None => CropOutput::Natural,
            },
            smoothing: Smoothing::High,
        }
    }
}

/// Copy shown while a field is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultCopy {
    pub heading: String,
    pub content: String,
    pub content2: String,
}

/// Static description of one card.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Capture root, resolved from the top of the page
    pub root: SelectorChain,
    /// Container forced visible during export, resolved from the top of the page
    #[serde(default)]
    pub preview_container: Option<SelectorChain>,
    pub heading_targets: SelectorChain,
    pub content_targets: SelectorChain,
    pub content2_targets: SelectorChain,
    pub image_targets: SelectorChain,
    #[serde(default)]
    pub crop: CropConfig,
    #[serde(default)]
    pub heading_fit: AutofitParams,
    #[serde(default)]
    pub defaults: DefaultCopy,
    #[serde(default)]
    pub placeholder_image: Option<String>,
}

fn default_viewport_width() -> f32 {
    1440.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStudioConfig {
    #[serde(default)]
    export: ExportOptions,
    #[serde(default = "default_viewport_width")]
    viewport_width: f32,
    #[serde(default)]
    template: Option<Element>,
    #[serde(default)]
    cards: Option<Vec<CardConfig>>,
}

/// Top-level configuration: export settings, page template and cards.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub export: ExportOptions,
    pub viewport_width: f32,
    pub template: Element,
    pub cards: Vec<CardConfig>,
}

impl StudioConfig {
    /// The built-in page and four cards.
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(Self {
            export: ExportOptions::default(),
            viewport_width: default_viewport_width(),
            template: presets::template()?,
            cards: presets::cards()?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawStudioConfig = serde_json::from_str(json)?;
        let template = match raw.template {
            Some(template) => template,
            None => presets::template()?,
        };
        let cards = match raw.cards {
            Some(cards) => cards,
            None => presets::cards()?,
        };

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = cards.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(ConfigError::DuplicateCard(dup.id.clone()));
        }

        Ok(Self {
            export: raw.export,
            viewport_width: raw.viewport_width,
            template,
            cards,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn card(&self, id: &str) -> Result<&CardConfig, ConfigError> {
        self.cards
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ConfigError::UnknownCard(id.to_string()))
    }
}
