//! PNG encoding of rendered and cropped canvases.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("canvas is empty")]
    EmptyCanvas,
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A PNG produced by this crate, with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn from_canvas(canvas: &RgbaImage) -> Result<Self, EncodeError> {
        Ok(Self {
            bytes: png_bytes(canvas)?,
            width: canvas.width(),
            height: canvas.height(),
        })
    }

    /// `data:image/png;base64,...` form used as an image source.
    pub fn data_url(&self) -> String {
        data_url(PNG_MIME, &self.bytes)
    }
}

/// Binary payload handed to a downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Turns a canvas into a PNG blob.
pub trait PngEncoder {
    fn encode_png(&mut self, canvas: &RgbaImage) -> Result<Blob, EncodeError>;
}

/// Encodes directly with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePngEncoder;

impl PngEncoder for NativePngEncoder {
    fn encode_png(&mut self, canvas: &RgbaImage) -> Result<Blob, EncodeError> {
        Ok(Blob {
            mime: PNG_MIME.to_string(),
            bytes: png_bytes(canvas)?,
        })
    }
}

/// Goes through a base64 data URL and decodes it back into bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUrlPngEncoder;

impl PngEncoder for DataUrlPngEncoder {
    fn encode_png(&mut self, canvas: &RgbaImage) -> Result<Blob, EncodeError> {
        let url = data_url(PNG_MIME, &png_bytes(canvas)?);
        let (mime, bytes) = decode_data_url(&url)?;
        Ok(Blob { mime, bytes })
    }
}

fn png_bytes(canvas: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
    if canvas.width() == 0 || canvas.height() == 0 {
        return Err(EncodeError::EmptyCanvas);
    }
    let mut bytes = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a base64 data URL into its MIME type and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), EncodeError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| EncodeError::InvalidDataUrl("missing data: prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| EncodeError::InvalidDataUrl("missing payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| EncodeError::InvalidDataUrl("not base64 encoded".into()))?;
    Ok((mime.to_string(), STANDARD.decode(payload)?))
}
