//! Image crop sessions.
//!
//! A [`CropSession`] walks an upload through selection, cropping and saving.
//! The cropping widget itself sits behind [`CropSurface`] and [`CropHandle`];
//! [`ImageCropper`] is the native implementation on top of the `image` crate.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::Deserialize;

use crate::encode::{self, EncodeError, EncodedImage};

/// MIME types accepted for upload.
pub const ACCEPTED_MIME_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/gif"];

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Please upload a valid image file (PNG, JPEG, GIF).")]
    UnsupportedType { mime: String },
    #[error("a crop surface is already open")]
    SurfaceOpen,
    #[error("no crop surface is open")]
    NotEditing,
    #[error("there is no saved image to edit")]
    NothingToEdit,
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("crop box is empty")]
    EmptyCrop,
    #[error("crop box has a non-finite coordinate")]
    InvalidCrop,
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Check an upload's MIME type against the allow-list.
pub fn validate_mime(mime: &str) -> Result<(), CropError> {
    let mime = mime.trim();
    if ACCEPTED_MIME_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(mime))
    {
        Ok(())
    } else {
        Err(CropError::UnsupportedType {
            mime: mime.to_string(),
        })
    }
}

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// An accepted upload, kept so the crop can be edited later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn data_url(&self) -> String {
        encode::data_url(&self.mime, &self.bytes)
    }
}

/// Crop box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Settings the surface is opened with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropOptions {
    /// Width over height; `None` leaves the box free
    pub aspect_ratio: Option<f32>,
    /// 0 leaves the box unrestricted, 1 and up keep it inside the image
    pub view_mode: u8,
}

/// Size of the extracted canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutput {
    /// Crop box size in source pixels
    Natural,
    Fixed { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Smoothing {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasOptions {
    pub output: CropOutput,
    pub smoothing: Smoothing,
}

/// Opens crop handles on raw images.
pub trait CropSurface {
    type Handle: CropHandle;

    fn open(&mut self, raw: &RawImage, options: &CropOptions) -> Result<Self::Handle, CropError>;
}

/// An open crop widget.
pub trait CropHandle {
    fn crop_box(&self) -> CropRect;

    fn set_crop_box(&mut self, rect: CropRect);

    fn cropped_canvas(&self, options: &CanvasOptions) -> Result<RgbaImage, CropError>;

    /// Tear the widget down.
    fn destroy(self);
}

/// Native crop surface backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCropper;

impl CropSurface for ImageCropper {
    type Handle = ImageCropHandle;

    fn open(&mut self, raw: &RawImage, options: &CropOptions) -> Result<ImageCropHandle, CropError> {
        let image = image::load_from_memory(&raw.bytes)?;
        let (width, height) = image.dimensions();
        let crop_box = initial_box(width as f32, height as f32, options.aspect_ratio);
        Ok(ImageCropHandle {
            image,
            options: *options,
            crop_box,
        })
    }
}

#[derive(Debug)]
pub struct ImageCropHandle {
    image: DynamicImage,
    options: CropOptions,
    crop_box: CropRect,
}

impl CropHandle for ImageCropHandle {
    fn crop_box(&self) -> CropRect {
        self.crop_box
    }

    fn set_crop_box(&mut self, rect: CropRect) {
        if !rect.is_finite() {
            tracing::warn!(?rect, "ignoring non-finite crop box");
            return;
        }
        let (w, h) = self.image.dimensions();
        let (w, h) = (w as f32, h as f32);
        let mut rect = rect;

        if self.options.view_mode >= 1 {
            rect.x = rect.x.clamp(0.0, w);
            rect.y = rect.y.clamp(0.0, h);
            rect.width = rect.width.clamp(0.0, w - rect.x);
            rect.height = rect.height.clamp(0.0, h - rect.y);
        }
        if let Some(aspect) = self.options.aspect_ratio.filter(|a| *a > 0.0) {
            if rect.height > 0.0 && rect.width / rect.height > aspect {
                rect.width = rect.height * aspect;
            } else {
                rect.height = rect.width / aspect;
            }
        }
        self.crop_box = rect;
    }

    fn cropped_canvas(&self, options: &CanvasOptions) -> Result<RgbaImage, CropError> {
        let (img_w, img_h) = self.image.dimensions();
        let x = (self.crop_box.x.max(0.0).round() as u32).min(img_w);
        let y = (self.crop_box.y.max(0.0).round() as u32).min(img_h);
        let width = (self.crop_box.width.max(0.0).round() as u32).min(img_w - x);
        let height = (self.crop_box.height.max(0.0).round() as u32).min(img_h - y);
        if width == 0 || height == 0 {
            return Err(CropError::EmptyCrop);
        }

        let cropped = self.image.crop_imm(x, y, width, height);
        let out = match options.output {
            CropOutput::Natural => cropped,
            CropOutput::Fixed {
                width: out_w,
                height: out_h,
            } => {
                if out_w == 0 || out_h == 0 {
                    return Err(CropError::EmptyCrop);
                }
                let filter = match options.smoothing {
                    Smoothing::High => FilterType::Lanczos3,
                    Smoothing::Low => FilterType::Triangle,
                };
                cropped.resize_exact(out_w, out_h, filter)
            }
        };
        Ok(out.to_rgba8())
    }

    fn destroy(self) {}
}

/// Largest box of the given aspect ratio centered in the image.
fn initial_box(width: f32, height: f32, aspect: Option<f32>) -> CropRect {
    let (w, h) = match aspect.filter(|a| *a > 0.0) {
        Some(aspect) if width / height > aspect => (height * aspect, height),
        Some(aspect) => (width, width / aspect),
        None => (width, height),
    };
    CropRect {
        x: (width - w) / 2.0,
        y: (height - h) / 2.0,
        width: w,
        height: h,
    }
}

/// Observable phase of a [`CropSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPhase {
    Empty,
    Editing,
    Saved,
}

#[derive(Debug)]
struct SavedImage {
    raw: RawImage,
    image: EncodedImage,
}

#[derive(Debug)]
enum State<H> {
    Empty,
    Editing {
        raw: RawImage,
        handle: H,
        /// Saved image to fall back to on cancel
        prior: Option<SavedImage>,
    },
    Saved(SavedImage),
}

/// Upload and crop state machine for one card.
///
/// The open handle lives inside the editing state, so a session can never
/// hold more than one surface.
#[derive(Debug)]
pub struct CropSession<H: CropHandle> {
    state: State<H>,
}

impl<H: CropHandle> Default for CropSession<H> {
    fn default() -> Self {
        Self { state: State::Empty }
    }
}

impl<H: CropHandle> CropSession<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CropPhase {
        match self.state {
            State::Empty => CropPhase::Empty,
            State::Editing { .. } => CropPhase::Editing,
            State::Saved(_) => CropPhase::Saved,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Editing { .. })
    }

    /// Current cropped image, including one kept while re-editing.
    pub fn image(&self) -> Option<&EncodedImage> {
        match &self.state {
            State::Saved(saved) => Some(&saved.image),
            State::Editing {
                prior: Some(saved), ..
            } => Some(&saved.image),
            _ => None,
        }
    }

    /// The raw upload the session is working from.
    pub fn raw(&self) -> Option<&RawImage> {
        match &self.state {
            State::Empty => None,
            State::Editing { raw, .. } => Some(raw),
            State::Saved(saved) => Some(&saved.raw),
        }
    }

    pub fn handle_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            State::Editing { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// Validate and open an upload on the surface.
    pub fn select_file<S>(
        &mut self,
        surface: &mut S,
        file: SelectedFile,
        options: &CropOptions,
    ) -> Result<(), CropError>
    where
        S: CropSurface<Handle = H>,
    {
        if let Err(err) = validate_mime(&file.mime) {
            tracing::warn!(file = %file.name, mime = %file.mime, "rejected upload");
            return Err(err);
        }
        if self.is_open() {
            return Err(CropError::SurfaceOpen);
        }

        let raw = RawImage {
            name: file.name,
            mime: file.mime,
            bytes: file.bytes,
        };
        let handle = surface.open(&raw, options)?;

        let prior = match std::mem::replace(&mut self.state, State::Empty) {
            State::Saved(saved) => Some(saved),
            _ => None,
        };
        self.state = State::Editing { raw, handle, prior };
        Ok(())
    }

    /// Move the crop box of the open surface.
    pub fn set_crop_box(&mut self, rect: CropRect) -> Result<(), CropError> {
        let State::Editing { handle, .. } = &mut self.state else {
            return Err(CropError::NotEditing);
        };
        if !rect.is_finite() {
            return Err(CropError::InvalidCrop);
        }
        handle.set_crop_box(rect);
        Ok(())
    }

    /// Extract, encode and keep the crop, closing the surface.
    ///
    /// On failure the surface stays open.
    pub fn save(
        &mut self,
        crop: Option<CropRect>,
        options: &CanvasOptions,
    ) -> Result<&EncodedImage, CropError> {
        if let Some(rect) = crop {
            self.set_crop_box(rect)?;
        }
        let State::Editing { handle, .. } = &mut self.state else {
            return Err(CropError::NotEditing);
        };
        let canvas = handle.cropped_canvas(options)?;
        let image = EncodedImage::from_canvas(&canvas)?;

        let State::Editing { raw, handle, .. } = std::mem::replace(&mut self.state, State::Empty)
        else {
            return Err(CropError::NotEditing);
        };
        handle.destroy();
        tracing::info!(file = %raw.name, width = image.width, height = image.height, "crop saved");

        self.state = State::Saved(SavedImage { raw, image });
        match &self.state {
            State::Saved(saved) => Ok(&saved.image),
            _ => Err(CropError::NotEditing),
        }
    }

    /// Reopen the surface on the saved upload.
    pub fn edit<S>(&mut self, surface: &mut S, options: &CropOptions) -> Result<(), CropError>
    where
        S: CropSurface<Handle = H>,
    {
        let raw = match &self.state {
            State::Saved(saved) => saved.raw.clone(),
            State::Editing { .. } => return Err(CropError::SurfaceOpen),
            State::Empty => return Err(CropError::NothingToEdit),
        };
        let handle = surface.open(&raw, options)?;
        let prior = match std::mem::replace(&mut self.state, State::Empty) {
            State::Saved(saved) => Some(saved),
            _ => None,
        };
        self.state = State::Editing { raw, handle, prior };
        Ok(())
    }

    /// Close the surface without saving. Returns whether a surface was open.
    pub fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Editing { handle, prior, .. } => {
                handle.destroy();
                if let Some(saved) = prior {
                    self.state = State::Saved(saved);
                }
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// Drop everything and return to empty.
    pub fn delete(&mut self) {
        if let State::Editing { handle, .. } = std::mem::replace(&mut self.state, State::Empty) {
            handle.destroy();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    pub(crate) fn png_file(name: &str, width: u32, height: u32) -> SelectedFile {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        SelectedFile {
            name: name.to_string(),
            mime: "image/png".to_string(),
            bytes,
        }
    }

    /// Wraps the native cropper and counts open and destroyed handles.
    #[derive(Default)]
    struct CountingSurface {
        opened: Rc<Cell<usize>>,
        destroyed: Rc<Cell<usize>>,
    }

    struct CountingHandle {
        inner: ImageCropHandle,
        destroyed: Rc<Cell<usize>>,
    }

    impl CropSurface for CountingSurface {
        type Handle = CountingHandle;

        fn open(&mut self, raw: &RawImage, options: &CropOptions) -> Result<CountingHandle, CropError> {
            let inner = ImageCropper.open(raw, options)?;
            self.opened.set(self.opened.get() + 1);
            Ok(CountingHandle {
                inner,
                destroyed: self.destroyed.clone(),
            })
        }
    }

    impl CropHandle for CountingHandle {
        fn crop_box(&self) -> CropRect {
            self.inner.crop_box()
        }

        fn set_crop_box(&mut self, rect: CropRect) {
            self.inner.set_crop_box(rect)
        }

        fn cropped_canvas(&self, options: &CanvasOptions) -> Result<RgbaImage, CropError> {
            self.inner.cropped_canvas(options)
        }

        fn destroy(self) {
            self.destroyed.set(self.destroyed.get() + 1);
        }
    }

    const SQUARE: CropOptions = CropOptions {
        aspect_ratio: Some(1.0),
        view_mode: 2,
    };

    const FIXED: CanvasOptions = CanvasOptions {
        output: CropOutput::Fixed {
            width: 342,
            height: 342,
        },
        smoothing: Smoothing::High,
    };

    #[test]
    fn test_validate_mime() {
        for mime in ["image/png", "image/JPEG", "image/jpg", "image/gif"] {
            assert!(validate_mime(mime).is_ok(), "{mime}");
        }
        for mime in ["image/webp", "text/plain", "", "image/svg+xml"] {
            assert!(validate_mime(mime).is_err(), "{mime}");
        }
        insta::assert_snapshot!(
            validate_mime("text/plain").unwrap_err().to_string(),
            @"Please upload a valid image file (PNG, JPEG, GIF)."
        );
    }

    #[test]
    fn test_rejected_upload_opens_nothing() {
        let mut surface = CountingSurface::default();
        let mut session = CropSession::new();
        let mut file = png_file("notes.txt", 8, 8);
        file.mime = "text/plain".into();

        assert!(session.select_file(&mut surface, file, &SQUARE).is_err());
        assert_eq!(session.phase(), CropPhase::Empty);
        assert_eq!(surface.opened.get(), 0);
        assert!(session.image().is_none());
    }

    #[test]
    fn test_undecodable_upload_keeps_state() {
        let mut session = CropSession::new();
        let file = SelectedFile {
            name: "broken.png".into(),
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(
            session.select_file(&mut ImageCropper, file, &SQUARE),
            Err(CropError::Decode(_))
        ));
        assert_eq!(session.phase(), CropPhase::Empty);
    }

    #[test]
    fn test_initial_box_is_centered() {
        assert_eq!(
            initial_box(200.0, 100.0, Some(1.0)),
            CropRect {
                x: 50.0,
                y: 0.0,
                width: 100.0,
                height: 100.0
            }
        );
        assert_eq!(initial_box(200.0, 100.0, None).width, 200.0);
    }

    #[test]
    fn test_save_fixed_output() {
        let mut surface = CountingSurface::default();
        let mut session = CropSession::new();
        session
            .select_file(&mut surface, png_file("me.png", 400, 300), &SQUARE)
            .unwrap();
        assert!(session.is_open());

        let image = session.save(None, &FIXED).unwrap();
        assert_eq!((image.width, image.height), (342, 342));
        assert_eq!(session.phase(), CropPhase::Saved);
        assert_eq!(surface.destroyed.get(), 1);
    }

    #[test]
    fn test_save_natural_output_uses_crop_box() {
        let mut session = CropSession::new();
        session
            .select_file(&mut ImageCropper, png_file("me.png", 400, 300), &SQUARE)
            .unwrap();
        let natural = CanvasOptions {
            output: CropOutput::Natural,
            smoothing: Smoothing::High,
        };
        let rect = CropRect {
            x: 10.0,
            y: 10.0,
            width: 120.0,
            height: 80.0,
        };
        let image = session.save(Some(rect), &natural).unwrap();
        assert_eq!((image.width, image.height), (80, 80));
    }

    #[test]
    fn test_crop_box_clamped_to_image() {
        let mut session = CropSession::new();
        session
            .select_file(&mut ImageCropper, png_file("me.png", 100, 100), &SQUARE)
            .unwrap();
        let handle = session.handle_mut().unwrap();
        handle.set_crop_box(CropRect {
            x: 60.0,
            y: -20.0,
            width: 90.0,
            height: 90.0,
        });
        assert_eq!(
            handle.crop_box(),
            CropRect {
                x: 60.0,
                y: 0.0,
                width: 40.0,
                height: 40.0
            }
        );
    }

    fn rect(x: f32, y: f32, width: f32, height: f32) -> CropRect {
        CropRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_non_finite_crop_box_rejected() {
        let natural = CanvasOptions {
            output: CropOutput::Natural,
            smoothing: Smoothing::High,
        };
        let mut session = CropSession::new();
        session
            .select_file(&mut ImageCropper, png_file("me.png", 64, 48), &SQUARE)
            .unwrap();
        let before = session.handle_mut().unwrap().crop_box();

        for bad in [
            rect(f32::NAN, 0.0, 10.0, 10.0),
            rect(0.0, 0.0, f32::INFINITY, 10.0),
            rect(0.0, f32::NEG_INFINITY, 10.0, f32::NAN),
        ] {
            assert!(matches!(session.set_crop_box(bad), Err(CropError::InvalidCrop)));
            assert!(matches!(
                session.save(Some(bad), &natural),
                Err(CropError::InvalidCrop)
            ));
        }

        let handle = session.handle_mut().unwrap();
        handle.set_crop_box(rect(f32::NAN, 0.0, 10.0, 10.0));
        assert_eq!(handle.crop_box(), before);
        assert_eq!(session.phase(), CropPhase::Editing);
        assert!(session.set_crop_box(rect(4.0, 4.0, 20.0, 20.0)).is_ok());
    }

    #[test]
    fn test_second_select_while_open_fails() {
        let mut surface = CountingSurface::default();
        let mut session = CropSession::new();
        session
            .select_file(&mut surface, png_file("a.png", 10, 10), &SQUARE)
            .unwrap();
        assert!(matches!(
            session.select_file(&mut surface, png_file("b.png", 10, 10), &SQUARE),
            Err(CropError::SurfaceOpen)
        ));
        assert_eq!(surface.opened.get(), 1);
    }

    #[test]
    fn test_cancel_returns_to_prior_state() {
        let mut surface = CountingSurface::default();
        let mut session = CropSession::new();

        session
            .select_file(&mut surface, png_file("a.png", 10, 10), &SQUARE)
            .unwrap();
        assert!(session.cancel());
        assert_eq!(session.phase(), CropPhase::Empty);

        session
            .select_file(&mut surface, png_file("a.png", 10, 10), &SQUARE)
            .unwrap();
        let saved = session.save(None, &FIXED).unwrap().clone();

        session.edit(&mut surface, &SQUARE).unwrap();
        assert_eq!(session.image(), Some(&saved));
        assert!(session.cancel());
        assert_eq!(session.phase(), CropPhase::Saved);
        assert_eq!(session.image(), Some(&saved));

        session
            .select_file(&mut surface, png_file("b.png", 20, 20), &SQUARE)
            .unwrap();
        assert!(session.cancel());
        assert_eq!(session.raw().unwrap().name, "a.png");
        assert_eq!(surface.destroyed.get(), 4);
        assert!(!session.cancel());
    }

    #[test]
    fn test_edit_requires_saved() {
        let mut session: CropSession<ImageCropHandle> = CropSession::new();
        assert!(matches!(
            session.edit(&mut ImageCropper, &SQUARE),
            Err(CropError::NothingToEdit)
        ));
    }

    #[test]
    fn test_delete_from_any_state() {
        let mut surface = CountingSurface::default();
        let mut session = CropSession::new();
        session
            .select_file(&mut surface, png_file("a.png", 10, 10), &SQUARE)
            .unwrap();
        session.save(None, &FIXED).unwrap();
        session.edit(&mut surface, &SQUARE).unwrap();

        session.delete();
        assert_eq!(session.phase(), CropPhase::Empty);
        assert!(session.image().is_none());
        assert_eq!(surface.destroyed.get(), 2);
    }

    #[test]
    fn test_save_without_surface() {
        let mut session: CropSession<ImageCropHandle> = CropSession::new();
        assert!(matches!(
            session.save(None, &FIXED),
            Err(CropError::NotEditing)
        ));
    }
}
