//! Intake of user-picked images before they are sent to the model.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::capabilities::PickedImage;

pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
/// Longer side above which images are downscaled before upload.
pub const MAX_UPLOAD_DIMENSION: u32 = 1536;

const MAX_DECODE_DIMENSION: u32 = 8192;
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;
const JPEG_QUALITY: u8 = 85;

/// Allowed image formats - explicit allowlist
const ALLOWED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("input bytes empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

pub const UNSUPPORTED_IMAGE_NOTICE: &str = "Formato no soportado. Usa una imagen JPG, PNG o WebP.";
pub const IMAGE_TOO_LARGE_NOTICE: &str = "La imagen es demasiado grande.";
pub const UNREADABLE_IMAGE_NOTICE: &str = "No se pudo leer la imagen.";
pub const PHOTO_PERMISSION_NOTICE: &str = "Sin permiso para acceder a las fotos.";

impl AttachmentError {
    /// Short explanation shown under the composer.
    #[must_use]
    pub fn notice(&self) -> &'static str {
        match self {
            AttachmentError::UnsupportedFormat => UNSUPPORTED_IMAGE_NOTICE,
            AttachmentError::InputTooLarge { .. } => IMAGE_TOO_LARGE_NOTICE,
            AttachmentError::EmptyInput
            | AttachmentError::Decode(_)
            | AttachmentError::Encode(_) => UNREADABLE_IMAGE_NOTICE,
        }
    }
}

/// An image staged for the next message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttachment {
    /// Transient local reference the shell can display.
    pub preview_uri: String,
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

// Bytes are noise in logs.
impl std::fmt::Debug for PendingAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAttachment")
            .field("preview_uri", &self.preview_uri)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl PendingAttachment {
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        _ => "image/jpeg",
    }
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Validate a picked image and shrink it if it is larger than needed.
///
/// The MIME type is taken from the sniffed content, not from the shell.
pub fn prepare_attachment(picked: PickedImage) -> Result<PendingAttachment, AttachmentError> {
    let PickedImage {
        uri,
        mime_type: reported_mime,
        data,
    } = picked;

    if data.is_empty() {
        return Err(AttachmentError::EmptyInput);
    }
    if data.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::InputTooLarge {
            size: data.len(),
            max_size: MAX_ATTACHMENT_BYTES,
        });
    }

    let format = image::guess_format(&data).map_err(|_| AttachmentError::UnsupportedFormat)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(AttachmentError::UnsupportedFormat);
    }
    if reported_mime != mime_for(format) {
        debug!(reported = %reported_mime, sniffed = mime_for(format), "attachment mime mismatch");
    }

    let (width, height) = ImageReader::with_format(Cursor::new(&data), format)
        .into_dimensions()
        .map_err(|e| AttachmentError::Decode(e.to_string()))?;

    if width.max(height) <= MAX_UPLOAD_DIMENSION {
        return Ok(PendingAttachment {
            preview_uri: uri,
            mime_type: mime_for(format).to_string(),
            data,
            width,
            height,
        });
    }

    let mut reader = ImageReader::with_format(Cursor::new(&data), format);
    reader.limits(decode_limits());
    let img = reader
        .decode()
        .map_err(|e| AttachmentError::Decode(e.to_string()))?;

    let resized = img
        .resize(MAX_UPLOAD_DIMENSION, MAX_UPLOAD_DIMENSION, FilterType::Triangle)
        .to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| AttachmentError::Encode(e.to_string()))?;

    debug!(
        from_width = width,
        from_height = height,
        to_width = resized.width(),
        to_height = resized.height(),
        bytes = out.len(),
        "attachment downscaled"
    );

    Ok(PendingAttachment {
        preview_uri: uri,
        mime_type: "image/jpeg".to_string(),
        width: resized.width(),
        height: resized.height(),
        data: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 160, 60]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn picked(data: Vec<u8>, mime: &str) -> PickedImage {
        PickedImage {
            uri: "blob:local/1".into(),
            mime_type: mime.into(),
            data,
        }
    }

    #[test]
    fn test_small_png_passes_through() {
        let data = png_bytes(64, 48);
        let att = prepare_attachment(picked(data.clone(), "image/png")).unwrap();
        assert_eq!(att.mime_type, "image/png");
        assert_eq!(att.data, data);
        assert_eq!((att.width, att.height), (64, 48));
        assert_eq!(att.preview_uri, "blob:local/1");
    }

    #[test]
    fn test_mime_taken_from_content() {
        let att = prepare_attachment(picked(png_bytes(8, 8), "image/jpeg")).unwrap();
        assert_eq!(att.mime_type, "image/png");
    }

    #[test]
    fn test_large_image_downscaled_to_jpeg() {
        let att = prepare_attachment(picked(png_bytes(2000, 100), "image/png")).unwrap();
        assert_eq!(att.mime_type, "image/jpeg");
        assert_eq!(att.width, MAX_UPLOAD_DIMENSION);
        assert!(att.height <= 100);
        assert_eq!(image::guess_format(&att.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(
            prepare_attachment(picked(Vec::new(), "image/png")),
            Err(AttachmentError::EmptyInput)
        );
    }

    #[test]
    fn test_too_large_rejected() {
        let data = vec![0u8; MAX_ATTACHMENT_BYTES + 1];
        assert!(matches!(
            prepare_attachment(picked(data, "image/png")),
            Err(AttachmentError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn test_not_an_image_rejected() {
        let data = b"%PDF-1.7 this is not an image at all".to_vec();
        let err = prepare_attachment(picked(data, "application/pdf")).unwrap_err();
        assert_eq!(err, AttachmentError::UnsupportedFormat);
        assert_eq!(err.notice(), UNSUPPORTED_IMAGE_NOTICE);
    }

    #[test]
    fn test_base64_encoding() {
        let att = PendingAttachment {
            preview_uri: String::new(),
            mime_type: "image/png".into(),
            data: vec![0xFF, 0x00, 0x10],
            width: 1,
            height: 1,
        };
        assert_eq!(att.to_base64(), "/wAQ");
    }
}
