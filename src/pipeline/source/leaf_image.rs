//! Decoded leaf photos and the transforms every consumer needs.
//!
//! Key rules:
//! - phone photos carry their rotation in EXIF; fix it before anyone looks
//! - everything downstream works on 3-channel RGB
//! - oversized photos are downscaled once, before they are re-encoded for
//!   the remote vision service

use std::borrow::Cow;
use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use tracing::debug;

use super::SourceError;

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Longest edge sent to the remote vision service.
pub const MAX_VISION_DIMENSION: u32 = 1536;

/// JPEG quality used when re-encoding for the remote vision service.
const VISION_JPEG_QUALITY: u8 = 90;

/// A decoded, upright, RGB leaf image.
#[derive(Debug, Clone)]
pub struct LeafImage {
    rgb: RgbImage,
    original_width: u32,
    original_height: u32,
}

/// Image bytes ready to be attached to a remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl LeafImage {
    /// Validate, decode, fix orientation and convert to RGB.
    pub fn decode(bytes: &[u8]) -> Result<Self, SourceError> {
        validate_image_bytes(bytes)?;

        let img = image::load_from_memory(bytes).map_err(|e| {
            SourceError::ImageProcessing(format!("Failed to decode image: {e}"))
        })?;
        let (orig_w, orig_h) = img.dimensions();

        let img = apply_orientation(img, read_exif_orientation(bytes));
        let rgb = img.to_rgb8();

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            upright = format!("{}x{}", rgb.width(), rgb.height()),
            "Leaf image decoded"
        );

        Ok(Self {
            rgb,
            original_width: orig_w,
            original_height: orig_h,
        })
    }

    /// Wrap an already-decoded RGB buffer.
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let (w, h) = rgb.dimensions();
        Self {
            rgb,
            original_width: w,
            original_height: h,
        }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Dimensions as stored in the file, before orientation correction.
    pub fn original_dimensions(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// JPEG for the remote vision service, downscaled to `MAX_VISION_DIMENSION`.
    pub fn to_vision_jpeg(&self) -> Result<EncodedImage, SourceError> {
        let working = downscale_to(&self.rgb, MAX_VISION_DIMENSION);
        let bytes = encode(&working, ImageOutputFormat::Jpeg(VISION_JPEG_QUALITY))?;
        Ok(EncodedImage {
            mime_type: "image/jpeg",
            bytes,
        })
    }

    /// Lossless PNG of the full image.
    pub fn to_png(&self) -> Result<EncodedImage, SourceError> {
        let bytes = encode(&self.rgb, ImageOutputFormat::Png)?;
        Ok(EncodedImage {
            mime_type: "image/png",
            bytes,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Pure helper functions
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
/// Returns early error for clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), SourceError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(SourceError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(SourceError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Shrink so the longest edge is at most `max_dim`. Never upscales.
fn downscale_to(img: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = img.dimensions();
    let largest = w.max(h);

    if largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling leaf image for vision request"
    );

    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

fn encode(img: &RgbImage, format: ImageOutputFormat) -> Result<Vec<u8>, SourceError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, format)
        .map_err(|e| SourceError::ImageProcessing(format!("Image encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
