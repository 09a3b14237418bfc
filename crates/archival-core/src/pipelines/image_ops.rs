//! Codec operations shared by the Machinist pipeline: magic-byte
//! validation, dimension probing, resizing, letterboxing, and JPEG
//! re-encoding. Every entry point is synchronous and CPU-bound; callers
//! run it inside `tokio::task::spawn_blocking` and race it against
//! `SHARP_TIMEOUT_MS` the way the teacher's upload handlers race
//! `reqwest` calls against a deadline.

use crate::Error;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::time::Duration;

/// Magic-byte prefixes for the three accepted formats.
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const TIFF_MAGIC_LE: &[u8] = &[0x49, 0x49, 0x2A, 0x00];
const TIFF_MAGIC_BE: &[u8] = &[0x4D, 0x4D, 0x00, 0x2A];

/// Validate a decoded buffer against the magic-byte allow-list (JPEG, PNG,
/// TIFF). Zero-length buffers and unrecognized signatures both raise
/// `UnsupportedMedia`.
pub fn validate_magic_bytes(data: &[u8]) -> Result<ImageFormat, Error> {
    if data.is_empty() {
        return Err(Error::unsupported_media("empty image buffer"));
    }

    if data.starts_with(JPEG_MAGIC) {
        Ok(ImageFormat::Jpeg)
    } else if data.starts_with(PNG_MAGIC) {
        Ok(ImageFormat::Png)
    } else if data.starts_with(TIFF_MAGIC_LE) || data.starts_with(TIFF_MAGIC_BE) {
        Ok(ImageFormat::Tiff)
    } else {
        Err(Error::unsupported_media("magic bytes do not match JPEG, PNG, or TIFF"))
    }
}

/// Resolution gates enforced against a decoded image (§4.6 step 4).
pub struct ResolutionBounds {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

pub fn enforce_resolution_bounds(width: u32, height: u32, bounds: &ResolutionBounds) -> Result<(), Error> {
    if width < bounds.min_width || height < bounds.min_height {
        return Err(Error::resource(format!(
            "image too small: {}x{} (minimum {}x{})",
            width, height, bounds.min_width, bounds.min_height
        )));
    }
    if width > bounds.max_width || height > bounds.max_height {
        return Err(Error::resource(format!(
            "image too large: {}x{} (maximum {}x{})",
            width, height, bounds.max_width, bounds.max_height
        )));
    }
    Ok(())
}

/// Decode a buffer already validated by `validate_magic_bytes`.
pub fn decode(data: &[u8], format: ImageFormat) -> Result<DynamicImage, Error> {
    image::load_from_memory_with_format(data, format)
        .map_err(|e| Error::unsupported_media(format!("failed to decode image: {}", e)))
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, Error> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| Error::storage(format!("jpeg encode failed: {}", e)))?;
    Ok(buf.into_inner())
}

/// `viewing` derivative: resized to a maximum width, JPEG quality 85.
pub fn render_viewing(image: &DynamicImage, max_width: u32) -> Result<Vec<u8>, Error> {
    let resized = resize_max_width(image, max_width);
    encode_jpeg(&resized, 85)
}

/// `ai` derivative: letterboxed onto a white square, JPEG quality 80.
pub fn render_ai_letterbox(image: &DynamicImage, side: u32) -> Result<Vec<u8>, Error> {
    let letterboxed = letterbox_square(image, side);
    encode_jpeg(&letterboxed, 80)
}

/// A thumbnail at a fixed target width, JPEG quality 80.
pub fn render_thumbnail(image: &DynamicImage, width: u32) -> Result<Vec<u8>, Error> {
    let resized = resize_max_width(image, width);
    encode_jpeg(&resized, 80)
}

fn resize_max_width(image: &DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width {
        return image.clone();
    }
    let ratio = max_width as f64 / width as f64;
    let target_height = ((height as f64) * ratio).round().max(1.0) as u32;
    image.resize_exact(max_width, target_height, FilterType::Lanczos3)
}

/// Scale the image to fit within `side`x`side`, then paste it centered onto
/// an opaque white canvas of that exact size.
fn letterbox_square(image: &DynamicImage, side: u32) -> DynamicImage {
    let fitted = image.resize(side, side, FilterType::Lanczos3);
    let (fitted_w, fitted_h) = fitted.dimensions();

    let mut canvas = DynamicImage::new_rgb8(side, side);
    for pixel in canvas.as_mut_rgb8().expect("freshly created rgb8 canvas").pixels_mut() {
        *pixel = image::Rgb([255, 255, 255]);
    }

    let offset_x = (side.saturating_sub(fitted_w)) / 2;
    let offset_y = (side.saturating_sub(fitted_h)) / 2;
    image::imageops::overlay(&mut canvas, &fitted, offset_x as i64, offset_y as i64);
    canvas
}

/// Re-encode progressively smaller JPEGs until the output fits
/// `max_bytes`, trying the quality ladder in descending order. Used by
/// the Archivist pipeline's pre-upload size guard (§4.7 step 2).
pub fn reencode_under_size(image: &DynamicImage, max_bytes: usize, quality_ladder: &[u8]) -> Result<Vec<u8>, Error> {
    let mut last = None;
    for &quality in quality_ladder {
        let encoded = encode_jpeg(image, quality)?;
        if encoded.len() <= max_bytes {
            return Ok(encoded);
        }
        last = Some(encoded);
    }
    last.ok_or_else(|| Error::resource("empty quality ladder"))
}

/// Run a codec operation on the blocking thread pool, bounded by
/// `timeout`. Maps a timeout into `Error::Timeout` and a panicked blocking
/// task into `Error::Storage`.
pub async fn guarded<F, T>(timeout: Duration, op: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(op);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Error::storage(format!("image codec task panicked: {}", join_error))),
        Err(_) => Err(Error::timeout("image codec operation exceeded its time budget")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_magic_bytes_jpeg() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(validate_magic_bytes(&data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_validate_magic_bytes_rejects_unknown() {
        let data = vec![0x00, 0x01, 0x02, 0x03];
        assert!(validate_magic_bytes(&data).is_err());
    }

    #[test]
    fn test_validate_magic_bytes_rejects_empty() {
        assert!(validate_magic_bytes(&[]).is_err());
    }

    #[test]
    fn test_enforce_resolution_bounds_accepts_minimum() {
        let bounds = ResolutionBounds { min_width: 300, min_height: 300, max_width: 12_000, max_height: 12_000 };
        assert!(enforce_resolution_bounds(300, 300, &bounds).is_ok());
        assert!(enforce_resolution_bounds(299, 300, &bounds).is_err());
    }

    #[test]
    fn test_resize_max_width_preserves_aspect_ratio() {
        let image = DynamicImage::new_rgb8(1000, 500);
        let resized = resize_max_width(&image, 200);
        assert_eq!(resized.dimensions(), (200, 100));
    }

    #[test]
    fn test_letterbox_square_produces_exact_side() {
        let image = DynamicImage::new_rgb8(800, 200);
        let squared = letterbox_square(&image, 768);
        assert_eq!(squared.dimensions(), (768, 768));
    }
}
