//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header read, no full decode) |
//! | Decode (JPEG, PNG) | `image::load_from_memory_with_format` |
//! | Encode PNG | `PngEncoder::new_with_quality`, adaptive filtering |
//! | Encode JPEG | `JpegEncoder::new_with_quality` |
//!
//! PNG re-encoding is lossless. The optimization level only picks the
//! deflate effort:
//!
//! | Level | Compression |
//! |---|---|
//! | 0-1 | fast |
//! | 2-4 | default |
//! | 5-7 | best |
//!
//! JPEG re-encoding is lossy at the configured quality. GIF, WebP, SVG and
//! everything else pass through untouched.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{ImageKind, OptimizationLevel, OptimizeParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn png_compression(level: OptimizationLevel) -> CompressionType {
    match level.value() {
        0..=1 => CompressionType::Fast,
        2..=4 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn decode(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, BackendError> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))
}

fn encode_png(img: &DynamicImage, level: OptimizationLevel) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, png_compression(level), FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {e}")))?;
    Ok(out)
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let quality = u8::try_from(quality.value()).unwrap_or(100);
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    // The JPEG encoder has no alpha channel support.
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn optimize(
        &self,
        params: &OptimizeParams,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, BackendError> {
        match params.kind {
            ImageKind::Png => {
                let img = decode(bytes, ImageFormat::Png)?;
                encode_png(&img, params.level).map(Some)
            }
            ImageKind::Jpeg => {
                let img = decode(bytes, ImageFormat::Jpeg)?;
                encode_jpeg(&img, params.quality).map(Some)
            }
            ImageKind::Gif | ImageKind::WebP | ImageKind::Svg | ImageKind::Other => Ok(None),
        }
    }
}
