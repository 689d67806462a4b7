//! Parameter types for image optimization.
//!
//! These describe *what* to do to an image, not *how*. The
//! [`images`](crate::images) stage builds them from `[images]` config and
//! hands them to an [`ImageBackend`](super::ImageBackend), so tests can swap
//! in a mock backend without touching stage logic.
//!
//! ## Types
//!
//! - [`ImageKind`]: format family, decided by file extension.
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OptimizationLevel`]: lossless effort (0–7, default 5). Clamped on construction.
//! - [`OptimizeParams`]: everything a backend needs for one file.

use crate::config::ImagesConfig;
use std::path::Path;

/// Format family of an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    WebP,
    Svg,
    Other,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => Self::Png,
            Some("jpg" | "jpeg") => Self::Jpeg,
            Some("gif") => Self::Gif,
            Some("webp") => Self::WebP,
            Some("svg") => Self::Svg,
            _ => Self::Other,
        }
    }

    /// Whether backends re-encode this kind. Other kinds pass through.
    pub fn is_optimizable(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Lossless optimization effort (0-7). Higher is slower and smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationLevel(pub u8);

impl OptimizationLevel {
    pub const MAX: u8 = 7;

    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        Self(5)
    }
}

/// Parameters for optimizing one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeParams {
    pub kind: ImageKind,
    pub level: OptimizationLevel,
    pub quality: Quality,
}

impl OptimizeParams {
    pub fn for_path(path: &Path, config: &ImagesConfig) -> Self {
        Self {
            kind: ImageKind::from_path(path),
            level: OptimizationLevel::new(config.optimization_level),
            quality: Quality::new(u32::from(config.jpeg_quality)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn level_clamps_to_seven() {
        assert_eq!(OptimizationLevel::new(3).value(), 3);
        assert_eq!(OptimizationLevel::new(200).value(), 7);
        assert_eq!(OptimizationLevel::default().value(), 5);
    }

    #[test]
    fn kind_from_extension_ignores_case() {
        assert_eq!(ImageKind::from_path(Path::new("a/B.PNG")), ImageKind::Png);
        assert_eq!(ImageKind::from_path(Path::new("x.jpeg")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("x.JPG")), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("logo.svg")), ImageKind::Svg);
        assert_eq!(ImageKind::from_path(Path::new("README")), ImageKind::Other);
    }

    #[test]
    fn only_png_and_jpeg_are_reencoded() {
        assert!(ImageKind::Png.is_optimizable());
        assert!(ImageKind::Jpeg.is_optimizable());
        assert!(!ImageKind::Gif.is_optimizable());
        assert!(!ImageKind::Svg.is_optimizable());
        assert!(!ImageKind::WebP.is_optimizable());
    }

    #[test]
    fn params_from_config() {
        let config = ImagesConfig {
            optimization_level: 2,
            jpeg_quality: 75,
        };
        let params = OptimizeParams::for_path(Path::new("p.jpg"), &config);
        assert_eq!(params.kind, ImageKind::Jpeg);
        assert_eq!(params.level.value(), 2);
        assert_eq!(params.quality.value(), 75);
    }
}
