//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! `identify`, which stylesheet asset functions use to read dimensions, and
//! `optimize`, which the images stage uses to re-encode files.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). It is pure Rust and
//! statically linked.

use super::params::OptimizeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: the images stage calls `optimize` from
/// rayon worker threads.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Re-encode image bytes.
    ///
    /// Returns `Ok(None)` for kinds the backend does not re-encode. A
    /// returned buffer may be larger than the input; the caller decides
    /// which to keep.
    fn optimize(
        &self,
        params: &OptimizeParams,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, BackendError>;
}
