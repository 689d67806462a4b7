//! Image processing: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Optimize PNG** | lossless re-encode, deflate effort from the level |
//! | **Optimize JPEG** | re-encode at the configured quality |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing an optimization
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use params::{ImageKind, OptimizationLevel, OptimizeParams, Quality};
pub use rust_backend::RustBackend;
