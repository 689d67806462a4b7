//! Shared test utilities for the webpipe test suite.
//!
//! Provides a sample project and small filesystem helpers.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let project = sample_project();
//! let ctx = BuildContext::new(project.path(), PipelineConfig::default(), BuildMode::Production);
//! tasks::build_all(&ctx).unwrap();
//!
//! let files = tree_files(&ctx.layout.build_min);
//! assert!(files.contains(&"css/style.css".to_string()));
//! ```

use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/project/` to a temp directory and add generated images.
///
/// | Path | Content |
/// |---|---|
/// | `src/images/logo.png` | 32×24 gradient |
/// | `src/images/icons/dot.png` | 4×4 solid |
/// | `src/images/photo.jpg` | 64×48 gradient |
/// | `src/scss/style.scss` | entry with a partial and asset functions |
/// | `src/js/main.js` | requires `./lib/greet.js` |
/// | `src/html/index.html` | includes `partials/header.html` |
pub fn sample_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();

    let images = tmp.path().join("src/images");
    write_image(&images.join("logo.png"), 32, 24);
    write_image(&images.join("icons/dot.png"), 4, 4);
    write_image(&images.join("photo.jpg"), 64, 48);
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Files
// =========================================================================

/// Write a file, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn gradient(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    })
}

/// Save a gradient image at `path`, encoded by its extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    gradient(width, height).save(path).unwrap();
}

/// Relative paths of every file under `root`, sorted, with forward slashes.
pub fn tree_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Read a text file. Panics with the path on failure.
pub fn read_text(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}
