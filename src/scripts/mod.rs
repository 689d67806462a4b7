//! Script steps: bundle, attach build metadata, compress.
//!
//! The scripts stage bundles top-level entries into one file and writes
//! the same bytes to both trees. Compression is a separate stage that reads
//! the minified tree's scripts back and overwrites them minified, so the
//! bundle step never depends on the build mode.

pub mod bundle;
pub mod compress;
pub mod esm;
pub mod lexer;

use crate::mode::BuildMode;
use crate::pipeline::FileRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use bundle::Bundle;
pub use compress::minify_all;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("cannot resolve '{request}' from {from}")]
    ModuleNotFound { from: String, request: String },
    #[error("{module}:{line}: {message}")]
    Syntax {
        module: String,
        line: usize,
        message: String,
    },
    #[error("{0} is not valid UTF-8")]
    NotUtf8(PathBuf),
    #[error("failed to minify {path}: {message}")]
    Minify { path: PathBuf, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptError {
    /// A syntax error in `module`, located by line.
    pub(crate) fn syntax(module: &str, source: &str, err: lexer::SyntaxError) -> Self {
        let before = source.get(..err.offset).unwrap_or(source);
        ScriptError::Syntax {
            module: module.to_string(),
            line: before.matches('\n').count() + 1,
            message: err.message,
        }
    }
}

/// Metadata keys recorded on the bundle.
pub const META_MODE: &str = "build.mode";
pub const META_MODULES: &str = "bundle.modules";
pub const META_ENTRIES: &str = "bundle.entries";

/// Bundle every entry record into one file named `bundle_name`.
///
/// No entries means no bundle.
pub fn bundle(
    files: Vec<FileRecord>,
    base: &Path,
    bundle_name: &str,
) -> Result<Vec<FileRecord>, ScriptError> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    let graph = Bundle::build(base, &files)?;
    let mut record = FileRecord::new(bundle_name, graph.render()?);
    record.original_size = files.iter().map(|f| f.original_size).sum();
    record
        .metadata
        .insert(META_MODULES.to_string(), graph.modules.len().to_string());
    record
        .metadata
        .insert(META_ENTRIES.to_string(), graph.entries.join(","));
    Ok(vec![record])
}

/// Record the build mode on every record.
pub fn attach_metadata(mut files: Vec<FileRecord>, mode: BuildMode) -> Vec<FileRecord> {
    for file in &mut files {
        file.metadata
            .insert(META_MODE.to_string(), mode.as_str().to_string());
    }
    files
}
