//! Stylesheet steps.
//!
//! The style stage compiles one SCSS entry into one CSS file and then runs
//! text passes over it:
//!
//! | Step | Module | Crate |
//! |---|---|---|
//! | compile | here | `grass` (expanded output) |
//! | asset functions | [`assets`] | `regex`, `base64`, image backend |
//! | autoprefix, minify, source map | [`css`] | `lightningcss`, `parcel_sourcemap` |
//! | purge unused selectors | [`purge`] | `regex` + `lightningcss` unused symbols |
//!
//! Every error here is a [`StyleError`]. The task layer logs those and
//! abandons the run without writing anything, leaving the previous output
//! in place.

pub mod assets;
pub mod css;
pub mod purge;

use crate::imaging::BackendError;
use crate::markup::MarkupError;
use crate::pipeline::FileRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use assets::rewrite_assets;
pub use css::{autoprefix, inline_source_map, minify};
pub use purge::{purge_unused, used_markup};

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("stylesheet entry not found: {0}")]
    MissingEntry(PathBuf),
    #[error("SCSS compilation failed: {0}")]
    Compile(String),
    #[error("{function}('{asset}'): no such file {path}")]
    MissingAsset {
        function: String,
        asset: String,
        path: PathBuf,
    },
    #[error("{function}('{asset}'): {source}")]
    Asset {
        function: String,
        asset: String,
        #[source]
        source: BackendError,
    },
    #[error("invalid browser query: {0}")]
    Browsers(String),
    #[error("CSS error in {path}: {message}")]
    Css { path: PathBuf, message: String },
    #[error("source map error: {0}")]
    SourceMap(String),
    #[error("{0} is not valid UTF-8")]
    NotUtf8(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("markup scan failed: {0}")]
    Markup(#[from] MarkupError),
}

/// UTF-8 contents of a record, or the matching error.
pub(crate) fn text_of(file: &FileRecord) -> Result<&str, StyleError> {
    file.text().ok_or_else(|| StyleError::NotUtf8(file.path.clone()))
}

/// Compile the entry stylesheet.
///
/// `files` is the entry as read from the source set. It is empty when the
/// entry does not exist, which is an error. The compiled record keeps the
/// entry's relative path with a `.css` extension.
pub fn compile(files: Vec<FileRecord>, entry: &Path) -> Result<Vec<FileRecord>, StyleError> {
    let Some(source) = files.into_iter().next() else {
        return Err(StyleError::MissingEntry(entry.to_path_buf()));
    };
    let options = grass::Options::default().style(grass::OutputStyle::Expanded);
    let css = grass::from_path(entry, &options).map_err(|e| StyleError::Compile(e.to_string()))?;

    let mut compiled = FileRecord::new(source.path.with_extension("css"), css);
    compiled.source = source.source;
    compiled.original_size = source.original_size;
    Ok(vec![compiled])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(tmp: &TempDir, scss: &str) -> (PathBuf, Vec<FileRecord>) {
        let dir = tmp.path().join("scss");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("style.scss");
        std::fs::write(&path, scss).unwrap();
        let record = FileRecord::load(&dir, &path).unwrap();
        (path, vec![record])
    }

    #[test]
    fn compiles_variables_and_nesting() {
        let tmp = TempDir::new().unwrap();
        let (path, files) = entry(&tmp, "$c: #333;\nnav { a { color: $c; } }\n");
        let out = compile(files, &path).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, PathBuf::from("style.css"));
        let css = out[0].text().unwrap();
        assert!(css.contains("nav a"), "{css}");
        assert!(css.contains("#333"), "{css}");
    }

    #[test]
    fn resolves_partials_next_to_entry() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("scss")).unwrap();
        std::fs::write(tmp.path().join("scss/_base.scss"), ".base { margin: 0; }\n").unwrap();
        let (path, files) = entry(&tmp, "@import 'base';\n.x { padding: 1px; }\n");
        let out = compile(files, &path).unwrap();
        assert!(out[0].text().unwrap().contains(".base"));
    }

    #[test]
    fn missing_entry_is_error() {
        let err = compile(Vec::new(), Path::new("/p/src/scss/style.scss")).unwrap_err();
        assert!(matches!(err, StyleError::MissingEntry(_)));
    }

    #[test]
    fn syntax_error_is_compile_error() {
        let tmp = TempDir::new().unwrap();
        let (path, files) = entry(&tmp, ".x { color: ; \n");
        assert!(matches!(compile(files, &path), Err(StyleError::Compile(_))));
    }
}
