//! HTML steps: partial inclusion, pretty printing, whitespace collapsing.
//!
//! The markup stage expands partials, formats the page and writes it to
//! the pretty tree, then collapses whitespace and writes the result to the
//! minified tree. All three passes share the tokenizer in [`tokens`].

pub mod format;
pub mod minify;
pub mod partials;
pub mod tokens;

use crate::pipeline::FileRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("partial not found: {0}")]
    MissingPartial(PathBuf),
    #[error("partial has no src attribute: {0}")]
    PartialWithoutSrc(String),
    #[error("partials nested deeper than {limit} levels at {path}")]
    TooDeep { path: PathBuf, limit: usize },
    #[error("{0} is not valid UTF-8")]
    NotUtf8(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_text(
    files: Vec<FileRecord>,
    f: impl Fn(&str) -> Result<String, MarkupError>,
) -> Result<Vec<FileRecord>, MarkupError> {
    files
        .into_iter()
        .map(|mut file| {
            let text = file
                .text()
                .ok_or_else(|| MarkupError::NotUtf8(file.path.clone()))?;
            let out = f(text)?;
            file.set_text(out);
            Ok(file)
        })
        .collect()
}

/// Expand partials in every page.
pub fn inline_all(
    files: Vec<FileRecord>,
    partials_base: &Path,
) -> Result<Vec<FileRecord>, MarkupError> {
    map_text(files, |html| partials::inline(html, partials_base))
}

/// Pretty-print every page.
pub fn format_all(files: Vec<FileRecord>) -> Result<Vec<FileRecord>, MarkupError> {
    map_text(files, |html| Ok(format::format(html)))
}

/// Collapse whitespace in every page.
pub fn collapse_all(files: Vec<FileRecord>) -> Result<Vec<FileRecord>, MarkupError> {
    map_text(files, |html| Ok(minify::collapse(html)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn page_round_trip_through_all_passes() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("partials")).unwrap();
        std::fs::write(
            tmp.path().join("partials/header.html"),
            "<header><h1>@@title</h1></header>",
        )
        .unwrap();

        let page = FileRecord::new(
            "index.html",
            "<html><body><partial src=\"partials/header.html\" title=\"Hi\"></partial><p>x</p></body></html>",
        );
        let inlined = inline_all(vec![page], tmp.path()).unwrap();
        let pretty = format_all(inlined).unwrap();
        let pretty_text = pretty[0].text().unwrap().to_string();
        assert!(pretty_text.contains("    <header>\n      <h1>Hi</h1>\n    </header>"));

        let min = collapse_all(pretty).unwrap();
        assert_eq!(
            min[0].text().unwrap(),
            "<html><body><header><h1>Hi</h1></header><p>x</p></body></html>"
        );
    }

    #[test]
    fn binary_page_is_rejected() {
        let files = vec![FileRecord::new("bad.html", vec![0xc3, 0x28])];
        assert!(matches!(format_all(files), Err(MarkupError::NotUtf8(_))));
    }
}
