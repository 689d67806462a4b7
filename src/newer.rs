//! Modification-time freshness checks for incremental image builds.
//!
//! Image optimization is the slowest step of a full build, and its output
//! depends on nothing but the source bytes and the optimization settings.
//! Before optimizing, the images stage drops every source whose counterpart
//! in the minified tree is at least as new as the source.
//!
//! ## Rule
//!
//! | Destination | Source mtime vs destination mtime | Result |
//! |---|---|---|
//! | missing | n/a | stale, rebuilt |
//! | present | source newer | stale, rebuilt |
//! | present | source same age or older | fresh, skipped |
//!
//! The check compares timestamps only. Touching a source without changing
//! it re-optimizes it; changing optimization settings does not invalidate
//! existing outputs. Run `clean` after changing `[images]` settings.

use crate::pipeline::FileRecord;
use std::io;
use std::path::{Path, PathBuf};

/// True when `dest` exists and is not older than `source`.
pub fn is_up_to_date(source: &Path, dest: &Path) -> io::Result<bool> {
    let dest_modified = match std::fs::metadata(dest) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let source_modified = std::fs::metadata(source)?.modified()?;
    Ok(source_modified <= dest_modified)
}

/// Split records into those needing a rebuild and a count of fresh ones.
///
/// Each record's destination is `dest_dir` joined with its relative path.
/// Records produced in memory, with no source on disk, are always kept.
pub fn retain_stale(files: Vec<FileRecord>, dest_dir: &Path) -> io::Result<(Vec<FileRecord>, u32)> {
    let mut stale = Vec::with_capacity(files.len());
    let mut fresh = 0;
    for file in files {
        let up_to_date = match &file.source {
            Some(source) => is_up_to_date(source, &dest_dir.join(&file.path))?,
            None => false,
        };
        if up_to_date {
            fresh += 1;
        } else {
            stale.push(file);
        }
    }
    Ok((stale, fresh))
}

/// Split matched source paths before anything is read. Each destination is
/// `dest_dir` joined with the path relative to `base`.
pub fn stale_paths(
    paths: Vec<PathBuf>,
    base: &Path,
    dest_dir: &Path,
) -> io::Result<(Vec<PathBuf>, u32)> {
    let mut stale = Vec::with_capacity(paths.len());
    let mut fresh = 0;
    for path in paths {
        let rel = path.strip_prefix(base).unwrap_or(&path);
        if is_up_to_date(&path, &dest_dir.join(rel))? {
            fresh += 1;
        } else {
            stale.push(path);
        }
    }
    Ok((stale, fresh))
}
