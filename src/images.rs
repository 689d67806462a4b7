//! Image optimization step.
//!
//! Every record that survived the freshness check is handed to the image
//! backend in parallel (rayon, sized by `[processing] max_processes`). The
//! smaller of the original and the re-encoded bytes wins, so a file never
//! grows. Kinds the backend does not re-encode pass through unchanged.
//!
//! A file that cannot be decoded fails the whole stage.

use crate::config::ImagesConfig;
use crate::imaging::{BackendError, ImageBackend, OptimizeParams};
use crate::pipeline::FileRecord;
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagesError {
    #[error("failed to optimize {path}: {source}")]
    Optimize {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Counts for the images stage summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    /// Up to date in the output tree, not read further.
    pub skipped: u32,
    /// Re-encoded smaller.
    pub optimized: u32,
    /// Passed through or not improved by re-encoding.
    pub kept: u32,
    pub bytes_saved: u64,
}

impl ImageStats {
    pub fn total(&self) -> u32 {
        self.skipped + self.optimized + self.kept
    }
}

impl fmt::Display for ImageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped > 0 {
            write!(
                f,
                "{} up to date, {} optimized, {} unchanged ({} total)",
                self.skipped,
                self.optimized,
                self.kept,
                self.total()
            )
        } else {
            write!(f, "{} optimized, {} unchanged", self.optimized, self.kept)
        }
    }
}

enum Outcome {
    Optimized(u64),
    Kept,
}

fn optimize_one(
    backend: &dyn ImageBackend,
    mut file: FileRecord,
    config: &ImagesConfig,
) -> Result<(FileRecord, Outcome), ImagesError> {
    let params = OptimizeParams::for_path(&file.path, config);
    let optimized = backend
        .optimize(&params, &file.contents)
        .map_err(|source| ImagesError::Optimize {
            path: file.path.clone(),
            source,
        })?;

    match optimized {
        Some(bytes) if bytes.len() < file.contents.len() => {
            let saved = (file.contents.len() - bytes.len()) as u64;
            file.contents = bytes;
            Ok((file, Outcome::Optimized(saved)))
        }
        _ => Ok((file, Outcome::Kept)),
    }
}

/// Optimize every record. Output order matches input order.
pub fn optimize_all(
    backend: &dyn ImageBackend,
    files: Vec<FileRecord>,
    config: &ImagesConfig,
    stats: &mut ImageStats,
) -> Result<Vec<FileRecord>, ImagesError> {
    let results: Vec<(FileRecord, Outcome)> = files
        .into_par_iter()
        .map(|file| optimize_one(backend, file, config))
        .collect::<Result<_, _>>()?;

    let mut out = Vec::with_capacity(results.len());
    for (file, outcome) in results {
        match outcome {
            Outcome::Optimized(saved) => {
                stats.optimized += 1;
                stats.bytes_saved += saved;
            }
            Outcome::Kept => stats.kept += 1,
        }
        out.push(file);
    }
    Ok(out)
}
