//! Remove both output trees.

use crate::context::{Layout, Tree};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("cannot remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What the cleaner did to one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleaned {
    pub tree: Tree,
    pub path: PathBuf,
    /// False when the directory did not exist.
    pub removed: bool,
}

/// Delete the minified and pretty trees. A tree that is already gone is fine.
pub fn clean(layout: &Layout) -> Result<Vec<Cleaned>, CleanError> {
    [Tree::Minified, Tree::Pretty]
        .into_iter()
        .map(|tree| {
            let path = layout.tree(tree).to_path_buf();
            let removed = match std::fs::remove_dir_all(&path) {
                Ok(()) => true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(source) => return Err(CleanError::Remove { path, source }),
            };
            Ok(Cleaned {
                tree,
                path,
                removed,
            })
        })
        .collect()
}
