//! The immutable build context shared by every stage.
//!
//! Built once at startup from the loaded [`PipelineConfig`] and the resolved
//! [`BuildMode`]. Stages receive it by reference; none of them reads the
//! environment or the config file again.

use crate::config::{DirsConfig, PipelineConfig};
use crate::mode::{BuildMode, Profile};
use crate::serve::{ReloadEvent, ReloadHub};
use crate::stage::{StageDescriptor, StageKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One of the two output trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tree {
    /// Human-readable output.
    Pretty,
    /// Size-optimized output, served by the dev server.
    Minified,
}

impl Tree {
    pub fn label(self) -> &'static str {
        match self {
            Tree::Pretty => "pretty",
            Tree::Minified => "min",
        }
    }
}

/// Resolved directory locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub src: PathBuf,
    pub build_min: PathBuf,
    pub build_pretty: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, dirs: &DirsConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            src: root.join(&dirs.src),
            build_min: root.join(&dirs.build_min),
            build_pretty: root.join(&dirs.build_pretty),
        }
    }

    /// Root directory of an output tree.
    pub fn tree(&self, tree: Tree) -> &Path {
        match tree {
            Tree::Pretty => &self.build_pretty,
            Tree::Minified => &self.build_min,
        }
    }
}

#[derive(Debug)]
pub struct BuildContext {
    pub config: PipelineConfig,
    pub layout: Layout,
    pub mode: BuildMode,
    pub profile: Profile,
    reload: Option<Arc<ReloadHub>>,
}

impl BuildContext {
    /// Create the context. A reload hub exists only when the profile asks
    /// for live reload.
    pub fn new(project_root: &Path, config: PipelineConfig, mode: BuildMode) -> Self {
        let profile = mode.profile();
        let layout = Layout::new(project_root, &config.dirs);
        let reload = profile.live_reload.then(|| Arc::new(ReloadHub::new()));
        Self {
            config,
            layout,
            mode,
            profile,
            reload,
        }
    }

    pub fn reload_hub(&self) -> Option<&Arc<ReloadHub>> {
        self.reload.as_ref()
    }

    /// Push a live-reload event to connected clients. No-op outside development.
    pub fn notify_reload(&self, event: ReloadEvent) {
        if let Some(hub) = &self.reload {
            hub.notify(event);
        }
    }

    /// Describe a stage for this context's config and profile.
    pub fn stage(&self, kind: StageKind) -> StageDescriptor {
        StageDescriptor::build(kind, &self.config, &self.layout, self.profile)
    }
}
