//! Source watcher: re-run the stage whose sources changed.
//!
//! Each stage with a watch glob contributes one [`Registration`]. Change
//! events arrive debounced (100 ms) from `notify-debouncer-mini`, so a
//! burst of saves lands as one batch. A batch maps to the set of stages
//! whose globs match any changed path; each of those stages runs exactly
//! once, in stage order, before the next batch is read.
//!
//! ```text
//! Idle ──batch──► Dispatching(images) ──► Dispatching(styles) ──► Idle
//! ```
//!
//! A failed re-run is logged and the watcher keeps going. In development a
//! successful images, scripts or markup re-run pushes a full-page reload;
//! the styles stage pushes its own CSS event from inside its step list.

use crate::context::BuildContext;
use crate::output;
use crate::pipeline::{StageError, StageReport};
use crate::serve::ReloadEvent;
use crate::stage::StageKind;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use thiserror::Error;

pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Stages the watcher can trigger, in dispatch order.
const WATCHED: [StageKind; 4] = [
    StageKind::Images,
    StageKind::Styles,
    StageKind::Scripts,
    StageKind::Markup,
];

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to start file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    #[error("failed to watch {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("invalid watch pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("watch channel closed: {0}")]
    Channel(String),
}

/// A glob, relative to the project root, and the stage it triggers.
#[derive(Debug, Clone)]
pub struct Registration {
    pub pattern: glob::Pattern,
    pub stage: StageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Dispatching(StageKind),
}

/// One registration per watched stage of the context.
pub fn registrations(ctx: &BuildContext) -> Result<Vec<Registration>, WatchError> {
    WATCHED
        .iter()
        .filter_map(|kind| ctx.stage(*kind).watch.map(|glob| (*kind, glob)))
        .map(|(stage, glob)| {
            let pattern = glob::Pattern::new(&glob).map_err(|source| WatchError::Pattern {
                pattern: glob.clone(),
                source,
            })?;
            Ok(Registration { pattern, stage })
        })
        .collect()
}

/// Maps changed paths onto the stages they trigger.
pub struct Watcher<'a> {
    ctx: &'a BuildContext,
    registrations: Vec<Registration>,
    roots: Vec<PathBuf>,
    state: WatchState,
}

impl<'a> Watcher<'a> {
    pub fn new(ctx: &'a BuildContext) -> Result<Self, WatchError> {
        let root = ctx.layout.root.clone();
        let mut roots = vec![root.clone()];
        // Event paths may come back canonicalized (symlinked temp dirs).
        if let Ok(canonical) = root.canonicalize() {
            if canonical != root {
                roots.push(canonical);
            }
        }
        Ok(Self {
            ctx,
            registrations: registrations(ctx)?,
            roots,
            state: WatchState::Idle,
        })
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Root-relative form of an event path. Paths outside the project stay
    /// absolute, which only sources configured outside the root match.
    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        self.roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path)
    }

    /// The stages a batch of changed paths triggers, each once.
    pub fn stages_for(&self, paths: &[PathBuf]) -> BTreeSet<StageKind> {
        paths
            .iter()
            .map(|path| self.relative(path))
            .flat_map(|rel| {
                self.registrations
                    .iter()
                    .filter(move |r| r.pattern.matches_path(rel))
                    .map(|r| r.stage)
            })
            .collect()
    }

    /// Run every stage the batch triggers through `run`. Returns the stages
    /// that completed without error.
    pub fn dispatch<F>(&mut self, paths: &[PathBuf], run: &mut F) -> Vec<StageKind>
    where
        F: FnMut(StageKind) -> Result<StageReport, StageError>,
    {
        let mut succeeded = Vec::new();
        for kind in self.stages_for(paths) {
            self.state = WatchState::Dispatching(kind);
            match run(kind) {
                Ok(report) if report.abandoned.is_none() => {
                    if kind != StageKind::Styles {
                        self.ctx.notify_reload(ReloadEvent::full(None));
                    }
                    succeeded.push(kind);
                }
                Ok(_) => {}
                Err(e) => output::print_stage_failed(kind, &e),
            }
        }
        self.state = WatchState::Idle;
        succeeded
    }

    /// Block forever, dispatching debounced batches from the source tree.
    pub fn run<F>(mut self, mut run: F) -> Result<(), WatchError>
    where
        F: FnMut(StageKind) -> Result<StageReport, StageError>,
    {
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(DEBOUNCE, tx).map_err(WatchError::WatcherInit)?;
        let src = self.ctx.layout.src.clone();
        debouncer
            .watcher()
            .watch(&src, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath {
                path: src.clone(),
                source,
            })?;

        output::print_watch_started(&self.registrations);

        loop {
            match rx.recv() {
                Ok(Ok(events)) => {
                    let paths: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path)
                        .collect();
                    let stages = self.stages_for(&paths);
                    if stages.is_empty() {
                        continue;
                    }
                    output::print_watch_batch(&stages);
                    self.dispatch(&paths, &mut run);
                }
                Ok(Err(error)) => output::print_watch_error(&format!("{error:?}")),
                Err(e) => return Err(WatchError::Channel(e.to_string())),
            }
        }
    }
}
