//! The stage runner: source set in, ordered steps, files out.
//!
//! A stage run reads every file matched by its
//! [`SourceSet`](crate::stage::SourceSet) into a [`FileRecord`], then
//! threads the record list through the descriptor's steps in order.
//! Freshness checks at the head of the list run on paths before anything is
//! read. Steps may transform contents, rename, drop files, merge
//! several files into one, or write the current set to an output tree. Two
//! `Write` steps around a transformation give the pretty/minified split.
//!
//! ```text
//! glob ──► [FileRecord] ──step──► [FileRecord] ──step──► … ──write──► tree
//! ```
//!
//! Nothing here knows about a particular asset type; each step delegates to
//! its module ([`images`](crate::images), [`styles`](crate::styles),
//! [`scripts`](crate::scripts), [`markup`](crate::markup)).
//!
//! The first failing step aborts the run. Whatever earlier `Write` steps put
//! on disk stays there.

use crate::context::BuildContext;
use crate::imaging::{ImageBackend, RustBackend};
use crate::images::{self, ImageStats, ImagesError};
use crate::markup::{self, MarkupError};
use crate::newer;
use crate::output;
use crate::scripts::{self, ScriptError};
use crate::serve::ReloadEvent;
use crate::stage::{StageDescriptor, StageKind, Step};
use crate::styles::{self, StyleError};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Images(#[from] ImagesError),
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Markup(#[from] MarkupError),
}

/// A file flowing through a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the stage's source base (and to each destination).
    pub path: PathBuf,
    pub contents: Vec<u8>,
    /// Absolute source path, when the record was read from disk.
    pub source: Option<PathBuf>,
    /// Size when first read, for size reporting.
    pub original_size: u64,
    pub metadata: BTreeMap<String, String>,
}

impl FileRecord {
    /// A record produced in memory (bundles, compiled stylesheets).
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let contents = contents.into();
        Self {
            path: path.into(),
            original_size: contents.len() as u64,
            contents,
            source: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Read a source file. The record's path is `source` relative to `base`.
    pub fn load(base: &Path, source: &Path) -> io::Result<Self> {
        let contents = std::fs::read(source)?;
        let path = match source.strip_prefix(base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| source.to_path_buf()),
        };
        Ok(Self {
            path,
            original_size: contents.len() as u64,
            contents,
            source: Some(source.to_path_buf()),
            metadata: BTreeMap::new(),
        })
    }

    /// Contents as UTF-8, if they are.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn set_text(&mut self, text: String) {
        self.contents = text.into_bytes();
    }

    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Relative path with forward slashes, for display and URLs.
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

/// What a completed stage run did.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: StageKind,
    /// Every file written, across all trees.
    pub outputs: Vec<PathBuf>,
    pub images: ImageStats,
    pub elapsed: Duration,
    /// Set when the run was abandoned on a non-fatal error.
    pub abandoned: Option<String>,
}

impl StageReport {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            outputs: Vec::new(),
            images: ImageStats::default(),
            elapsed: Duration::ZERO,
            abandoned: None,
        }
    }

    pub fn abandoned(kind: StageKind, reason: String) -> Self {
        Self {
            abandoned: Some(reason),
            ..Self::new(kind)
        }
    }
}

fn load_all(base: &Path, paths: &[PathBuf]) -> Result<Vec<FileRecord>, StageError> {
    paths
        .iter()
        .map(|path| FileRecord::load(base, path).map_err(StageError::from))
        .collect()
}

/// Match the source set and run the freshness checks leading the step list
/// on paths alone, so fresh sources are never read. Returns the paths left
/// and the steps still to run.
fn select_sources<'s>(
    ctx: &BuildContext,
    stage: &'s StageDescriptor,
    report: &mut StageReport,
) -> Result<(Vec<PathBuf>, &'s [Step]), StageError> {
    let mut paths = stage.source.files()?;
    let mut steps = stage.steps.as_slice();
    while let Some((Step::Newer(tree), rest)) = steps.split_first() {
        let dest = stage.destination(&ctx.layout, *tree);
        let (stale, fresh) = newer::stale_paths(paths, &stage.source.base, &dest)?;
        report.images.skipped += fresh;
        paths = stale;
        steps = rest;
    }
    Ok((paths, steps))
}

/// Write records under `dir`, creating parent directories. Returns the
/// written paths.
pub fn write_records(dir: &Path, files: &[FileRecord]) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let dest = dir.join(&file.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &file.contents)?;
        written.push(dest);
    }
    Ok(written)
}

/// Run a stage with the production image backend.
pub fn run_stage(ctx: &BuildContext, stage: &StageDescriptor) -> Result<StageReport, StageError> {
    run_stage_with_backend(ctx, stage, &RustBackend::new())
}

/// Run a stage's steps in order over its source set.
pub fn run_stage_with_backend(
    ctx: &BuildContext,
    stage: &StageDescriptor,
    backend: &dyn ImageBackend,
) -> Result<StageReport, StageError> {
    let start = Instant::now();
    let mut report = StageReport::new(stage.kind);
    let (paths, steps) = select_sources(ctx, stage, &mut report)?;
    let mut files = load_all(&stage.source.base, &paths)?;

    for step in steps {
        files = apply_step(ctx, stage, *step, files, backend, &mut report)?;
    }

    report.elapsed = start.elapsed();
    Ok(report)
}

fn apply_step(
    ctx: &BuildContext,
    stage: &StageDescriptor,
    step: Step,
    files: Vec<FileRecord>,
    backend: &dyn ImageBackend,
    report: &mut StageReport,
) -> Result<Vec<FileRecord>, StageError> {
    let config = &ctx.config;
    let files = match step {
        Step::Newer(tree) => {
            let dest = stage.destination(&ctx.layout, tree);
            let (stale, fresh) = newer::retain_stale(files, &dest)?;
            report.images.skipped += fresh;
            stale
        }
        Step::OptimizeImages => {
            images::optimize_all(backend, files, &config.images, &mut report.images)?
        }
        Step::ReportSize => {
            output::print_size_lines(&files);
            files
        }
        Step::CompileScss => {
            let entry = ctx.layout.src.join(&config.styles.entry);
            styles::compile(files, &entry)?
        }
        Step::RewriteAssets => {
            let images_dir = ctx.layout.build_min.join(StageKind::Images.output_subdir());
            styles::rewrite_assets(files, &images_dir, backend)?
        }
        Step::Autoprefix => styles::autoprefix(files, &config.styles.browsers)?,
        Step::PurgeUnused => {
            let markup = styles::used_markup(
                &ctx.layout.src,
                &config.styles.used_html,
                &ctx.layout.src.join(&config.markup.partials_base),
            )?;
            styles::purge_unused(files, &markup, &config.styles.browsers)?
        }
        Step::MinifyCss => styles::minify(files, &config.styles.browsers)?,
        Step::SourceMap => styles::inline_source_map(files, &config.styles.browsers)?,
        Step::Bundle => scripts::bundle(files, &stage.source.base, &config.scripts.bundle)?,
        Step::AttachMetadata => {
            let files = scripts::attach_metadata(files, ctx.mode);
            output::print_metadata_lines(&files);
            files
        }
        Step::MinifyJs => scripts::minify_all(files)?,
        Step::InlinePartials => {
            let base = ctx.layout.src.join(&config.markup.partials_base);
            markup::inline_all(files, &base)?
        }
        Step::FormatHtml => markup::format_all(files)?,
        Step::CollapseWhitespace => markup::collapse_all(files)?,
        Step::Write(tree) => {
            let dest = stage.destination(&ctx.layout, tree);
            report.outputs.extend(write_records(&dest, &files)?);
            files
        }
        Step::LiveReload(kind) => {
            if let Some(first) = files.first() {
                let path = reload_path(stage.kind, first);
                ctx.notify_reload(ReloadEvent::new(kind, Some(path)));
            }
            files
        }
    };
    Ok(files)
}

/// URL path of a written file, relative to the served tree.
fn reload_path(kind: StageKind, file: &FileRecord) -> String {
    match kind.output_subdir() {
        "" => file.display_path(),
        sub => format!("{sub}/{}", file.display_path()),
    }
}
