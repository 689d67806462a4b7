//! Named tasks and the default build-watch-serve sequence.
//!
//! | Task | Does |
//! |---|---|
//! | `clean` | remove both output trees |
//! | `images` | images stage |
//! | `css` | images stage, then styles stage |
//! | `js` | scripts stage |
//! | `compressjs` | minify the scripts already in the minified tree |
//! | `html` | markup stage |
//! | `default` | clean, every stage in order, then watch (and serve in development) |
//!
//! Style errors are the one recoverable failure: they are printed, the run
//! is abandoned with nothing written, and the sequence carries on. Every
//! other stage error stops the task.

use crate::clean::{self, CleanError, Cleaned};
use crate::config::{self, ConfigError};
use crate::context::BuildContext;
use crate::mode::BuildMode;
use crate::output;
use crate::pipeline::{self, StageError, StageReport};
use crate::serve::{DevServer, ReloadHub, ServeError};
use crate::stage::StageKind;
use crate::watch::{WatchError, Watcher};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Clean(#[from] CleanError),
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Clean,
    Images,
    Css,
    Js,
    CompressJs,
    Html,
    Default,
}

impl Task {
    /// Stages a stage task runs, in order. Styles need the optimized images
    /// for their asset functions, so `css` runs images first.
    pub fn stages(self) -> &'static [StageKind] {
        match self {
            Task::Images => &[StageKind::Images],
            Task::Css => &[StageKind::Images, StageKind::Styles],
            Task::Js => &[StageKind::Scripts],
            Task::CompressJs => &[StageKind::CompressScripts],
            Task::Html => &[StageKind::Markup],
            Task::Clean | Task::Default => &[],
        }
    }
}

/// Stage order of a full build.
pub const BUILD_ORDER: [StageKind; 5] = [
    StageKind::Images,
    StageKind::Styles,
    StageKind::Scripts,
    StageKind::CompressScripts,
    StageKind::Markup,
];

/// Load config, resolve the build mode and announce it.
///
/// `config_file` overrides `<project>/pipeline.toml`; `mode` overrides the
/// environment.
pub fn prepare(
    project: &Path,
    config_file: Option<&Path>,
    mode: Option<BuildMode>,
) -> Result<BuildContext, TaskError> {
    let config = match config_file {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(project)?,
    };
    let mode = mode.unwrap_or_else(BuildMode::from_env);
    let ctx = BuildContext::new(project, config, mode);
    output::print_mode_banner(ctx.mode, ctx.profile);
    Ok(ctx)
}

/// Run one stage, printing its progress. Style failures come back as an
/// abandoned report.
pub fn run_stage(ctx: &BuildContext, kind: StageKind) -> Result<StageReport, StageError> {
    let stage = ctx.stage(kind);
    output::print_stage_start(kind);
    match pipeline::run_stage(ctx, &stage) {
        Ok(report) => {
            output::print_stage_done(&report);
            Ok(report)
        }
        Err(StageError::Style(e)) => {
            output::print_style_error(&e);
            Ok(StageReport::abandoned(kind, e.to_string()))
        }
        Err(e) => Err(e),
    }
}

fn stage(ctx: &BuildContext, kind: StageKind) -> Result<StageReport, TaskError> {
    run_stage(ctx, kind).map_err(|source| TaskError::Stage {
        stage: kind,
        source,
    })
}

pub fn clean(ctx: &BuildContext) -> Result<Vec<Cleaned>, TaskError> {
    let cleaned = clean::clean(&ctx.layout)?;
    output::print_clean(&ctx.layout, &cleaned);
    Ok(cleaned)
}

/// Clean, then run every stage in [`BUILD_ORDER`].
pub fn build_all(ctx: &BuildContext) -> Result<Vec<StageReport>, TaskError> {
    clean(ctx)?;
    let reports = BUILD_ORDER
        .iter()
        .map(|kind| stage(ctx, *kind))
        .collect::<Result<Vec<_>, _>>()?;
    output::print_build_summary(&ctx.layout);
    Ok(reports)
}

/// What the default task keeps running once the build is done.
pub struct Resident<'a> {
    /// Address of the dev server, when the profile serves.
    pub server: Option<SocketAddr>,
    pub watcher: Watcher<'a>,
}

/// Bind the dev server on its own thread and announce it.
fn start_server(ctx: &BuildContext) -> Result<SocketAddr, TaskError> {
    let hub = ctx
        .reload_hub()
        .cloned()
        .unwrap_or_else(|| Arc::new(ReloadHub::new()));
    let addr = format!("127.0.0.1:{}", ctx.config.server.port);
    let server = DevServer::bind(&addr, &ctx.layout.build_min, &ctx.config.server.index, hub)?;
    let local = server.local_addr()?;
    output::print_server_address(local);
    std::thread::spawn(move || {
        if let Err(e) = server.run() {
            output::print_server_error(&e);
        }
    });
    Ok(local)
}

/// Start the resident half of the default task: the dev server (development
/// only) and the watcher, not yet blocking.
pub fn start_resident(ctx: &BuildContext) -> Result<Resident<'_>, TaskError> {
    let server = if ctx.profile.live_reload {
        Some(start_server(ctx)?)
    } else {
        None
    };
    Ok(Resident {
        server,
        watcher: Watcher::new(ctx)?,
    })
}

/// Full build, then stay resident: the dev server on its own thread
/// (development only) and the watcher on this one.
pub fn run_default(ctx: &BuildContext) -> Result<(), TaskError> {
    build_all(ctx)?;
    let resident = start_resident(ctx)?;
    resident.watcher.run(|kind| run_stage(ctx, kind))?;
    Ok(())
}

/// Run a named task.
pub fn run(ctx: &BuildContext, task: Task) -> Result<(), TaskError> {
    match task {
        Task::Clean => clean(ctx).map(|_| ()),
        Task::Default => run_default(ctx),
        staged => {
            for kind in staged.stages() {
                stage(ctx, *kind)?;
            }
            Ok(())
        }
    }
}
