//! Stage descriptors: what each pipeline stage reads, which steps it runs,
//! where it writes, and which source changes re-trigger it.
//!
//! Descriptors are plain data built once from `(PipelineConfig, Layout,
//! Profile)`. The step list is where the two build profiles differ; the
//! runner in [`pipeline`](crate::pipeline) executes whatever list it is
//! handed.
//!
//! ```text
//! images   src/images/**/*  → newer · optimize · size · write(min) · write(pretty)
//! styles   src/scss/style.scss → compile · assets · prefix · [purge · minify | sourcemap] · size · write · write · [reload]
//! scripts  src/js/*.js      → bundle · metadata · write(pretty) · write(min)
//! compress build-min/js/*.js → minify · size · write(min)
//! markup   src/html/*.html  → partials · format · write(pretty) · collapse · write(min)
//! ```

use crate::config::PipelineConfig;
use crate::context::{Layout, Tree};
use crate::mode::Profile;
use crate::serve::ReloadKind;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Images,
    Styles,
    Scripts,
    CompressScripts,
    Markup,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Images => "images",
            StageKind::Styles => "styles",
            StageKind::Scripts => "scripts",
            StageKind::CompressScripts => "compressjs",
            StageKind::Markup => "markup",
        }
    }

    /// Directory inside each output tree this stage writes into. Empty for
    /// the tree root.
    pub fn output_subdir(self) -> &'static str {
        match self {
            StageKind::Images => "images",
            StageKind::Styles => "css",
            StageKind::Scripts | StageKind::CompressScripts => "js",
            StageKind::Markup => "",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One transformation in a stage's step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Drop files whose counterpart in the given tree is at least as new.
    Newer(Tree),
    OptimizeImages,
    /// Log one size line per file.
    ReportSize,
    CompileScss,
    /// Resolve `resolve()`, `inline()`, `width()`, `height()` and `size()` asset functions.
    RewriteAssets,
    Autoprefix,
    PurgeUnused,
    MinifyCss,
    SourceMap,
    Bundle,
    AttachMetadata,
    MinifyJs,
    InlinePartials,
    FormatHtml,
    CollapseWhitespace,
    Write(Tree),
    LiveReload(ReloadKind),
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Newer(_) => "newer",
            Step::OptimizeImages => "optimize",
            Step::ReportSize => "size",
            Step::CompileScss => "scss",
            Step::RewriteAssets => "assets",
            Step::Autoprefix => "autoprefix",
            Step::PurgeUnused => "purge",
            Step::MinifyCss => "minify-css",
            Step::SourceMap => "sourcemap",
            Step::Bundle => "bundle",
            Step::AttachMetadata => "metadata",
            Step::MinifyJs => "minify-js",
            Step::InlinePartials => "partials",
            Step::FormatHtml => "format",
            Step::CollapseWhitespace => "collapse",
            Step::Write(_) => "write",
            Step::LiveReload(_) => "reload",
        }
    }
}

/// Where a stage's input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    /// Directory output paths are made relative to.
    pub base: PathBuf,
    /// Absolute glob pattern of input files.
    pub pattern: String,
}

impl SourceSet {
    fn new(base: PathBuf, rest: &str) -> Self {
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&base.to_string_lossy()),
            rest
        );
        Self { base, pattern }
    }

    /// Matching files, sorted. Directories are skipped.
    pub fn files(&self) -> Result<Vec<PathBuf>, glob::PatternError> {
        let mut files: Vec<PathBuf> = glob::glob(&self.pattern)?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub name: &'static str,
    pub source: SourceSet,
    /// Output directories, one per tree written.
    pub destinations: Vec<(Tree, PathBuf)>,
    pub steps: Vec<Step>,
    /// Glob relative to the project root whose changes re-run this stage.
    pub watch: Option<String>,
}

impl StageDescriptor {
    pub fn build(
        kind: StageKind,
        config: &PipelineConfig,
        layout: &Layout,
        profile: Profile,
    ) -> Self {
        let src_dir = watch_prefix(layout);
        let (source, watch, trees) = match kind {
            StageKind::Images => (
                SourceSet::new(layout.src.join("images"), "**/*"),
                Some(format!("{src_dir}/images/**/*")),
                vec![Tree::Minified, Tree::Pretty],
            ),
            StageKind::Styles => {
                let entry = layout.src.join(&config.styles.entry);
                let base = entry
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| layout.src.clone());
                let file_name = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let watch_dir = Path::new(&config.styles.entry)
                    .parent()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .filter(|p| !p.is_empty());
                let watch = match watch_dir {
                    Some(dir) => format!("{src_dir}/{dir}/**/*"),
                    None => format!("{src_dir}/**/*.scss"),
                };
                (
                    SourceSet::new(base, &glob::Pattern::escape(&file_name)),
                    Some(watch),
                    vec![Tree::Pretty, Tree::Minified],
                )
            }
            StageKind::Scripts => (
                SourceSet::new(layout.src.join("js"), "*.js"),
                Some(format!("{src_dir}/js/**/*")),
                vec![Tree::Pretty, Tree::Minified],
            ),
            StageKind::CompressScripts => (
                SourceSet::new(layout.build_min.join("js"), "*.js"),
                None,
                vec![Tree::Minified],
            ),
            StageKind::Markup => (
                SourceSet::new(layout.src.join("html"), "*.html"),
                Some(format!("{src_dir}/html/**/*")),
                vec![Tree::Pretty, Tree::Minified],
            ),
        };

        let destinations = trees
            .into_iter()
            .map(|tree| (tree, destination_dir(layout, tree, kind)))
            .collect();

        Self {
            kind,
            name: kind.name(),
            source,
            destinations,
            steps: steps_for(kind, profile),
            watch,
        }
    }

    /// Output directory for a tree, whether or not this stage writes to it.
    pub fn destination(&self, layout: &Layout, tree: Tree) -> PathBuf {
        destination_dir(layout, tree, self.kind)
    }
}

/// Glob prefix of the source directory for watch patterns: relative to the
/// project root when the sources live under it, absolute otherwise.
fn watch_prefix(layout: &Layout) -> String {
    let dir = match layout.src.strip_prefix(&layout.root) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => layout.src.to_string_lossy().replace('\\', "/"),
    };
    glob::Pattern::escape(dir.trim_end_matches('/'))
}

fn destination_dir(layout: &Layout, tree: Tree, kind: StageKind) -> PathBuf {
    let root = layout.tree(tree);
    match kind.output_subdir() {
        "" => root.to_path_buf(),
        sub => root.join(sub),
    }
}

/// The ordered step list of a stage under a profile.
pub fn steps_for(kind: StageKind, profile: Profile) -> Vec<Step> {
    match kind {
        StageKind::Images => vec![
            Step::Newer(Tree::Minified),
            Step::OptimizeImages,
            Step::ReportSize,
            Step::Write(Tree::Minified),
            Step::Write(Tree::Pretty),
        ],
        StageKind::Styles => {
            let mut steps = vec![Step::CompileScss, Step::RewriteAssets, Step::Autoprefix];
            if profile.purge_unused {
                steps.push(Step::PurgeUnused);
            }
            if profile.minify_css {
                steps.push(Step::MinifyCss);
            }
            if profile.source_maps {
                steps.push(Step::SourceMap);
            }
            steps.extend([
                Step::ReportSize,
                Step::Write(Tree::Pretty),
                Step::Write(Tree::Minified),
            ]);
            if profile.live_reload {
                steps.push(Step::LiveReload(ReloadKind::Css));
            }
            steps
        }
        StageKind::Scripts => vec![
            Step::Bundle,
            Step::AttachMetadata,
            Step::Write(Tree::Pretty),
            Step::Write(Tree::Minified),
        ],
        StageKind::CompressScripts => {
            vec![Step::MinifyJs, Step::ReportSize, Step::Write(Tree::Minified)]
        }
        StageKind::Markup => vec![
            Step::InlinePartials,
            Step::FormatHtml,
            Step::Write(Tree::Pretty),
            Step::CollapseWhitespace,
            Step::Write(Tree::Minified),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirsConfig;

    fn layout() -> Layout {
        Layout::new(Path::new("/p"), &DirsConfig::default())
    }

    fn describe(kind: StageKind, profile: Profile) -> StageDescriptor {
        StageDescriptor::build(kind, &PipelineConfig::default(), &layout(), profile)
    }

    #[test]
    fn every_asset_stage_writes_both_trees() {
        for kind in [
            StageKind::Images,
            StageKind::Styles,
            StageKind::Scripts,
            StageKind::Markup,
        ] {
            let stage = describe(kind, Profile::DEVELOPMENT);
            let trees: Vec<Tree> = stage.destinations.iter().map(|(t, _)| *t).collect();
            assert_eq!(trees.len(), 2, "{kind}");
            assert!(trees.contains(&Tree::Pretty));
            assert!(trees.contains(&Tree::Minified));
        }
    }

    #[test]
    fn compress_rewrites_minified_tree_only() {
        let stage = describe(StageKind::CompressScripts, Profile::PRODUCTION);
        assert_eq!(
            stage.destinations,
            vec![(Tree::Minified, PathBuf::from("/p/build-min/js"))]
        );
        assert_eq!(stage.source.base, PathBuf::from("/p/build-min/js"));
        assert!(stage.watch.is_none());
    }

    #[test]
    fn markup_lands_at_tree_root() {
        let stage = describe(StageKind::Markup, Profile::DEVELOPMENT);
        assert_eq!(
            stage.destination(&layout(), Tree::Pretty),
            PathBuf::from("/p/build-pretty")
        );
    }

    #[test]
    fn source_patterns() {
        assert_eq!(
            describe(StageKind::Images, Profile::DEVELOPMENT).source.pattern,
            "/p/src/images/**/*"
        );
        assert_eq!(
            describe(StageKind::Styles, Profile::DEVELOPMENT).source.pattern,
            "/p/src/scss/style.scss"
        );
        assert_eq!(
            describe(StageKind::Scripts, Profile::DEVELOPMENT).source.pattern,
            "/p/src/js/*.js"
        );
        assert_eq!(
            describe(StageKind::Markup, Profile::DEVELOPMENT).source.pattern,
            "/p/src/html/*.html"
        );
    }

    #[test]
    fn watch_patterns_are_root_relative() {
        assert_eq!(
            describe(StageKind::Images, Profile::DEVELOPMENT).watch.as_deref(),
            Some("src/images/**/*")
        );
        assert_eq!(
            describe(StageKind::Styles, Profile::DEVELOPMENT).watch.as_deref(),
            Some("src/scss/**/*")
        );
        assert_eq!(
            describe(StageKind::Scripts, Profile::DEVELOPMENT).watch.as_deref(),
            Some("src/js/**/*")
        );
        assert_eq!(
            describe(StageKind::Markup, Profile::DEVELOPMENT).watch.as_deref(),
            Some("src/html/**/*")
        );
    }

    #[test]
    fn watch_patterns_ignore_dot_prefix_on_src() {
        let mut config = PipelineConfig::default();
        config.dirs.src = "./src".to_string();
        let layout = Layout::new(Path::new("/p"), &config.dirs);
        let stage =
            StageDescriptor::build(StageKind::Scripts, &config, &layout, Profile::DEVELOPMENT);
        assert_eq!(stage.watch.as_deref(), Some("src/js/**/*"));
    }

    #[test]
    fn watch_patterns_for_src_outside_root_stay_absolute() {
        let mut config = PipelineConfig::default();
        config.dirs.src = "/assets/site-src".to_string();
        let layout = Layout::new(Path::new("/p"), &config.dirs);
        let stage =
            StageDescriptor::build(StageKind::Markup, &config, &layout, Profile::DEVELOPMENT);
        assert_eq!(stage.watch.as_deref(), Some("/assets/site-src/html/**/*"));
    }

    #[test]
    fn development_style_steps() {
        assert_eq!(
            steps_for(StageKind::Styles, Profile::DEVELOPMENT),
            vec![
                Step::CompileScss,
                Step::RewriteAssets,
                Step::Autoprefix,
                Step::SourceMap,
                Step::ReportSize,
                Step::Write(Tree::Pretty),
                Step::Write(Tree::Minified),
                Step::LiveReload(ReloadKind::Css),
            ]
        );
    }

    #[test]
    fn production_style_steps() {
        assert_eq!(
            steps_for(StageKind::Styles, Profile::PRODUCTION),
            vec![
                Step::CompileScss,
                Step::RewriteAssets,
                Step::Autoprefix,
                Step::PurgeUnused,
                Step::MinifyCss,
                Step::ReportSize,
                Step::Write(Tree::Pretty),
                Step::Write(Tree::Minified),
            ]
        );
    }

    #[test]
    fn production_only_steps_are_purge_and_minify() {
        let dev = steps_for(StageKind::Styles, Profile::DEVELOPMENT);
        let prod = steps_for(StageKind::Styles, Profile::PRODUCTION);
        let prod_only: Vec<Step> = prod.iter().filter(|s| !dev.contains(s)).copied().collect();
        assert_eq!(prod_only, vec![Step::PurgeUnused, Step::MinifyCss]);
    }

    #[test]
    fn image_stage_checks_freshness_first() {
        let steps = steps_for(StageKind::Images, Profile::PRODUCTION);
        assert_eq!(steps[0], Step::Newer(Tree::Minified));
        assert_eq!(steps, steps_for(StageKind::Images, Profile::DEVELOPMENT));
    }

    #[test]
    fn markup_writes_pretty_before_collapsing() {
        let steps = steps_for(StageKind::Markup, Profile::DEVELOPMENT);
        let pretty = steps.iter().position(|s| *s == Step::Write(Tree::Pretty));
        let collapse = steps.iter().position(|s| *s == Step::CollapseWhitespace);
        assert!(pretty < collapse);
    }

    #[test]
    fn styles_entry_at_src_root_watches_scss_files() {
        let mut config = PipelineConfig::default();
        config.styles.entry = "main.scss".to_string();
        let stage = StageDescriptor::build(
            StageKind::Styles,
            &config,
            &layout(),
            Profile::DEVELOPMENT,
        );
        assert_eq!(stage.watch.as_deref(), Some("src/**/*.scss"));
        assert_eq!(stage.source.base, PathBuf::from("/p/src"));
    }
}
