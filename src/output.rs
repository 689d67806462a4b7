//! CLI output formatting for every task.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> Mode: production (purge unused, minify css)
//! ==> Clean
//!     removed build-min/
//!     build-pretty/ (absent)
//! ==> images
//!     logo.png 12.4 KB → 9.8 KB
//!     done in 84 ms: 1 up to date, 1 optimized, 0 unchanged (2 total)
//! ==> styles
//!     style.css 1.2 KB → 640 B
//!     done in 31 ms
//! ==> Build complete
//!     build-min: 7 files, 24.0 KB
//!     build-pretty: 7 files, 31.5 KB
//! ```
//!
//! ## Watch
//!
//! ```text
//! ==> Watching
//!     src/scss/**/* → styles
//! ==> Changed: styles
//! ```
//!
//! # Architecture
//!
//! Each event has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout, or stderr for
//! failures. Format functions are pure: no I/O, no side effects.

use crate::clean::Cleaned;
use crate::context::Layout;
use crate::mode::{BuildMode, Profile};
use crate::pipeline::{FileRecord, StageError, StageReport};
use crate::serve::ServeError;
use crate::stage::StageKind;
use crate::styles::StyleError;
use crate::watch::Registration;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

// ============================================================================
// Shared helpers
// ============================================================================

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn eprint_lines(lines: Vec<String>) {
    for line in lines {
        eprintln!("{line}");
    }
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `2.31 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.2} MB", b / MB)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis} ms")
    } else {
        format!("{:.2} s", elapsed.as_secs_f64())
    }
}

fn relative_display(layout: &Layout, path: &Path) -> String {
    path.strip_prefix(&layout.root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

// ============================================================================
// Mode
// ============================================================================

pub fn format_mode_banner(mode: BuildMode, profile: Profile) -> Vec<String> {
    let flags: Vec<&str> = [
        (profile.source_maps, "source maps"),
        (profile.live_reload, "live reload"),
        (profile.purge_unused, "purge unused"),
        (profile.minify_css, "minify css"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if flags.is_empty() {
        vec![format!("==> Mode: {mode}")]
    } else {
        vec![format!("==> Mode: {mode} ({})", flags.join(", "))]
    }
}

pub fn print_mode_banner(mode: BuildMode, profile: Profile) {
    print_lines(format_mode_banner(mode, profile));
}

// ============================================================================
// Clean
// ============================================================================

pub fn format_clean(layout: &Layout, cleaned: &[Cleaned]) -> Vec<String> {
    let mut lines = vec!["==> Clean".to_string()];
    for c in cleaned {
        let shown = relative_display(layout, &c.path);
        if c.removed {
            lines.push(format!("{}removed {shown}/", indent(1)));
        } else {
            lines.push(format!("{}{shown}/ (absent)", indent(1)));
        }
    }
    lines
}

pub fn print_clean(layout: &Layout, cleaned: &[Cleaned]) {
    print_lines(format_clean(layout, cleaned));
}

// ============================================================================
// Stages
// ============================================================================

pub fn format_stage_start(kind: StageKind) -> Vec<String> {
    vec![format!("==> {kind}")]
}

pub fn print_stage_start(kind: StageKind) {
    print_lines(format_stage_start(kind));
}

/// One line per file: its path and size, with the size it started at when
/// that differs.
pub fn format_size_lines(files: &[FileRecord]) -> Vec<String> {
    files
        .iter()
        .map(|f| {
            let size = f.size();
            if size == f.original_size {
                format!("{}{} {}", indent(1), f.display_path(), format_bytes(size))
            } else {
                format!(
                    "{}{} {} \u{2192} {}",
                    indent(1),
                    f.display_path(),
                    format_bytes(f.original_size),
                    format_bytes(size)
                )
            }
        })
        .collect()
}

pub fn print_size_lines(files: &[FileRecord]) {
    print_lines(format_size_lines(files));
}

/// Build metadata attached to records, one line per record that has any.
pub fn format_metadata_lines(files: &[FileRecord]) -> Vec<String> {
    files
        .iter()
        .filter(|f| !f.metadata.is_empty())
        .map(|f| {
            let pairs: Vec<String> = f.metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{}{} {}", indent(1), f.display_path(), pairs.join(" "))
        })
        .collect()
}

pub fn print_metadata_lines(files: &[FileRecord]) {
    print_lines(format_metadata_lines(files));
}

pub fn format_stage_done(report: &StageReport) -> Vec<String> {
    let elapsed = format_elapsed(report.elapsed);
    let line = match report.kind {
        StageKind::Images => format!("{}done in {elapsed}: {}", indent(1), report.images),
        _ if report.outputs.is_empty() => {
            format!("{}done in {elapsed}, nothing to write", indent(1))
        }
        _ => format!("{}done in {elapsed}", indent(1)),
    };
    vec![line]
}

pub fn print_stage_done(report: &StageReport) {
    print_lines(format_stage_done(report));
}

pub fn format_style_error(err: &StyleError) -> Vec<String> {
    vec![
        format!("{}styles: {err}", indent(1)),
        format!("{}run abandoned, previous output left in place", indent(1)),
    ]
}

pub fn print_style_error(err: &StyleError) {
    eprint_lines(format_style_error(err));
}

pub fn format_stage_failed(kind: StageKind, err: &StageError) -> Vec<String> {
    vec![format!("!! {kind} failed: {err}")]
}

pub fn print_stage_failed(kind: StageKind, err: &StageError) {
    eprint_lines(format_stage_failed(kind, err));
}

// ============================================================================
// Build summary
// ============================================================================

/// File count and byte total of one output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeTotals {
    pub label: String,
    pub files: usize,
    pub bytes: u64,
}

/// Walk an output tree. A missing tree counts as empty.
pub fn tree_totals(label: &str, root: &Path) -> TreeTotals {
    let (files, bytes) = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(n, total), e| {
            (n + 1, total + e.metadata().map(|m| m.len()).unwrap_or(0))
        });
    TreeTotals {
        label: label.to_string(),
        files,
        bytes,
    }
}

pub fn format_build_summary(trees: &[TreeTotals]) -> Vec<String> {
    let mut lines = vec!["==> Build complete".to_string()];
    for t in trees {
        let noun = if t.files == 1 { "file" } else { "files" };
        lines.push(format!(
            "{}{}: {} {noun}, {}",
            indent(1),
            t.label,
            t.files,
            format_bytes(t.bytes)
        ));
    }
    lines
}

pub fn print_build_summary(layout: &Layout) {
    let trees = [
        tree_totals(&relative_display(layout, &layout.build_min), &layout.build_min),
        tree_totals(&relative_display(layout, &layout.build_pretty), &layout.build_pretty),
    ];
    print_lines(format_build_summary(&trees));
}

// ============================================================================
// Watch and serve
// ============================================================================

pub fn format_watch_started(registrations: &[Registration]) -> Vec<String> {
    let mut lines = vec!["==> Watching".to_string()];
    for r in registrations {
        lines.push(format!("{}{} \u{2192} {}", indent(1), r.pattern.as_str(), r.stage));
    }
    lines
}

pub fn print_watch_started(registrations: &[Registration]) {
    print_lines(format_watch_started(registrations));
}

pub fn format_watch_batch(stages: &BTreeSet<StageKind>) -> Vec<String> {
    let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
    vec![format!("==> Changed: {}", names.join(", "))]
}

pub fn print_watch_batch(stages: &BTreeSet<StageKind>) {
    print_lines(format_watch_batch(stages));
}

pub fn print_watch_error(message: &str) {
    eprintln!("!! watch error: {message}");
    eprintln!("{}still watching", indent(1));
}

pub fn format_server_address(addr: SocketAddr) -> Vec<String> {
    vec![format!("==> Serving at http://{addr}/ (live reload)")]
}

pub fn print_server_address(addr: SocketAddr) {
    print_lines(format_server_address(addr));
}

pub fn print_server_error(err: &ServeError) {
    eprintln!("!! dev server stopped: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirsConfig;
    use crate::images::ImageStats;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn bytes_scale() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn elapsed_millis_then_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(42)), "42 ms");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.50 s");
    }

    // =========================================================================
    // Mode and clean
    // =========================================================================

    #[test]
    fn banner_lists_enabled_steps() {
        assert_eq!(
            format_mode_banner(BuildMode::Development, Profile::DEVELOPMENT),
            vec!["==> Mode: development (source maps, live reload)"]
        );
        assert_eq!(
            format_mode_banner(BuildMode::Production, Profile::PRODUCTION),
            vec!["==> Mode: production (purge unused, minify css)"]
        );
    }

    #[test]
    fn clean_lines_show_relative_paths() {
        let layout = Layout::new(Path::new("/site"), &DirsConfig::default());
        let cleaned = vec![
            Cleaned {
                tree: crate::context::Tree::Minified,
                path: PathBuf::from("/site/build-min"),
                removed: true,
            },
            Cleaned {
                tree: crate::context::Tree::Pretty,
                path: PathBuf::from("/site/build-pretty"),
                removed: false,
            },
        ];
        assert_eq!(
            format_clean(&layout, &cleaned),
            vec!["==> Clean", "    removed build-min/", "    build-pretty/ (absent)"]
        );
    }

    // =========================================================================
    // Stage lines
    // =========================================================================

    #[test]
    fn size_line_shows_change_only_when_different() {
        let mut shrunk = FileRecord::new("css/style.css", vec![0u8; 640]);
        shrunk.original_size = 2048;
        let same = FileRecord::new("logo.svg", vec![0u8; 100]);
        assert_eq!(
            format_size_lines(&[shrunk, same]),
            vec!["    css/style.css 2.0 KB \u{2192} 640 B", "    logo.svg 100 B"]
        );
    }

    #[test]
    fn metadata_lines_skip_bare_records() {
        let mut bundle = FileRecord::new("bundle.js", "x");
        bundle.metadata.insert("build.mode".into(), "production".into());
        bundle.metadata.insert("bundle.modules".into(), "2".into());
        let bare = FileRecord::new("other.js", "y");
        assert_eq!(
            format_metadata_lines(&[bundle, bare]),
            vec!["    bundle.js build.mode=production bundle.modules=2"]
        );
    }

    #[test]
    fn images_done_line_carries_stats() {
        let mut report = StageReport::new(StageKind::Images);
        report.elapsed = Duration::from_millis(84);
        report.images = ImageStats {
            skipped: 1,
            optimized: 1,
            kept: 0,
            bytes_saved: 10,
        };
        assert_eq!(
            format_stage_done(&report),
            vec!["    done in 84 ms: 1 up to date, 1 optimized, 0 unchanged (2 total)"]
        );
    }

    #[test]
    fn empty_stage_says_so() {
        let report = StageReport::new(StageKind::Markup);
        assert_eq!(
            format_stage_done(&report),
            vec!["    done in 0 ms, nothing to write"]
        );
    }

    #[test]
    fn style_error_lines() {
        let err = StyleError::Compile("Undefined variable.".into());
        let lines = format_style_error(&err);
        assert_eq!(lines[0], "    styles: SCSS compilation failed: Undefined variable.");
        assert!(lines[1].contains("abandoned"));
    }

    // =========================================================================
    // Summary and watch
    // =========================================================================

    #[test]
    fn tree_totals_counts_files_recursively() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("css")).unwrap();
        std::fs::write(tmp.path().join("index.html"), "12345").unwrap();
        std::fs::write(tmp.path().join("css/a.css"), "123").unwrap();
        let totals = tree_totals("build-min", tmp.path());
        assert_eq!(totals.files, 2);
        assert_eq!(totals.bytes, 8);
    }

    #[test]
    fn missing_tree_is_empty() {
        let totals = tree_totals("x", Path::new("/definitely/not/here"));
        assert_eq!((totals.files, totals.bytes), (0, 0));
    }

    #[test]
    fn summary_lines() {
        let trees = [
            TreeTotals {
                label: "build-min".into(),
                files: 1,
                bytes: 2048,
            },
            TreeTotals {
                label: "build-pretty".into(),
                files: 3,
                bytes: 10,
            },
        ];
        assert_eq!(
            format_build_summary(&trees),
            vec![
                "==> Build complete",
                "    build-min: 1 file, 2.0 KB",
                "    build-pretty: 3 files, 10 B"
            ]
        );
    }

    #[test]
    fn watch_batch_names_stages_in_order() {
        let stages: BTreeSet<StageKind> =
            [StageKind::Markup, StageKind::Images].into_iter().collect();
        assert_eq!(format_watch_batch(&stages), vec!["==> Changed: images, markup"]);
    }

    #[test]
    fn server_line() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        assert_eq!(
            format_server_address(addr),
            vec!["==> Serving at http://127.0.0.1:8000/ (live reload)"]
        );
    }
}
