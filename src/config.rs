//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `pipeline.toml`. Stock defaults
//! are the base layer; the project's `pipeline.toml` (optional) overrides
//! any subset of them.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [dirs]
//! src = "src"                    # Source root (images/, scss/, js/, html/)
//! build_min = "build-min"        # Minified output tree (served in development)
//! build_pretty = "build-pretty"  # Human-readable output tree
//!
//! [images]
//! optimization_level = 5         # PNG effort, 0 (fastest) to 7 (smallest)
//! jpeg_quality = 90              # JPEG re-encode quality (1-100)
//!
//! [styles]
//! entry = "scss/style.scss"      # Entry stylesheet, relative to src
//! browsers = ["> 1%"]            # Browserslist queries for vendor prefixes
//! used_html = ["html/index.html"] # Markup scanned for used selectors (production)
//!
//! [scripts]
//! bundle = "bundle.js"           # Bundle file name inside js/
//!
//! [markup]
//! partials_base = "html"         # Directory partials resolve against, relative to src
//!
//! [server]
//! port = 8000
//! index = "index.html"
//!
//! [processing]
//! max_processes = 4              # Max parallel image workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILENAME: &str = "pipeline.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `pipeline.toml`.
///
/// All fields have defaults matching the conventional `src/` →
/// `build-pretty/` + `build-min/` layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Source and output directory locations.
    pub dirs: DirsConfig,
    /// Image optimization settings.
    pub images: ImagesConfig,
    /// Style compilation settings.
    pub styles: StylesConfig,
    /// Script bundling settings.
    pub scripts: ScriptsConfig,
    /// HTML assembly settings.
    pub markup: MarkupConfig,
    /// Development server settings.
    pub server: ServerConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = &self.dirs;
        if dirs.src.is_empty() || dirs.build_min.is_empty() || dirs.build_pretty.is_empty() {
            return Err(ConfigError::Validation(
                "dirs.src, dirs.build_min and dirs.build_pretty must not be empty".into(),
            ));
        }
        if dirs.build_min == dirs.build_pretty {
            return Err(ConfigError::Validation(
                "dirs.build_min and dirs.build_pretty must differ".into(),
            ));
        }
        if dirs.src == dirs.build_min || dirs.src == dirs.build_pretty {
            return Err(ConfigError::Validation(
                "dirs.src must not be an output directory".into(),
            ));
        }
        if self.images.optimization_level > 7 {
            return Err(ConfigError::Validation(
                "images.optimization_level must be 0-7".into(),
            ));
        }
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::Validation(
                "images.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.styles.browsers.is_empty() {
            return Err(ConfigError::Validation(
                "styles.browsers must not be empty".into(),
            ));
        }
        let bundle = &self.scripts.bundle;
        if !bundle.ends_with(".js") || bundle.contains('/') || bundle.contains('\\') {
            return Err(ConfigError::Validation(
                "scripts.bundle must be a plain .js file name".into(),
            ));
        }
        if self.server.index.is_empty() {
            return Err(ConfigError::Validation("server.index must not be empty".into()));
        }
        Ok(())
    }
}

/// Source and output directory locations, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirsConfig {
    pub src: String,
    pub build_min: String,
    pub build_pretty: String,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            src: "src".to_string(),
            build_min: "build-min".to_string(),
            build_pretty: "build-pretty".to_string(),
        }
    }
}

/// Image optimization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// PNG compression effort: 0-1 fast, 2-4 balanced, 5-7 smallest.
    pub optimization_level: u8,
    /// Quality used when re-encoding JPEG files.
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            optimization_level: 5,
            jpeg_quality: 90,
        }
    }
}

/// Style compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Entry stylesheet relative to the source root. Partials resolve from its directory.
    pub entry: String,
    /// Browserslist queries deciding which vendor prefixes are emitted.
    pub browsers: Vec<String>,
    /// Markup files (relative to the source root) scanned for used classes and ids.
    pub used_html: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: "scss/style.scss".to_string(),
            browsers: vec!["> 1%".to_string()],
            used_html: vec!["html/index.html".to_string()],
        }
    }
}

/// Script bundling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// File name of the bundle written into `js/` of both trees.
    pub bundle: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            bundle: "bundle.js".to_string(),
        }
    }
}

/// HTML assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkupConfig {
    /// Directory `<partial src=...>` references resolve against, relative to the source root.
    pub partials_base: String,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            partials_base: "html".to_string(),
        }
    }
}

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Document served for directory requests.
    pub index: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            index: "index.html".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image optimization workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `pipeline.toml` from the project root, falling back to stock
/// defaults when the file is absent.
pub fn load_config(project_root: &Path) -> Result<PipelineConfig, ConfigError> {
    let overlay = load_raw_config(&project_root.join(CONFIG_FILENAME))?;
    resolve_config(stock_defaults_value(), overlay)
}

/// Load an explicitly named config file. Unlike [`load_config`], a missing
/// file is an error.
pub fn load_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let overlay: toml::Value = toml::from_str(&content)?;
    resolve_config(stock_defaults_value(), Some(overlay))
}

/// Returns a fully-commented stock `pipeline.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webpipe configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# The build mode is not configured here: it comes from NODE_ENV
# ("development" when unset, production for any other value).
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Directories (relative to the project root)
# ---------------------------------------------------------------------------
[dirs]
# Source root containing images/, scss/, js/ and html/.
src = "src"

# Minified output tree. This is what the development server serves.
build_min = "build-min"

# Human-readable output tree.
build_pretty = "build-pretty"

# ---------------------------------------------------------------------------
# Images
# ---------------------------------------------------------------------------
[images]
# PNG compression effort: 0-1 fast, 2-4 balanced, 5-7 smallest.
optimization_level = 5

# Quality used when re-encoding JPEG files. The original is kept when
# re-encoding does not make the file smaller.
jpeg_quality = 90

# ---------------------------------------------------------------------------
# Styles
# ---------------------------------------------------------------------------
[styles]
# Entry stylesheet, relative to src. @use/@import partials resolve from
# its directory.
entry = "scss/style.scss"

# Browserslist queries deciding which vendor prefixes are emitted.
browsers = ["> 1%"]

# Markup scanned for used classes and ids. Production builds drop rules
# whose selectors reference anything not found here.
used_html = ["html/index.html"]

# ---------------------------------------------------------------------------
# Scripts
# ---------------------------------------------------------------------------
[scripts]
# File name of the bundle written into js/ of both output trees.
bundle = "bundle.js"

# ---------------------------------------------------------------------------
# Markup
# ---------------------------------------------------------------------------
[markup]
# Directory that <partial src="..."> references resolve against, relative to src.
partials_base = "html"

# ---------------------------------------------------------------------------
# Development server (development builds only)
# ---------------------------------------------------------------------------
[server]
port = 8000

# Document served for directory requests.
index = "index.html"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-optimization workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
