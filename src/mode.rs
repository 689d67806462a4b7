//! Build mode resolution.
//!
//! The mode is decided once per process from a single environment signal
//! (`NODE_ENV`, the convention front-end tooling already uses) and never
//! re-read. Everything downstream branches on the [`Profile`] selected here,
//! not on the raw string.
//!
//! | Signal (trimmed, lowercased) | Mode |
//! |---|---|
//! | absent | development |
//! | `"development"` | development |
//! | anything else | production |

use serde::Serialize;
use std::fmt;

/// Environment variable holding the build mode signal.
pub const MODE_ENV_VAR: &str = "NODE_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Resolve a mode from the raw signal value.
    ///
    /// Never fails: an unrecognized value is production.
    pub fn resolve(signal: Option<&str>) -> Self {
        let normalized = signal.unwrap_or("development").trim().to_lowercase();
        if normalized == "development" {
            Self::Development
        } else {
            Self::Production
        }
    }

    /// Resolve from the process environment. A value that is not valid
    /// unicode counts as absent.
    pub fn from_env() -> Self {
        Self::resolve(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// The step profile for this mode.
    pub fn profile(self) -> Profile {
        match self {
            Self::Development => Profile::DEVELOPMENT,
            Self::Production => Profile::PRODUCTION,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional steps a build includes.
///
/// There are exactly two variants, one per mode. Stage step lists are
/// derived from these flags when the stages are described, so no stage
/// checks the mode while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Inline a source map into compiled CSS.
    pub source_maps: bool,
    /// Push live-reload events to dev server clients.
    pub live_reload: bool,
    /// Drop style rules whose selectors reference no class or id in the markup.
    pub purge_unused: bool,
    /// Print CSS in minified form.
    pub minify_css: bool,
}

impl Profile {
    pub const DEVELOPMENT: Profile = Profile {
        source_maps: true,
        live_reload: true,
        purge_unused: false,
        minify_css: false,
    };

    pub const PRODUCTION: Profile = Profile {
        source_maps: false,
        live_reload: false,
        purge_unused: true,
        minify_css: true,
    };
}
