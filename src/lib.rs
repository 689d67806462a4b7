//! # webpipe
//!
//! A front-end asset build pipeline. Images, SCSS, CommonJS-style scripts
//! and HTML partials under `src/` are built into two trees: a readable
//! `build-pretty/` and a size-optimized `build-min/`. In development the
//! default task keeps a watcher and a live-reloading dev server running.
//!
//! # Architecture: Stages Over File Sets
//!
//! ```text
//! NODE_ENV ──► BuildMode ──► Profile ──► StageDescriptor × 5
//!
//! clean → images → styles → scripts → compressjs → markup → watch (+ serve)
//! ```
//!
//! Every stage is a [`stage::StageDescriptor`]: a source glob, an ordered
//! list of [`stage::Step`]s and its output directories. The step list is
//! fixed when the descriptor is built from the [`mode::Profile`], so the
//! runner in [`pipeline`] never asks which mode it is in. Styles run after
//! images because stylesheet asset functions read the optimized images.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`mode`] | `NODE_ENV` → build mode and its step profile |
//! | [`config`] | Layered `pipeline.toml` loading and validation |
//! | [`context`] | Immutable per-process build context and directory layout |
//! | [`stage`] | Stage descriptors and per-profile step lists |
//! | [`pipeline`] | File records and the step runner |
//! | [`newer`] | Modification-time freshness check for incremental image builds |
//! | [`images`], [`imaging`] | Parallel image optimization over a swappable backend |
//! | [`styles`] | SCSS compile, asset functions, prefixing, purge, minify, source maps |
//! | [`scripts`] | `require()` bundler, build metadata, JS minification |
//! | [`markup`] | HTML partials, pretty printing, whitespace collapsing |
//! | [`clean`] | Output tree removal |
//! | [`watch`] | Debounced source watcher dispatching stage re-runs |
//! | [`serve`] | Static dev server with Server-Sent Events live reload |
//! | [`tasks`] | Named tasks and the default sequence |
//! | [`output`] | CLI output formatting |
//! | [`mime`] | Content types by extension |
//!
//! # Design Decisions
//!
//! ## Libraries Do The Transformations
//!
//! Compression, SCSS compilation, prefixing, minification and source maps
//! come from crates (`image`, `grass`, `lightningcss`, `minify-js`). The
//! crate's own passes are the ones without a direct library equivalent:
//! partial inclusion, HTML formatting and collapsing, script bundling, and
//! the stylesheet asset functions.
//!
//! ## Two Trees, One Source
//!
//! Every stage writes the pretty and the minified tree from the same run.
//! Only the script compression pass works differently: it rewrites the
//! minified tree's scripts in place.
//!
//! ## Incremental Images Only
//!
//! Images are the one stage worth skipping work for. A source image whose
//! minified counterpart is at least as new is not read further. Every
//! other stage rebuilds from scratch in milliseconds.

pub mod clean;
pub mod config;
pub mod context;
pub mod images;
pub mod imaging;
pub mod markup;
pub mod mime;
pub mod mode;
pub mod newer;
pub mod output;
pub mod pipeline;
pub mod scripts;
pub mod serve;
pub mod stage;
pub mod styles;
pub mod tasks;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
