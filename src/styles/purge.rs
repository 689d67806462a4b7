//! Unused selector removal.
//!
//! The markup files listed in `styles.used_html` are read with their
//! partials inlined and scanned for `class` and `id` attribute values.
//! Every class or id the stylesheet's selectors mention that the markup
//! never uses is handed to lightningcss as an unused symbol, which drops
//! the rules referencing it.
//!
//! Classes added at runtime by scripts are not seen and will be purged.

use super::css::{Pass, targets};
use super::{StyleError, text_of};
use crate::markup::partials;
use crate::pipeline::FileRecord;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

static SELECTOR_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.#](-?[_a-zA-Z][_a-zA-Z0-9-]*)").expect("selector symbol pattern is valid")
});

static MARKUP_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)(class|id)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern is valid")
});

/// Class and id names mentioned in selectors.
///
/// Only selector preludes (text before each `{`) are scanned, so hex colors
/// and file extensions inside declarations are ignored.
pub fn css_symbols(css: &str) -> BTreeSet<String> {
    let mut symbols = BTreeSet::new();
    let pieces: Vec<&str> = css.split('{').collect();
    for piece in &pieces[..pieces.len().saturating_sub(1)] {
        // The prelude starts after the previous block or declaration ends.
        let prelude = piece.rsplit(['}', ';']).next().unwrap_or("");
        if prelude.trim_start().starts_with('@') {
            continue;
        }
        for caps in SELECTOR_SYMBOL.captures_iter(prelude) {
            symbols.insert(caps[1].to_string());
        }
    }
    symbols
}

/// Class and id names used by markup.
pub fn markup_symbols(html: &str) -> BTreeSet<String> {
    let mut symbols = BTreeSet::new();
    for caps in MARKUP_ATTRIBUTE.captures_iter(html) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        symbols.extend(value.split_whitespace().map(str::to_string));
    }
    symbols
}

/// Read the markup the stylesheet is checked against, partials inlined.
///
/// `used_html` paths are relative to the source root.
pub fn used_markup(
    src_root: &Path,
    used_html: &[String],
    partials_base: &Path,
) -> Result<String, StyleError> {
    let mut markup = String::new();
    for rel in used_html {
        let path = src_root.join(rel);
        let text = std::fs::read_to_string(&path)?;
        markup.push_str(&partials::inline(&text, partials_base)?);
        markup.push('\n');
    }
    Ok(markup)
}

/// Drop rules whose selectors reference classes or ids `markup` never uses.
pub fn purge_unused(
    files: Vec<FileRecord>,
    markup: &str,
    browsers: &[String],
) -> Result<Vec<FileRecord>, StyleError> {
    let targets = targets(browsers)?;
    let used = markup_symbols(markup);
    files
        .into_iter()
        .map(|mut file| {
            let css = text_of(&file)?;
            let unused: HashSet<String> = css_symbols(css)
                .into_iter()
                .filter(|s| !used.contains(s))
                .collect();
            let purged = Pass {
                transform: true,
                unused_symbols: unused,
                ..Pass::default()
            }
            .run(&file.path, css, targets)?;
            file.set_text(purged);
            Ok(file)
        })
        .collect()
}
