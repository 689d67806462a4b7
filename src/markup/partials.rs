//! HTML partial inclusion.
//!
//! ```html
//! <partial src="partials/header.html" title="Home"></partial>
//! <partial src="partials/footer.html" />
//! ```
//!
//! Each `<partial>` element is replaced by the named file, resolved against
//! the partials base directory. Inside the included file every `@@name`
//! placeholder is replaced by the value of the matching attribute.
//! Placeholders without a matching attribute are left as they are.
//! Included files are themselves expanded, up to [`MAX_DEPTH`] levels.

use super::MarkupError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

/// Nesting limit for partials including partials.
pub const MAX_DEPTH: usize = 16;

static PARTIAL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<partial\b([^>]*?)/?>(?:\s*</partial\s*>)?")
        .expect("partial pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// Attributes of a `<partial>` tag, in name order.
pub fn attributes(tag_body: &str) -> BTreeMap<String, String> {
    ATTRIBUTE
        .captures_iter(tag_body)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

/// Replace `@@name` placeholders. Longer names go first so `@@titleFull`
/// is not clobbered by `@@title`.
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    let mut names: Vec<&String> = values.keys().filter(|k| k.as_str() != "src").collect();
    names.sort_by_key(|k| std::cmp::Reverse(k.len()));
    let mut out = text.to_string();
    for name in names {
        out = out.replace(&format!("@@{name}"), &values[name]);
    }
    out
}

/// Expand every partial in `html`.
pub fn inline(html: &str, base: &Path) -> Result<String, MarkupError> {
    inline_at_depth(html, base, 0)
}

fn inline_at_depth(html: &str, base: &Path, depth: usize) -> Result<String, MarkupError> {
    let mut error = None;
    let out = PARTIAL_TAG.replace_all(html, |caps: &Captures| {
        if error.is_some() {
            return String::new();
        }
        match expand(&caps[0], &caps[1], base, depth) {
            Ok(text) => text,
            Err(e) => {
                error = Some(e);
                String::new()
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(out.into_owned()),
    }
}

fn expand(tag: &str, body: &str, base: &Path, depth: usize) -> Result<String, MarkupError> {
    let attrs = attributes(body);
    let src = attrs
        .get("src")
        .ok_or_else(|| MarkupError::PartialWithoutSrc(tag.to_string()))?;
    let path = base.join(src);
    if depth >= MAX_DEPTH {
        return Err(MarkupError::TooDeep {
            path,
            limit: MAX_DEPTH,
        });
    }
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(MarkupError::MissingPartial(path));
        }
        Err(e) => return Err(e.into()),
    };
    inline_at_depth(&substitute(&text, &attrs), base, depth + 1)
}
