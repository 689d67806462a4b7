//! Asset functions in compiled CSS.
//!
//! Stylesheets may reference optimized images by name. The functions below
//! are left untouched by the SCSS compiler and resolved here against the
//! minified image directory, so they only see images that have already
//! been optimized.
//!
//! | Call | Result |
//! |---|---|
//! | `resolve('logo.png')` | `url('/images/logo.png')` |
//! | `inline('logo.png')` | `url('data:image/png;base64,…')` |
//! | `width('logo.png')` | `120px` |
//! | `height('logo.png')` | `40px` |
//! | `size('logo.png')` | `120px 40px` |

use super::{StyleError, text_of};
use crate::imaging::ImageBackend;
use crate::mime;
use crate::pipeline::FileRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

static ASSET_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(^|[^\w-])(resolve|inline|width|height|size)\(\s*(?:'([^']*)'|"([^"]*)")\s*\)"#,
    )
    .expect("asset function pattern is valid")
});

/// URL prefix optimized images are served under.
const IMAGES_URL: &str = "/images";

/// Rewrite asset function calls in every record.
pub fn rewrite_assets(
    files: Vec<FileRecord>,
    images_dir: &Path,
    backend: &dyn ImageBackend,
) -> Result<Vec<FileRecord>, StyleError> {
    files
        .into_iter()
        .map(|mut file| {
            let css = rewrite(text_of(&file)?, images_dir, backend)?;
            file.set_text(css);
            Ok(file)
        })
        .collect()
}

/// Rewrite asset function calls in one stylesheet.
pub fn rewrite(
    css: &str,
    images_dir: &Path,
    backend: &dyn ImageBackend,
) -> Result<String, StyleError> {
    let mut error = None;
    let out = ASSET_CALL.replace_all(css, |caps: &Captures| {
        if error.is_some() {
            return String::new();
        }
        let prefix = &caps[1];
        let function = &caps[2];
        let asset = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        match expand(function, asset, images_dir, backend) {
            Ok(value) => format!("{prefix}{value}"),
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

fn expand(
    function: &str,
    asset: &str,
    images_dir: &Path,
    backend: &dyn ImageBackend,
) -> Result<String, StyleError> {
    let rel = asset.trim_start_matches('/');
    let path = images_dir.join(rel);
    if !path.is_file() {
        return Err(StyleError::MissingAsset {
            function: function.to_string(),
            asset: asset.to_string(),
            path,
        });
    }

    let dimensions = || {
        backend.identify(&path).map_err(|source| StyleError::Asset {
            function: function.to_string(),
            asset: asset.to_string(),
            source,
        })
    };

    match function {
        "resolve" => Ok(format!("url('{IMAGES_URL}/{rel}')")),
        "inline" => {
            let bytes = std::fs::read(&path)?;
            Ok(format!(
                "url('data:{};base64,{}')",
                mime::essence(&path),
                STANDARD.encode(bytes)
            ))
        }
        "width" => Ok(format!("{}px", dimensions()?.width)),
        "height" => Ok(format!("{}px", dimensions()?.height)),
        _ => {
            let d = dimensions()?;
            Ok(format!("{}px {}px", d.width, d.height))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::MockBackend;
    use tempfile::TempDir;

    fn images_dir(files: &[(&str, &[u8])]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (name, bytes) in files {
            let path = tmp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, bytes).unwrap();
        }
        tmp
    }

    fn mock(width: u32, height: u32) -> MockBackend {
        MockBackend::with_dimensions(vec![Dimensions { width, height }])
    }

    #[test]
    fn resolve_becomes_absolute_url() {
        let dir = images_dir(&[("icons/logo.png", b"x")]);
        let css = ".a { background: resolve('icons/logo.png'); }";
        let out = rewrite(css, dir.path(), &MockBackend::new()).unwrap();
        assert_eq!(out, ".a { background: url('/images/icons/logo.png'); }");
    }

    #[test]
    fn double_quoted_argument() {
        let dir = images_dir(&[("logo.png", b"x")]);
        let out = rewrite(
            ".a { background: resolve(\"logo.png\"); }",
            dir.path(),
            &MockBackend::new(),
        )
        .unwrap();
        assert!(out.contains("url('/images/logo.png')"));
    }

    #[test]
    fn inline_becomes_data_url() {
        let dir = images_dir(&[("dot.gif", b"GIF89a")]);
        let out = rewrite(".a { background: inline('dot.gif'); }", dir.path(), &MockBackend::new())
            .unwrap();
        assert_eq!(
            out,
            format!(
                ".a {{ background: url('data:image/gif;base64,{}'); }}",
                STANDARD.encode(b"GIF89a")
            )
        );
    }

    #[test]
    fn width_and_height_use_backend_dimensions() {
        let dir = images_dir(&[("logo.png", b"x")]);
        let out = rewrite(".a { width: width('logo.png'); }", dir.path(), &mock(120, 40)).unwrap();
        assert_eq!(out, ".a { width: 120px; }");
        let out =
            rewrite(".a { height: height('logo.png'); }", dir.path(), &mock(120, 40)).unwrap();
        assert_eq!(out, ".a { height: 40px; }");
    }

    #[test]
    fn size_gives_both_dimensions() {
        let dir = images_dir(&[("logo.png", b"x")]);
        let out = rewrite(
            ".a { background-size: size('logo.png'); }",
            dir.path(),
            &mock(16, 8),
        )
        .unwrap();
        assert_eq!(out, ".a { background-size: 16px 8px; }");
    }

    #[test]
    fn similar_names_are_not_rewritten() {
        let dir = images_dir(&[]);
        let css = ".a { max-width: calc(100% - 2px); font-size: 1em; }";
        let out = rewrite(css, dir.path(), &MockBackend::new()).unwrap();
        assert_eq!(out, css);
    }

    #[test]
    fn missing_asset_is_error() {
        let dir = images_dir(&[]);
        let css = ".a { background: resolve('nope.png'); }";
        let err = rewrite(css, dir.path(), &MockBackend::new()).unwrap_err();
        assert!(matches!(
            err,
            StyleError::MissingAsset { ref function, .. } if function == "resolve"
        ));
        assert!(err.to_string().contains("nope.png"));
    }

    #[test]
    fn several_calls_in_one_declaration() {
        let dir = images_dir(&[("a.png", b"x"), ("b.png", b"y")]);
        let out = rewrite(
            ".a { background: resolve('a.png'), resolve('b.png'); }",
            dir.path(),
            &MockBackend::new(),
        )
        .unwrap();
        assert_eq!(
            out,
            ".a { background: url('/images/a.png'), url('/images/b.png'); }"
        );
    }
}
