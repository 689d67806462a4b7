//! CSS passes on lightningcss: vendor prefixing, minification, unused
//! selector removal and inline source maps.
//!
//! Each pass parses the stylesheet, optionally runs lightningcss's minifier
//! (which is where prefixes are added and unused symbols dropped), and
//! prints it back. Browser targets come from the `styles.browsers` query
//! list.

use super::{StyleError, text_of};
use crate::pipeline::FileRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::collections::HashSet;
use std::path::Path;

/// Resolve a browserslist query list into lightningcss targets.
pub fn targets(queries: &[String]) -> Result<Targets, StyleError> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| StyleError::Browsers(e.to_string()))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// One parse, transform and print cycle.
#[derive(Default)]
pub(crate) struct Pass {
    /// Run the minifier (adds prefixes, drops unused symbols).
    pub transform: bool,
    /// Print compactly.
    pub compact: bool,
    pub unused_symbols: HashSet<String>,
    pub source_map: Option<MapOrigin>,
}

/// The source a generated map points back to: its name in `sources` and
/// the text embedded as `sourcesContent`.
#[derive(Debug, Clone)]
pub(crate) struct MapOrigin {
    pub name: String,
    pub content: String,
}

impl Pass {
    pub(crate) fn run(
        self,
        path: &Path,
        css: &str,
        targets: Targets,
    ) -> Result<String, StyleError> {
        let filename = path.to_string_lossy().replace('\\', "/");
        let css_error = |message: String| StyleError::Css {
            path: path.to_path_buf(),
            message,
        };

        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.clone(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| css_error(e.to_string()))?;

        if self.transform {
            sheet
                .minify(MinifyOptions {
                    targets,
                    unused_symbols: self.unused_symbols,
                })
                .map_err(|e| css_error(e.to_string()))?;
        }

        let mut map = match &self.source_map {
            Some(origin) => {
                let mut map = SourceMap::new("/");
                let index = map.add_source(&origin.name);
                map.set_source_content(index as usize, &origin.content)
                    .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
                Some(map)
            }
            None => None,
        };

        let printed = sheet
            .to_css(PrinterOptions {
                minify: self.compact,
                targets,
                source_map: map.as_mut(),
                ..PrinterOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        let mut code = printed.code;
        if let Some(mut map) = map {
            let json = map
                .to_json(None)
                .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
            code.push_str(&format!(
                "\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */\n",
                STANDARD.encode(json)
            ));
        }
        Ok(code)
    }
}

fn each(
    files: Vec<FileRecord>,
    browsers: &[String],
    pass: impl Fn() -> Pass,
) -> Result<Vec<FileRecord>, StyleError> {
    let targets = targets(browsers)?;
    files
        .into_iter()
        .map(|mut file| {
            let css = pass().run(&file.path, text_of(&file)?, targets)?;
            file.set_text(css);
            Ok(file)
        })
        .collect()
}

/// Add vendor prefixes required by the browser targets.
pub fn autoprefix(
    files: Vec<FileRecord>,
    browsers: &[String],
) -> Result<Vec<FileRecord>, StyleError> {
    each(files, browsers, || Pass {
        transform: true,
        ..Pass::default()
    })
}

/// Print compactly.
pub fn minify(files: Vec<FileRecord>, browsers: &[String]) -> Result<Vec<FileRecord>, StyleError> {
    each(files, browsers, || Pass {
        transform: true,
        compact: true,
        ..Pass::default()
    })
}

/// Where a compiled stylesheet's map leads: the SCSS entry it was read
/// from, named relative to the source base. Records built in memory map
/// onto themselves.
fn map_origin(file: &FileRecord, css: &str) -> Result<MapOrigin, StyleError> {
    match &file.source {
        Some(source) => {
            let name = match source.file_name() {
                Some(entry) => file.path.with_file_name(entry),
                None => file.path.clone(),
            };
            Ok(MapOrigin {
                name: name.to_string_lossy().replace('\\', "/"),
                content: std::fs::read_to_string(source)?,
            })
        }
        None => Ok(MapOrigin {
            name: file.display_path(),
            content: css.to_string(),
        }),
    }
}

/// Append an inline base64 source map comment leading back to the SCSS
/// entry, with the entry text embedded.
pub fn inline_source_map(
    files: Vec<FileRecord>,
    browsers: &[String],
) -> Result<Vec<FileRecord>, StyleError> {
    let targets = targets(browsers)?;
    files
        .into_iter()
        .map(|mut file| {
            let css = text_of(&file)?;
            let pass = Pass {
                source_map: Some(map_origin(&file, css)?),
                ..Pass::default()
            };
            let mapped = pass.run(&file.path, css, targets)?;
            file.set_text(mapped);
            Ok(file)
        })
        .collect()
}
