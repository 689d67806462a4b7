//! Script compression with minify-js.

use super::ScriptError;
use crate::pipeline::FileRecord;
use minify_js::{Session, TopLevelMode, minify};

/// Minify one script. Scripts are treated as classic (global) scripts.
pub fn minify_source(source: &[u8]) -> Result<Vec<u8>, String> {
    let session = Session::new();
    let mut out = Vec::with_capacity(source.len());
    minify(&session, TopLevelMode::Global, source, &mut out).map_err(|e| format!("{e:?}"))?;
    Ok(out)
}

/// Minify every record in place.
pub fn minify_all(files: Vec<FileRecord>) -> Result<Vec<FileRecord>, ScriptError> {
    files
        .into_iter()
        .map(|mut file| {
            file.contents =
                minify_source(&file.contents).map_err(|message| ScriptError::Minify {
                    path: file.path.clone(),
                    message,
                })?;
            Ok(file)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrinks_whitespace_and_locals() {
        let src = b"function greet(name) {\n  var message = 'Hello, ' + name;\n  return message;\n}\nconsole.log(greet('w'));\n";
        let out = minify_source(src).unwrap();
        assert!(out.len() < src.len());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("console.log"));
    }

    #[test]
    fn keeps_global_names() {
        let out = minify_source(b"var exported = 1; window.exported = exported;").unwrap();
        assert!(String::from_utf8(out).unwrap().contains("window.exported"));
    }

    #[test]
    fn syntax_error_names_file() {
        let files = vec![FileRecord::new("bundle.js", "function (")];
        let err = minify_all(files).unwrap_err();
        assert!(matches!(err, ScriptError::Minify { .. }));
        assert!(err.to_string().contains("bundle.js"));
    }

    #[test]
    fn records_keep_their_names() {
        let files = vec![FileRecord::new("bundle.js", "var a = 1 + 2;\n")];
        let out = minify_all(files).unwrap();
        assert_eq!(out[0].display_path(), "bundle.js");
        assert_eq!(out[0].original_size, 15);
    }
}
