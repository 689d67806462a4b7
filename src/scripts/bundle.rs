//! Module bundler.
//!
//! Walks the `require()` graph from every entry script and emits one file
//! holding a module table and a tiny loader. Module ids are paths relative
//! to the script source directory, with forward slashes.
//!
//! ES module `import`/`export` statements are first rewritten into the same
//! `require()` form (see [`esm`](super::esm)). Requests are read from the
//! token stream of [`lexer`](super::lexer), so calls written inside comments
//! or string literals are not dependencies.
//!
//! ## Resolution
//!
//! A request must be relative (`./` or `../`) and is resolved against the
//! requiring module's directory. Candidates, first existing file wins:
//!
//! 1. the path itself, if it ends in `.js`
//! 2. the path with `.js` appended
//! 3. `index.js` inside the path
//!
//! Package requests (`require('lodash')`) and paths escaping the source
//! directory are unresolvable and fail the bundle.
//!
//! ## Output shape
//!
//! ```text
//! (function (modules, entries) { …loader… })({
//! "lib/greet.js": [function (require, module, exports) {
//! …source…
//! }, {"./greet.js": "lib/greet.js"}],
//! }, ["main.js"]);
//! ```
//!
//! Entries run in sorted order; each module body runs at most once.

use super::lexer::{self, SyntaxError, TokenKind};
use super::{ScriptError, esm};
use crate::pipeline::FileRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const LOADER: &str = "(function (modules, entries) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = cache[id] = { exports: {} };
    var deps = modules[id][1];
    modules[id][0].call(module.exports, function (request) {
      return load(deps[request]);
    }, module, module.exports);
    return module.exports;
  }
  entries.forEach(load);
})";

/// One module in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub source: String,
    /// Request string → resolved module id.
    pub deps: BTreeMap<String, String>,
}

/// A resolved module graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub modules: BTreeMap<String, Module>,
    pub entries: Vec<String>,
}

/// Request strings of every `require('…')` call in `source`, in order.
/// Method calls (`obj.require(…)`) and non-literal arguments are skipped.
pub fn requests(source: &str) -> Result<Vec<&str>, SyntaxError> {
    let tokens = lexer::tokenize(source)?;
    Ok(tokens
        .windows(4)
        .enumerate()
        .filter(|(i, w)| {
            let method = *i > 0 && tokens[i - 1].is_punct(".");
            !method
                && w[0].is_ident("require")
                && w[1].is_punct("(")
                && w[2].kind == TokenKind::Str
                && w[3].is_punct(")")
        })
        .filter_map(|(_, w)| w[2].string_value())
        .collect())
}

/// A module's source in the bundle's CommonJS form.
fn module_source(id: &str, source: String) -> Result<String, ScriptError> {
    let rewritten = {
        let tokens =
            lexer::tokenize(&source).map_err(|e| ScriptError::syntax(id, &source, e))?;
        esm::to_commonjs(&source, &tokens).map_err(|e| ScriptError::syntax(id, &source, e))?
    };
    Ok(rewritten.unwrap_or(source))
}

/// Collapse `.` and `..` segments of a `/`-separated id. `None` if the path
/// climbs above the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Resolve `request` made by module `from` to a module id under `base`.
pub fn resolve(base: &Path, from: &str, request: &str) -> Result<String, ScriptError> {
    let not_found = || ScriptError::ModuleNotFound {
        from: from.to_string(),
        request: request.to_string(),
    };
    if !(request.starts_with("./") || request.starts_with("../")) {
        return Err(not_found());
    }
    let dir = from.rsplit_once('/').map_or("", |(dir, _)| dir);
    let joined = if dir.is_empty() {
        request.to_string()
    } else {
        format!("{dir}/{request}")
    };
    let id = normalize(&joined).ok_or_else(not_found)?;

    let mut candidates = Vec::with_capacity(3);
    if id.ends_with(".js") {
        candidates.push(id.clone());
    }
    candidates.push(format!("{id}.js"));
    candidates.push(format!("{id}/index.js"));

    candidates
        .into_iter()
        .find(|c| base.join(c).is_file())
        .ok_or_else(not_found)
}

impl Bundle {
    /// Build the graph from entry records, reading dependencies from `base`.
    pub fn build(base: &Path, entries: &[FileRecord]) -> Result<Self, ScriptError> {
        let mut bundle = Bundle::default();
        let mut pending: Vec<(String, String)> = Vec::new();

        let mut entry_ids: Vec<String> = entries.iter().map(FileRecord::display_path).collect();
        entry_ids.sort();
        for entry in entries {
            let source = entry
                .text()
                .ok_or_else(|| ScriptError::NotUtf8(entry.path.clone()))?;
            pending.push((entry.display_path(), source.to_string()));
        }
        bundle.entries = entry_ids;

        let mut seen: BTreeSet<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        while let Some((id, source)) = pending.pop() {
            let source = module_source(&id, source)?;
            let mut deps = BTreeMap::new();
            let found = requests(&source).map_err(|e| ScriptError::syntax(&id, &source, e))?;
            for request in found {
                let dep = resolve(base, &id, request)?;
                if seen.insert(dep.clone()) {
                    let path = base.join(&dep);
                    let text = std::fs::read_to_string(&path)?;
                    pending.push((dep.clone(), text));
                }
                deps.insert(request.to_string(), dep);
            }
            bundle.modules.insert(id, Module { source, deps });
        }
        Ok(bundle)
    }

    /// Emit the bundle as one script.
    pub fn render(&self) -> Result<String, ScriptError> {
        let mut out = String::from(LOADER);
        out.push_str("({\n");
        for (id, module) in &self.modules {
            out.push_str(&serde_json::to_string(id)?);
            out.push_str(": [function (require, module, exports) {\n");
            out.push_str(&module.source);
            if !module.source.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("}, ");
            out.push_str(&serde_json::to_string(&module.deps)?);
            out.push_str("],\n");
        }
        out.push_str("}, ");
        out.push_str(&serde_json::to_string(&self.entries)?);
        out.push_str(");\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (rel, body) in files {
            let path = tmp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        tmp
    }

    fn entry(tmp: &TempDir, rel: &str) -> FileRecord {
        FileRecord::load(tmp.path(), &tmp.path().join(rel)).unwrap()
    }

    // =========================================================================
    // Requests and resolution
    // =========================================================================

    #[test]
    fn finds_both_quote_styles() {
        let src = "var a = require('./a');\nvar b = require( \"../b.js\" );\nrequires('./no');";
        assert_eq!(requests(src).unwrap(), vec!["./a", "../b.js"]);
    }

    #[test]
    fn requires_in_comments_and_strings_are_not_requests() {
        let src = "// usage: require('./later')\n\
                   /* require('./old') */\n\
                   var s = \"require('./text')\";\n\
                   var t = `${require('./real')}`;\n\
                   loader.require('./method');\n\
                   console.log(1);";
        assert_eq!(requests(src).unwrap(), vec!["./real"]);
    }

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("lib/./x/../y.js").as_deref(), Some("lib/y.js"));
        assert_eq!(normalize("../outside.js"), None);
    }

    #[test]
    fn resolve_appends_js() {
        let tmp = tree(&[("lib/greet.js", "")]);
        assert_eq!(resolve(tmp.path(), "main.js", "./lib/greet").unwrap(), "lib/greet.js");
    }

    #[test]
    fn resolve_directory_index() {
        let tmp = tree(&[("util/index.js", "")]);
        assert_eq!(resolve(tmp.path(), "main.js", "./util").unwrap(), "util/index.js");
    }

    #[test]
    fn resolve_relative_to_requiring_module() {
        let tmp = tree(&[("lib/a.js", ""), ("shared.js", "")]);
        assert_eq!(resolve(tmp.path(), "lib/a.js", "../shared").unwrap(), "shared.js");
    }

    #[test]
    fn package_request_is_not_found() {
        let tmp = tree(&[]);
        let err = resolve(tmp.path(), "main.js", "lodash").unwrap_err();
        assert!(matches!(err, ScriptError::ModuleNotFound { .. }));
    }

    #[test]
    fn missing_module_names_requester() {
        let tmp = tree(&[]);
        let err = resolve(tmp.path(), "main.js", "./nope").unwrap_err();
        assert_eq!(err.to_string(), "cannot resolve './nope' from main.js");
    }

    // =========================================================================
    // Graph and output
    // =========================================================================

    #[test]
    fn graph_includes_transitive_modules_once() {
        let tmp = tree(&[
            ("main.js", "require('./lib/a'); require('./lib/b');"),
            ("lib/a.js", "require('./c');"),
            ("lib/b.js", "require('./c');"),
            ("lib/c.js", "module.exports = 1;"),
        ]);
        let bundle = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")]).unwrap();
        let ids: Vec<&str> = bundle.modules.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["lib/a.js", "lib/b.js", "lib/c.js", "main.js"]);
        assert_eq!(bundle.modules["lib/a.js"].deps["./c"], "lib/c.js");
    }

    #[test]
    fn cycles_terminate() {
        let tmp = tree(&[
            ("a.js", "require('./b');"),
            ("b.js", "require('./a');"),
        ]);
        let bundle = Bundle::build(tmp.path(), &[entry(&tmp, "a.js")]).unwrap();
        assert_eq!(bundle.modules.len(), 2);
    }

    #[test]
    fn entries_are_sorted() {
        let tmp = tree(&[("z.js", "1;"), ("a.js", "2;")]);
        let bundle =
            Bundle::build(tmp.path(), &[entry(&tmp, "z.js"), entry(&tmp, "a.js")]).unwrap();
        assert_eq!(bundle.entries, vec!["a.js", "z.js"]);
    }

    #[test]
    fn render_contains_table_and_entries() {
        let tmp = tree(&[
            ("main.js", "var g = require('./greet');\ng();"),
            ("greet.js", "module.exports = function () {};"),
        ]);
        let js = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")])
            .unwrap()
            .render()
            .unwrap();
        assert!(js.starts_with("(function (modules, entries)"));
        assert!(js.contains("\"greet.js\": [function (require, module, exports) {\n"));
        assert!(js.contains("{\"./greet\":\"greet.js\"}"));
        assert!(js.trim_end().ends_with("}, [\"main.js\"]);"));
    }

    #[test]
    fn commented_require_does_not_fail_build() {
        let tmp = tree(&[("main.js", "// usage: require('./later')\nconsole.log(1);")]);
        let bundle = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")]).unwrap();
        assert_eq!(bundle.modules.len(), 1);
        assert!(bundle.modules["main.js"].deps.is_empty());
    }

    #[test]
    fn es_module_imports_join_the_graph() {
        let tmp = tree(&[
            ("main.js", "import { greet } from './lib/greet.js';\ngreet('you');\n"),
            (
                "lib/greet.js",
                "export function greet(name) {\n  return 'hi ' + name;\n}\n",
            ),
        ]);
        let bundle = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")]).unwrap();
        assert_eq!(bundle.modules["main.js"].deps["./lib/greet.js"], "lib/greet.js");
        let greet = &bundle.modules["lib/greet.js"].source;
        assert!(greet.contains("Object.defineProperty(exports, \"greet\""), "{greet}");
        assert!(!greet.contains("export "), "{greet}");

        let js = bundle.render().unwrap();
        assert!(!js.contains("import {"), "{js}");
    }

    #[test]
    fn syntax_error_names_module_and_line() {
        let tmp = tree(&[("main.js", "var a = 1;\nvar s = 'open;\n")]);
        let err = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")]).unwrap_err();
        assert_eq!(err.to_string(), "main.js:2: unterminated string literal");
    }

    #[test]
    fn unresolved_require_fails_build() {
        let tmp = tree(&[("main.js", "require('./missing');")]);
        let err = Bundle::build(tmp.path(), &[entry(&tmp, "main.js")]).unwrap_err();
        assert!(matches!(err, ScriptError::ModuleNotFound { .. }));
    }
}
