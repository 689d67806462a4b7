//! ES module syntax rewritten into the bundle's CommonJS module form.
//!
//! | Source | Rewritten |
//! |---|---|
//! | `import './a.js'` | `require('./a.js');` |
//! | `import d from './a.js'` | `var __webpipe_m0 = require('./a.js'); var d = …default…;` |
//! | `import { a, b as c } from './a.js'` | `var a = __webpipe_m0.a; var c = __webpipe_m0.b;` |
//! | `import * as ns from './a.js'` | `var ns = require('./a.js');` |
//! | `export const a = 1` | `const a = 1` and a getter for `a` |
//! | `export function f() {}`, `export class C {}` | the declaration and a getter |
//! | `export default expr` | `var __webpipe_default = expr` and a getter for `default` |
//! | `export { a, b as c }` | getters only |
//! | `export { a } from './x.js'`, `export * from './x.js'` | a `require` and getters |
//!
//! Exports become getters on `exports`, all defined on the module's first
//! line before its body runs, so a cyclic importer sees current values.
//! Imported names are copied once, when their import statement runs. A
//! default import of a CommonJS module yields its `module.exports`.
//!
//! Replacements keep the line count of what they replace. Dynamic `import()`
//! and `import.meta` have no bundle form and are errors.

use super::lexer::{SyntaxError, Token, TokenKind};
use std::collections::BTreeSet;

const BINDING_PREFIX: &str = "__webpipe_m";
const DEFAULT_BINDING: &str = "__webpipe_default";

/// One `a as b` entry of a brace list: the name as written and its rename.
type Specifier<'a> = (Token<'a>, Token<'a>);

/// Rewrite module syntax in `source`. `None` when it has none.
pub fn to_commonjs(source: &str, tokens: &[Token<'_>]) -> Result<Option<String>, SyntaxError> {
    let mut rewrite = Rewrite {
        tokens,
        edits: Vec::new(),
        exports: Vec::new(),
        names: BTreeSet::new(),
        bindings: 0,
        module: false,
    };
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let after_dot = i > 0 && tokens[i - 1].is_punct(".");
        let next = tokens.get(i + 1);
        let is_key = next.is_some_and(|n| n.is_punct(":"));
        if token.kind != TokenKind::Ident || after_dot || is_key {
            i += 1;
            continue;
        }
        i = match token.text {
            "import" => match next {
                Some(n) if n.is_punct("(") => {
                    let message = "dynamic import() is not supported";
                    return Err(SyntaxError::new(token.start, message));
                }
                Some(n) if n.is_punct(".") => {
                    let message = "import.meta is not supported";
                    return Err(SyntaxError::new(token.start, message));
                }
                _ => rewrite.import(i)?,
            },
            "export" => rewrite.export(i)?,
            _ => i + 1,
        };
    }
    Ok(rewrite.module.then(|| rewrite.render(source)))
}

struct Rewrite<'t, 'a> {
    tokens: &'t [Token<'a>],
    /// Byte ranges and their replacements, in source order.
    edits: Vec<(usize, usize, String)>,
    /// Exported name and the expression its getter returns.
    exports: Vec<(String, String)>,
    names: BTreeSet<String>,
    bindings: usize,
    module: bool,
}

impl<'a> Rewrite<'_, 'a> {
    fn token(&self, i: usize) -> Result<Token<'a>, SyntaxError> {
        self.tokens.get(i).copied().ok_or_else(|| {
            let end = self.tokens.last().map_or(0, Token::end);
            SyntaxError::new(end, "unexpected end of module")
        })
    }

    fn expect_ident(&self, i: usize, what: &str) -> Result<Token<'a>, SyntaxError> {
        let t = self.token(i)?;
        if t.kind == TokenKind::Ident {
            Ok(t)
        } else {
            Err(SyntaxError::new(t.start, format!("expected {what}, found '{}'", t.text)))
        }
    }

    fn expect_keyword(&self, i: usize, keyword: &str) -> Result<Token<'a>, SyntaxError> {
        let t = self.token(i)?;
        if t.is_ident(keyword) {
            Ok(t)
        } else {
            let message = format!("expected '{keyword}', found '{}'", t.text);
            Err(SyntaxError::new(t.start, message))
        }
    }

    fn expect_string(&self, i: usize) -> Result<Token<'a>, SyntaxError> {
        let t = self.token(i)?;
        if t.kind == TokenKind::Str {
            Ok(t)
        } else {
            let message = format!("expected module path, found '{}'", t.text);
            Err(SyntaxError::new(t.start, message))
        }
    }

    /// End offset and next index after an optional `;` at `i`.
    fn statement_end(&self, i: usize) -> (usize, usize) {
        match self.tokens.get(i) {
            Some(t) if t.is_punct(";") => (t.end(), i + 1),
            _ => (self.tokens[i - 1].end(), i),
        }
    }

    fn binding(&mut self) -> String {
        let name = format!("{BINDING_PREFIX}{}", self.bindings);
        self.bindings += 1;
        name
    }

    fn export_name(&mut self, at: usize, name: &str, expr: String) -> Result<(), SyntaxError> {
        if !self.names.insert(name.to_string()) {
            return Err(SyntaxError::new(at, format!("duplicate export '{name}'")));
        }
        self.exports.push((name.to_string(), expr));
        Ok(())
    }

    /// A `{ a, b as c }` list starting at `i` (the `{`). Returns the pairs
    /// as written (left, right-or-left) and the index after `}`.
    fn specifiers(&self, mut i: usize) -> Result<(Vec<Specifier<'a>>, usize), SyntaxError> {
        let mut pairs = Vec::new();
        i += 1;
        loop {
            let t = self.token(i)?;
            if t.is_punct("}") {
                return Ok((pairs, i + 1));
            }
            if !matches!(t.kind, TokenKind::Ident | TokenKind::Str) {
                return Err(SyntaxError::new(t.start, format!("unexpected '{}'", t.text)));
            }
            i += 1;
            let mut renamed = t;
            if self.token(i)?.is_ident("as") {
                let r = self.token(i + 1)?;
                if !matches!(r.kind, TokenKind::Ident | TokenKind::Str) {
                    return Err(SyntaxError::new(r.start, format!("unexpected '{}'", r.text)));
                }
                renamed = r;
                i += 2;
            }
            pairs.push((t, renamed));
            let sep = self.token(i)?;
            if sep.is_punct(",") {
                i += 1;
            } else if !sep.is_punct("}") {
                return Err(SyntaxError::new(sep.start, format!("unexpected '{}'", sep.text)));
            }
        }
    }

    fn import(&mut self, at: usize) -> Result<usize, SyntaxError> {
        self.module = true;
        let keyword = self.tokens[at];
        let mut i = at + 1;
        let first = self.token(i)?;

        if first.kind == TokenKind::Str {
            let (end, next) = self.statement_end(i + 1);
            self.edits.push((keyword.start, end, format!("require({});", first.text)));
            return Ok(next);
        }

        let mut default = None;
        let mut namespace = None;
        let mut named = Vec::new();
        if first.kind == TokenKind::Ident {
            default = Some(first.text);
            i += 1;
            if self.token(i)?.is_punct(",") {
                i += 1;
            }
        }
        let t = self.token(i)?;
        if t.is_punct("*") {
            self.expect_keyword(i + 1, "as")?;
            namespace = Some(self.expect_ident(i + 2, "namespace name")?.text);
            i += 3;
        } else if t.is_punct("{") {
            let (pairs, next) = self.specifiers(i)?;
            for (imported, local) in pairs {
                if local.kind != TokenKind::Ident {
                    return Err(SyntaxError::new(local.start, "imported binding must be a name"));
                }
                named.push((member(imported), local.text));
            }
            i = next;
        }
        self.expect_keyword(i, "from")?;
        let path = self.expect_string(i + 1)?;
        let (end, next) = self.statement_end(i + 2);

        let required = format!("require({})", path.text);
        let text = match (default, namespace, named.is_empty()) {
            (None, Some(ns), true) => format!("var {ns} = {required};"),
            _ => {
                let b = self.binding();
                let mut parts = vec![format!("var {b} = {required};")];
                if let Some(ns) = namespace {
                    parts.push(format!("var {ns} = {b};"));
                }
                if let Some(d) = default {
                    parts.push(format!("var {d} = {b} && {b}.__esModule ? {b}.default : {b};"));
                }
                for (member, local) in named {
                    parts.push(format!("var {local} = {b}{member};"));
                }
                parts.join(" ")
            }
        };
        self.edits.push((keyword.start, end, text));
        Ok(next)
    }

    fn export(&mut self, at: usize) -> Result<usize, SyntaxError> {
        self.module = true;
        let tokens = self.tokens;
        let keyword = tokens[at];
        let next = self.token(at + 1)?;

        match next.text {
            "default" if next.kind == TokenKind::Ident => self.export_default(at),
            "var" | "let" | "const" if next.kind == TokenKind::Ident => {
                self.edits.push((keyword.start, next.start, String::new()));
                for name in self.declared_names(at + 2)? {
                    self.export_name(keyword.start, name, name.to_string())?;
                }
                Ok(at + 2)
            }
            "function" | "class" | "async" if next.kind == TokenKind::Ident => {
                let name = self.declaration_name(at + 1)?.ok_or_else(|| {
                    SyntaxError::new(next.start, "exported declaration needs a name")
                })?;
                self.edits.push((keyword.start, next.start, String::new()));
                self.export_name(keyword.start, name.text, name.text.to_string())?;
                Ok(at + 1)
            }
            "{" if next.kind == TokenKind::Punct => {
                let (pairs, mut i) = self.specifiers(at + 1)?;
                let mut text = String::new();
                let source = match tokens.get(i) {
                    Some(t) if t.is_ident("from") => {
                        let path = self.expect_string(i + 1)?;
                        i += 2;
                        let b = self.binding();
                        text = format!("var {b} = require({});", path.text);
                        Some(b)
                    }
                    _ => None,
                };
                for (local, exported) in pairs {
                    let expr = match &source {
                        Some(b) => format!("{b}{}", member(local)),
                        None if local.kind == TokenKind::Ident => local.text.to_string(),
                        None => {
                            let message = "exported binding must be a name";
                            return Err(SyntaxError::new(local.start, message));
                        }
                    };
                    self.export_name(exported.start, &name_of(exported), expr)?;
                }
                let (end, next) = self.statement_end(i);
                self.edits.push((keyword.start, end, text));
                Ok(next)
            }
            "*" if next.kind == TokenKind::Punct => {
                let mut i = at + 2;
                let alias = match self.token(i)? {
                    t if t.is_ident("as") => {
                        let name = self.token(i + 1)?;
                        i += 2;
                        Some(name)
                    }
                    _ => None,
                };
                self.expect_keyword(i, "from")?;
                let path = self.expect_string(i + 1)?;
                let (end, next) = self.statement_end(i + 2);
                let b = self.binding();
                let mut text = format!("var {b} = require({});", path.text);
                match alias {
                    Some(name) => self.export_name(name.start, &name_of(name), b)?,
                    None => text.push_str(&format!(
                        " Object.keys({b}).forEach(function (k) {{ if (k !== \"default\" && \
                         !Object.prototype.hasOwnProperty.call(exports, k)) \
                         Object.defineProperty(exports, k, {{ enumerable: true, get: function () \
                         {{ return {b}[k]; }} }}); }});"
                    )),
                }
                self.edits.push((keyword.start, end, text));
                Ok(next)
            }
            _ => {
                let message = format!("unsupported export form '{}'", next.text);
                Err(SyntaxError::new(next.start, message))
            }
        }
    }

    fn export_default(&mut self, at: usize) -> Result<usize, SyntaxError> {
        let keyword = self.tokens[at];
        let default = self.tokens[at + 1];
        let head = self.token(at + 2)?;
        let async_function = head.is_ident("async")
            && self.tokens.get(at + 3).is_some_and(|t| t.is_ident("function"));
        let is_declaration = head.is_ident("function") || head.is_ident("class") || async_function;

        if !is_declaration {
            self.edits.push((
                keyword.start,
                default.end(),
                format!("var {DEFAULT_BINDING} ="),
            ));
            self.export_name(keyword.start, "default", DEFAULT_BINDING.to_string())?;
            return Ok(at + 2);
        }

        self.edits.push((keyword.start, head.start, String::new()));
        match self.declaration_name(at + 2)? {
            Some(name) => self.export_name(keyword.start, "default", name.text.to_string())?,
            None => {
                // Anonymous: give the declaration the default binding's name.
                let before_name = self.anonymous_name_slot(at + 2)?;
                self.edits.push((before_name, before_name, format!(" {DEFAULT_BINDING}")));
                self.export_name(keyword.start, "default", DEFAULT_BINDING.to_string())?;
            }
        }
        Ok(at + 2)
    }

    /// Index just past `function`, `function*`, `async function` or `class`
    /// starting at `i`.
    fn after_declaration_keyword(&self, mut i: usize) -> Result<usize, SyntaxError> {
        if self.token(i)?.is_ident("async") {
            i += 1;
        }
        let keyword = self.token(i)?;
        i += 1;
        if keyword.is_ident("function") && self.token(i)?.is_punct("*") {
            i += 1;
        }
        Ok(i)
    }

    fn declaration_name(&self, i: usize) -> Result<Option<Token<'a>>, SyntaxError> {
        let t = self.token(self.after_declaration_keyword(i)?)?;
        Ok((t.kind == TokenKind::Ident && !t.is_ident("extends")).then_some(t))
    }

    fn anonymous_name_slot(&self, i: usize) -> Result<usize, SyntaxError> {
        let after = self.after_declaration_keyword(i)?;
        Ok(self.tokens[after - 1].end())
    }

    /// Names bound by a `var`/`let`/`const` declaration whose first binding
    /// is at `i`. The declaration ends at a top-level `;`, or at a line
    /// break after a complete initializer.
    fn declared_names(&self, i: usize) -> Result<Vec<&'a str>, SyntaxError> {
        let mut names = Vec::new();
        let mut depth = 0isize;
        let mut expect_name = true;
        let mut prev = self.tokens[i - 1];
        for t in &self.tokens[i..] {
            if depth == 0 {
                if t.is_punct(";") {
                    break;
                }
                if expect_name {
                    if t.kind != TokenKind::Ident {
                        return Err(SyntaxError::new(
                            t.start,
                            "destructuring exports are not supported",
                        ));
                    }
                    names.push(t.text);
                    expect_name = false;
                    prev = *t;
                    continue;
                }
                if t.newline_before && ends_operand(&prev) && t.kind == TokenKind::Ident {
                    break;
                }
                if t.is_punct(",") {
                    expect_name = true;
                }
            }
            depth += t.depth_delta();
            prev = *t;
        }
        Ok(names)
    }

    fn render(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len() + 256);
        out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true }); ");
        for (name, expr) in &self.exports {
            out.push_str(&format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, \
                 get: function () {{ return {expr}; }} }}); ",
                quoted(name)
            ));
        }
        let mut cursor = 0;
        for (start, end, text) in &self.edits {
            out.push_str(&source[cursor..*start]);
            out.push_str(text);
            let replaced = &source[*start..*end];
            out.extend(std::iter::repeat_n('\n', replaced.matches('\n').count()));
            cursor = *end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

fn ends_operand(t: &Token<'_>) -> bool {
    match t.kind {
        TokenKind::Punct => matches!(t.text, ")" | "]" | "}"),
        TokenKind::Template => t.text.ends_with('`'),
        _ => true,
    }
}

/// Name of an identifier or string-literal specifier.
fn name_of(t: Token<'_>) -> String {
    t.string_value().unwrap_or(t.text).to_string()
}

fn quoted(name: &str) -> String {
    serde_json::Value::from(name).to_string()
}

/// Property access for an imported name.
fn member(t: Token<'_>) -> String {
    match t.kind {
        TokenKind::Str => format!("[{}]", t.text),
        _ => format!(".{}", t.text),
    }
}
