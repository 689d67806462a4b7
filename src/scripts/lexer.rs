//! Just enough of a JavaScript lexer to find module syntax.
//!
//! Comments are dropped. String, template and regular-expression literals
//! come out as single tokens, so a `require('…')` or `import` written inside
//! one is never mistaken for code. Punctuation is one character per token
//! except `++` and `--`.
//!
//! A `/` starts a regular expression unless the previous token ends an
//! operand (a name, literal, `)`, `]`, `++` or `--`); after a keyword such
//! as `return` it is a regular expression again.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Str,
    /// A whole template literal, or one of its pieces around `${ … }`.
    Template,
    Regex,
    Number,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset in the source.
    pub start: usize,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    /// Contents of a string literal, quotes removed, escapes left as written.
    pub fn string_value(&self) -> Option<&'a str> {
        (self.kind == TokenKind::Str).then(|| &self.text[1..self.text.len() - 1])
    }

    /// Change in bracket depth this token causes. Template pieces open and
    /// close their `${ … }` holes.
    pub fn depth_delta(&self) -> isize {
        match self.kind {
            TokenKind::Punct => match self.text {
                "(" | "[" | "{" => 1,
                ")" | "]" | "}" => -1,
                _ => 0,
            },
            TokenKind::Template => {
                let closes = isize::from(self.text.starts_with('}'));
                let opens = isize::from(self.text.ends_with("${"));
                opens - closes
            }
            _ => 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Keywords after which an expression, and so a regular expression, starts.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    Lexer {
        src,
        pos: 0,
        tokens: Vec::new(),
        newline: false,
        depth: 0,
        holes: Vec::new(),
    }
    .run()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '#' || (!c.is_ascii() && !c.is_whitespace())
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\u{200c}' || c == '\u{200d}'
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token<'a>>,
    newline: bool,
    depth: usize,
    /// Bracket depth at each open `${`, innermost last.
    holes: Vec<usize>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token<'a>>, SyntaxError> {
        if self.src.starts_with("#!") {
            self.skip_line();
        }
        while let Some(c) = self.current() {
            match c {
                c if is_line_break(c) => {
                    self.newline = true;
                    self.pos += c.len_utf8();
                }
                c if c.is_whitespace() || c == '\u{feff}' => self.pos += c.len_utf8(),
                '/' if self.ahead(1) == Some('/') => self.skip_line(),
                '/' if self.ahead(1) == Some('*') => self.block_comment()?,
                '<' if self.src[self.pos..].starts_with("<!--") => self.skip_line(),
                '\'' | '"' => self.string(c)?,
                '`' => {
                    let start = self.pos;
                    self.pos += 1;
                    self.template(start)?;
                }
                '/' if self.regex_allowed() => self.regex()?,
                '0'..='9' => self.number(),
                '.' if self.ahead(1).is_some_and(|n| n.is_ascii_digit()) => self.number(),
                '{' => {
                    self.depth += 1;
                    self.punct(1);
                }
                '}' if self.holes.last() == Some(&self.depth) => {
                    self.holes.pop();
                    self.depth = self.depth.saturating_sub(1);
                    let start = self.pos;
                    self.pos += 1;
                    self.template(start)?;
                }
                '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.punct(1);
                }
                '+' | '-' if self.ahead(1) == Some(c) => self.punct(2),
                c if is_ident_start(c) => self.ident(),
                c => self.punct(c.len_utf8()),
            }
        }
        if !self.holes.is_empty() {
            return Err(SyntaxError::new(self.src.len(), "unterminated template literal"));
        }
        Ok(self.tokens)
    }

    fn current(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn ahead(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            text: &self.src[start..self.pos],
            start,
            newline_before: std::mem::take(&mut self.newline),
        });
    }

    fn punct(&mut self, len: usize) {
        let start = self.pos;
        self.pos += len;
        self.push(TokenKind::Punct, start);
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.current() {
            if is_line_break(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Step over a backslash escape at the current position.
    fn skip_escape(&mut self) {
        self.pos += 1;
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
    }

    fn block_comment(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let Some(len) = self.src[start + 2..].find("*/") else {
            return Err(SyntaxError::new(start, "unterminated comment"));
        };
        let body = &self.src[start + 2..start + 2 + len];
        if body.chars().any(is_line_break) {
            self.newline = true;
        }
        self.pos = start + 2 + len + 2;
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.current() {
                Some('\\') => self.skip_escape(),
                Some(c) if c == quote => {
                    self.pos += 1;
                    self.push(TokenKind::Str, start);
                    return Ok(());
                }
                Some('\n' | '\r') | None => {
                    return Err(SyntaxError::new(start, "unterminated string literal"));
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }
    }

    /// Scan template text from `start` (a backtick or the `}` closing a
    /// hole) to the closing backtick or the next `${`.
    fn template(&mut self, start: usize) -> Result<(), SyntaxError> {
        loop {
            match self.current() {
                Some('\\') => self.skip_escape(),
                Some('`') => {
                    self.pos += 1;
                    self.push(TokenKind::Template, start);
                    return Ok(());
                }
                Some('$') if self.ahead(1) == Some('{') => {
                    self.pos += 2;
                    self.push(TokenKind::Template, start);
                    self.depth += 1;
                    self.holes.push(self.depth);
                    return Ok(());
                }
                Some(c) => self.pos += c.len_utf8(),
                None => return Err(SyntaxError::new(start, "unterminated template literal")),
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.last() else {
            return true;
        };
        match prev.kind {
            TokenKind::Punct => !matches!(prev.text, ")" | "]" | "++" | "--"),
            TokenKind::Ident => EXPRESSION_KEYWORDS.contains(&prev.text),
            TokenKind::Template => prev.text.ends_with("${"),
            TokenKind::Str | TokenKind::Regex | TokenKind::Number => false,
        }
    }

    fn regex(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.current() {
                Some('\\') => self.skip_escape(),
                Some('[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(c) if !is_line_break(c) => self.pos += c.len_utf8(),
                _ => return Err(SyntaxError::new(start, "unterminated regular expression")),
            }
        }
        while let Some(c) = self.current().filter(|c| is_ident_continue(*c)) {
            self.pos += c.len_utf8();
        }
        self.push(TokenKind::Regex, start);
        Ok(())
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(c) = self
            .current()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        {
            self.pos += c.len_utf8();
        }
        self.push(TokenKind::Number, start);
    }

    fn ident(&mut self) {
        let start = self.pos;
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
        while let Some(c) = self.current().filter(|c| is_ident_continue(*c)) {
            self.pos += c.len_utf8();
        }
        self.push(TokenKind::Ident, start);
    }
}
