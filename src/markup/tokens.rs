//! A forgiving HTML tokenizer.
//!
//! Good enough to re-indent and collapse hand-written pages: it never
//! fails, never rewrites tag text, and hands back slices of the input so
//! that tags, comments and raw-text contents round-trip byte for byte.
//! Concatenating every token's text reproduces the input exactly.
//!
//! Contents of `script`, `style`, `pre` and `textarea` come back as a
//! single [`Token::Raw`].

/// One lexical piece of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// `<!DOCTYPE …>`, or any other `<!…>` / `<?…>` declaration.
    Doctype(&'a str),
    Comment(&'a str),
    Open {
        /// Lowercased tag name.
        name: String,
        raw: &'a str,
        self_closing: bool,
    },
    Close {
        name: String,
        raw: &'a str,
    },
    Text(&'a str),
    /// Verbatim contents of a raw-text element.
    Raw(&'a str),
}

impl Token<'_> {
    /// The input slice this token came from.
    pub fn as_str(&self) -> &str {
        match self {
            Token::Doctype(s) | Token::Comment(s) | Token::Text(s) | Token::Raw(s) => s,
            Token::Open { raw, .. } | Token::Close { raw, .. } => raw,
        }
    }
}

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT: &[&str] = &["script", "style", "pre", "textarea"];

const INLINE: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "button", "cite", "code", "data", "dfn", "em", "i",
    "img", "input", "kbd", "label", "mark", "option", "q", "s", "samp", "select", "small",
    "span", "strong", "sub", "sup", "time", "u", "var", "wbr",
];

/// Elements that never have content or a closing tag.
pub fn is_void(name: &str) -> bool {
    VOID.contains(&name)
}

/// Elements whose contents are kept verbatim.
pub fn is_raw_text(name: &str) -> bool {
    RAW_TEXT.contains(&name)
}

/// Phrasing elements that flow with surrounding text.
pub fn is_inline(name: &str) -> bool {
    INLINE.contains(&name)
}

/// HTML whitespace.
pub fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// Replace every whitespace run with a single space.
pub fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if is_space(c) {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn tag_name(after_lt: &str) -> String {
    after_lt
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Byte offset just past the `>` closing a tag that starts at 0, honoring
/// quoted attribute values.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, b) in s.bytes().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
    }
    None
}

/// Split a document into tokens.
pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = html[cursor..].find('<') {
        let lt = cursor + offset;
        let rest = &html[lt..];
        let next = rest[1..].chars().next();

        let (token, end) = if rest.starts_with("<!--") {
            let end = rest.find("-->").map_or(html.len(), |i| lt + i + 3);
            (Token::Comment(&html[lt..end]), end)
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest.find('>').map_or(html.len(), |i| lt + i + 1);
            (Token::Doctype(&html[lt..end]), end)
        } else if rest.starts_with("</")
            && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            let Some(len) = tag_end(rest) else { break };
            let name = tag_name(&rest[2..]);
            (Token::Close { name, raw: &html[lt..lt + len] }, lt + len)
        } else if next.is_some_and(|c| c.is_ascii_alphabetic()) {
            let Some(len) = tag_end(rest) else { break };
            let raw = &html[lt..lt + len];
            let name = tag_name(&rest[1..]);
            let self_closing = raw.ends_with("/>");
            (Token::Open { name, raw, self_closing }, lt + len)
        } else {
            // A literal '<' in text.
            cursor = lt + 1;
            continue;
        };

        if text_start < lt {
            tokens.push(Token::Text(&html[text_start..lt]));
        }
        let raw_element = match &token {
            Token::Open {
                name,
                self_closing: false,
                ..
            } if is_raw_text(name) => Some(name.clone()),
            _ => None,
        };
        tokens.push(token);
        cursor = end;

        if let Some(name) = raw_element {
            let closing = format!("</{name}");
            let content_end = html[cursor..]
                .to_ascii_lowercase()
                .find(&closing)
                .map_or(html.len(), |i| cursor + i);
            if cursor < content_end {
                tokens.push(Token::Raw(&html[cursor..content_end]));
            }
            cursor = content_end;
        }
        text_start = cursor;
    }

    if text_start < html.len() {
        tokens.push(Token::Text(&html[text_start..]));
    }
    tokens
}
