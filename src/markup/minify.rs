//! Whitespace collapsing for the minified tree.
//!
//! Every whitespace run in text becomes one space. Text next to a block
//! boundary (doctype, comment, a block-level or raw-text tag, or either end
//! of the document) additionally loses its whitespace on that side. Text
//! that ends up empty is dropped. Tags, comments and raw-text contents are
//! copied unchanged.

use super::tokens::{Token, collapse_spaces, is_inline, is_raw_text, is_space, tokenize};

fn is_boundary(token: &Token<'_>) -> bool {
    match token {
        Token::Doctype(_) | Token::Comment(_) => true,
        Token::Open { name, .. } | Token::Close { name, .. } => {
            !is_inline(name) || is_raw_text(name)
        }
        Token::Text(_) | Token::Raw(_) => false,
    }
}

/// Collapse whitespace in a document.
pub fn collapse(html: &str) -> String {
    let tokens = tokenize(html);
    let mut out = String::with_capacity(html.len());
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Text(text) => {
                let collapsed = collapse_spaces(text);
                let mut kept = collapsed.as_str();
                if i == 0 || is_boundary(&tokens[i - 1]) {
                    kept = kept.trim_start_matches(is_space);
                }
                if i + 1 == tokens.len() || is_boundary(&tokens[i + 1]) {
                    kept = kept.trim_end_matches(is_space);
                }
                out.push_str(kept);
            }
            other => out.push_str(other.as_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_and_trims_at_blocks() {
        assert_eq!(
            collapse("<div>\n  <p>  Hello \n\n world </p>\n</div>\n"),
            "<div><p>Hello world</p></div>"
        );
    }

    #[test]
    fn keeps_single_space_between_inline_elements() {
        assert_eq!(
            collapse("<p><b>a</b>   <i>b</i></p>"),
            "<p><b>a</b> <i>b</i></p>"
        );
    }

    #[test]
    fn raw_text_untouched() {
        let html = "<pre>\n  a   b\n</pre>\n<script>\n  var  x = 1;\n</script>";
        assert_eq!(collapse(html), html.replace(">\n<script", "><script"));
    }

    #[test]
    fn comments_and_doctype_are_boundaries() {
        assert_eq!(
            collapse("<!DOCTYPE html>\n<!-- c -->\n  text"),
            "<!DOCTYPE html><!-- c -->text"
        );
    }

    #[test]
    fn idempotent() {
        let html = "<ul>\n  <li> one </li>\n  <li><a href=\"#\"> two </a></li>\n</ul>\n";
        let once = collapse(html);
        assert_eq!(collapse(&once), once);
    }

    #[test]
    fn attribute_whitespace_is_not_touched() {
        let html = "<p title=\"a   b\">x</p>";
        assert_eq!(collapse(html), html);
    }
}
