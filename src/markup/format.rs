//! HTML pretty printer.
//!
//! Tokens are assembled into a loose element tree (unclosed elements close
//! at their parent's end tag, stray end tags are kept as leaves) and printed
//! back with two spaces per nesting level.
//!
//! - An element whose children are all inline (text and phrasing elements)
//!   prints on one line, whitespace collapsed and trimmed at its edges.
//! - Runs of inline siblings inside a block print as one line. A phrasing
//!   element always prints inline, even when it wraps block content.
//! - Doctype, comments, block elements and raw-text elements
//!   (`script`, `style`, `pre`, `textarea`) start their own line.
//! - Raw-text contents print verbatim.
//!
//! Formatting only moves whitespace that the collapse pass removes anyway,
//! so collapsing a formatted page gives the same result as collapsing the
//! original.

use super::tokens::{Token, collapse_spaces, is_inline, is_raw_text, is_space, is_void, tokenize};

const INDENT: &str = "  ";

#[derive(Debug)]
enum Node<'a> {
    Doctype(&'a str),
    Comment(&'a str),
    Text(&'a str),
    Raw(&'a str),
    /// Void or self-closing tag, or an end tag with no open element.
    Leaf { name: String, raw: &'a str },
    Element {
        name: String,
        open: &'a str,
        children: Vec<Node<'a>>,
        close: Option<&'a str>,
    },
}

struct Frame<'a> {
    name: String,
    open: &'a str,
    children: Vec<Node<'a>>,
}

impl<'a> Frame<'a> {
    fn finish(self, close: Option<&'a str>) -> Node<'a> {
        Node::Element {
            name: self.name,
            open: self.open,
            children: self.children,
            close,
        }
    }
}

fn push<'a>(stack: &mut [Frame<'a>], root: &mut Vec<Node<'a>>, node: Node<'a>) {
    match stack.last_mut() {
        Some(frame) => frame.children.push(node),
        None => root.push(node),
    }
}

fn build(tokens: Vec<Token<'_>>) -> Vec<Node<'_>> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame<'_>> = Vec::new();

    for token in tokens {
        match token {
            Token::Doctype(s) => push(&mut stack, &mut root, Node::Doctype(s)),
            Token::Comment(s) => push(&mut stack, &mut root, Node::Comment(s)),
            Token::Text(s) => push(&mut stack, &mut root, Node::Text(s)),
            Token::Raw(s) => push(&mut stack, &mut root, Node::Raw(s)),
            Token::Open {
                name,
                raw,
                self_closing,
            } => {
                if self_closing || is_void(&name) {
                    push(&mut stack, &mut root, Node::Leaf { name, raw });
                } else {
                    stack.push(Frame {
                        name,
                        open: raw,
                        children: Vec::new(),
                    });
                }
            }
            Token::Close { name, raw } => {
                match stack.iter().rposition(|f| f.name == name) {
                    Some(index) => {
                        // Elements left open inside this one end here.
                        while stack.len() > index + 1 {
                            if let Some(frame) = stack.pop() {
                                let node = frame.finish(None);
                                push(&mut stack, &mut root, node);
                            }
                        }
                        if let Some(frame) = stack.pop() {
                            let node = frame.finish(Some(raw));
                            push(&mut stack, &mut root, node);
                        }
                    }
                    None => push(&mut stack, &mut root, Node::Leaf { name, raw }),
                }
            }
        }
    }
    while let Some(frame) = stack.pop() {
        let node = frame.finish(None);
        push(&mut stack, &mut root, node);
    }
    root
}

fn is_inline_node(node: &Node<'_>) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Leaf { name, .. } => is_inline(name),
        Node::Element { name, .. } => is_inline(name) && !is_raw_text(name),
        Node::Doctype(_) | Node::Comment(_) | Node::Raw(_) => false,
    }
}

fn trim_spaces(s: &str) -> &str {
    s.trim_matches(is_space)
}

fn render_inline(node: &Node<'_>, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&collapse_spaces(t)),
        Node::Leaf { raw, .. } => out.push_str(raw),
        Node::Element {
            open,
            children,
            close,
            ..
        } => {
            out.push_str(open);
            for child in children {
                render_inline(child, out);
            }
            out.push_str(close.unwrap_or(""));
        }
        Node::Doctype(s) | Node::Comment(s) | Node::Raw(s) => out.push_str(s),
    }
}

fn line(lines: &mut Vec<String>, depth: usize, text: &str) {
    lines.push(format!("{}{}", INDENT.repeat(depth), text));
}

fn flush(run: &mut String, depth: usize, lines: &mut Vec<String>) {
    let text = trim_spaces(run);
    if !text.is_empty() {
        line(lines, depth, text);
    }
    run.clear();
}

fn render_children(nodes: &[Node<'_>], depth: usize, lines: &mut Vec<String>) {
    let mut run = String::new();
    for node in nodes {
        if is_inline_node(node) {
            render_inline(node, &mut run);
        } else {
            flush(&mut run, depth, lines);
            render_block(node, depth, lines);
        }
    }
    flush(&mut run, depth, lines);
}

fn render_block(node: &Node<'_>, depth: usize, lines: &mut Vec<String>) {
    match node {
        Node::Doctype(s) | Node::Comment(s) | Node::Raw(s) => line(lines, depth, s),
        Node::Leaf { raw, .. } => line(lines, depth, raw),
        Node::Text(t) => line(lines, depth, trim_spaces(&collapse_spaces(t))),
        Node::Element {
            name,
            open,
            children,
            close,
        } => {
            let close = close.unwrap_or("");
            if is_raw_text(name) {
                let body: String = children
                    .iter()
                    .map(|c| match c {
                        Node::Raw(s) | Node::Text(s) => *s,
                        _ => "",
                    })
                    .collect();
                line(lines, depth, &format!("{open}{body}{close}"));
            } else if children.iter().all(is_inline_node) {
                let mut body = String::new();
                for child in children {
                    render_inline(child, &mut body);
                }
                line(lines, depth, &format!("{open}{}{close}", trim_spaces(&body)));
            } else {
                line(lines, depth, open);
                render_children(children, depth + 1, lines);
                if !close.is_empty() {
                    line(lines, depth, close);
                }
            }
        }
    }
}

/// Re-indent a document.
pub fn format(html: &str) -> String {
    let nodes = build(tokenize(html));
    let mut lines = Vec::new();
    render_children(&nodes, 0, &mut lines);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
