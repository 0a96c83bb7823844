//! Minifying renderer.
//!
//! Drops every whitespace leaf and re-inserts the minimum separation the
//! token stream needs to lex back to the same tokens: a single space where
//! two tokens would otherwise fuse, and a line break after single-line
//! comments and around batch separators, which are only valid alone on a
//! line.

use crate::formatter::html_escape;
use crate::tree::{NodeId, NodeKind, SqlTree};

pub fn format(tree: &SqlTree, html: bool) -> String {
    render_leaves(tree, &tree.leaves(tree.root()), html)
}

/// Render an explicit leaf list; used by the standard formatter for
/// `[minify]` region splicing.
pub(crate) fn render_leaves(tree: &SqlTree, leaves: &[NodeId], html: bool) -> String {
    let mut out = String::new();
    let mut pending_newline = false;
    let mut last_char: Option<char> = None;

    for &leaf in leaves {
        let kind = tree.kind(leaf);
        if kind == NodeKind::WhiteSpace {
            continue;
        }
        let text = tree.text(leaf);
        let Some(first) = text.chars().next() else {
            continue;
        };

        let batch = tree.parent_kind(leaf) == Some(NodeKind::BatchSeparator);
        if (pending_newline || batch) && !out.is_empty() {
            out.push('\n');
        } else if let Some(prev) = last_char {
            if needs_separator(prev, first) {
                out.push(' ');
            }
        }
        pending_newline = false;

        if html {
            out.push_str(&html_escape(text));
        } else {
            out.push_str(text);
        }

        if batch
            || matches!(
                kind,
                NodeKind::CommentSingleLine | NodeKind::CommentSingleLineCstyle
            )
        {
            pending_newline = true;
        }
        last_char = text.chars().last();
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$') || !c.is_ascii()
}

/// Whether two adjacent characters would change the token boundaries that
/// the tokenizer recovers.
fn needs_separator(prev: char, next: char) -> bool {
    if is_word_char(prev) && is_word_char(next) {
        return true;
    }
    match (prev, next) {
        ('-', '-') | ('/', '*') | ('/', '/') | ('*', '/') => true,
        ('<', '>') | ('<', '=') | ('>', '=') => true,
        ('!', '=') | ('!', '<') | ('!', '>') => true,
        ('+' | '-' | '*' | '/' | '%' | '&' | '|' | '^', '=') => true,
        ('\'', '\'') | ('"', '"') => true,
        ('N' | 'n', '\'') => true,
        ('.', d) if d.is_ascii_digit() => true,
        _ => false,
    }
}
