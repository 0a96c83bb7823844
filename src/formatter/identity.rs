//! Byte-for-byte renderer.
//!
//! Every leaf stores the raw source slice it was built from, so identity
//! formatting is nothing more than leaf concatenation in document order.
//! With HTML coloring on, each leaf additionally gets a class-tagged span.

use crate::formatter::{
    html_escape, CLASS_COMMENT, CLASS_FUNCTION, CLASS_KEYWORD, CLASS_OPERATOR, CLASS_STRING,
};
use crate::tree::{NodeId, NodeKind, SqlTree};

pub fn format(tree: &SqlTree, html: bool) -> String {
    render_leaves(tree, &tree.leaves(tree.root()), html)
}

/// Render an explicit leaf list. The standard formatter uses this to splice
/// `[noformat]` regions into otherwise formatted output.
pub(crate) fn render_leaves(tree: &SqlTree, leaves: &[NodeId], html: bool) -> String {
    let mut out = String::new();
    for &leaf in leaves {
        let text = tree.text(leaf);
        if !html {
            out.push_str(text);
            continue;
        }
        match leaf_class(tree.kind(leaf)) {
            Some(class) => {
                out.push_str("<span class=\"");
                out.push_str(class);
                out.push_str("\">");
                out.push_str(&html_escape(text));
                out.push_str("</span>");
            }
            None => out.push_str(&html_escape(text)),
        }
    }
    out
}

fn leaf_class(kind: NodeKind) -> Option<&'static str> {
    match kind {
        NodeKind::CompoundKeyword
        | NodeKind::OtherKeyword
        | NodeKind::DataTypeKeyword
        | NodeKind::PseudoName => Some(CLASS_KEYWORD),
        NodeKind::FunctionKeyword => Some(CLASS_FUNCTION),
        NodeKind::StringLiteral | NodeKind::NStringLiteral => Some(CLASS_STRING),
        NodeKind::CommentSingleLine
        | NodeKind::CommentSingleLineCstyle
        | NodeKind::CommentMultiLine => Some(CLASS_COMMENT),
        NodeKind::OpenParens
        | NodeKind::CloseParens
        | NodeKind::Comma
        | NodeKind::Period
        | NodeKind::Semicolon
        | NodeKind::EqualsSign
        | NodeKind::Asterisk
        | NodeKind::OtherOperator
        | NodeKind::ScopeResolutionOperator => Some(CLASS_OPERATOR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::tokenize;

    fn identity(sql: &str) -> String {
        format(&parse(&tokenize(sql)), false)
    }

    #[test]
    fn test_exact_reproduction() {
        for sql in [
            "SELECT a,  b\n\tFROM [my table] WHERE x = 'it''s'",
            "IF @x=1 BEGIN SELECT 1 END ELSE SELECT 2",
            "-- comment only",
            "SELECT 1\nGO 3\nSELECT 2",
        ] {
            assert_eq!(identity(sql), sql);
        }
    }

    #[test]
    fn test_reproduction_of_broken_input() {
        for sql in ["SELECT 'unclosed", "SELECT (1 + 2", "END END END"] {
            assert_eq!(identity(sql), sql);
        }
    }

    #[test]
    fn test_html_wraps_keywords() {
        let out = format(&parse(&tokenize("SELECT 1")), true);
        assert!(out.contains("<span class=\"SQLKeyword\">SELECT</span>"));
        assert!(out.contains('1'));
    }
}
