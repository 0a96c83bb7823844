//! Tree renderers.
//!
//! Three renderers share the parse tree: `standard` is the configurable
//! pretty-printer, `identity` reproduces the parsed input byte for byte,
//! and `obfuscate` strips whitespace down to what re-tokenization needs.
//! All of them are read-only over the tree and build fresh state per call,
//! so a tree can be rendered repeatedly and concurrently.

pub mod identity;
pub mod obfuscate;
pub mod standard;

use crate::error::Result;
use crate::options::{FormatOptions, FormatterKind};
use crate::tree::SqlTree;

// HTML class names used when html_coloring is on.
pub(crate) const CLASS_KEYWORD: &str = "SQLKeyword";
pub(crate) const CLASS_FUNCTION: &str = "SQLFunction";
pub(crate) const CLASS_OPERATOR: &str = "SQLOperator";
pub(crate) const CLASS_STRING: &str = "SQLString";
pub(crate) const CLASS_COMMENT: &str = "SQLComment";
pub(crate) const CLASS_ERROR: &str = "SQLErrorHighlight";

/// Render a parse tree with the selected formatter.
pub fn format_tree(
    tree: &SqlTree,
    formatter: FormatterKind,
    options: &FormatOptions,
) -> Result<String> {
    match formatter {
        FormatterKind::Standard => standard::format(tree, options),
        FormatterKind::Identity => Ok(identity::format(tree, options.html_coloring)),
        FormatterKind::Obfuscating => Ok(obfuscate::format(tree, options.html_coloring)),
    }
}

pub(crate) fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::tokenize;

    #[test]
    fn test_dispatch_identity_is_lossless() {
        let sql = "SELECT a,b  FROM t -- tail";
        let tree = parse(&tokenize(sql));
        let out = format_tree(&tree, FormatterKind::Identity, &FormatOptions::default()).unwrap();
        assert_eq!(out, sql);
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a < b & c"), "a &lt; b &amp; c");
    }
}
