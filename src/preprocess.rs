//! Structural rewrite passes applied between parsing and formatting.
//!
//! A fixed, ordered sequence of whole-tree transforms. Each pass leaves the
//! tree internally consistent and preserves the text of every node it does
//! not explicitly introduce or rewrite. Later passes may rely on earlier
//! ones (IF bracing runs before join checks see the synthesized blocks).

use crate::tree::{NodeId, NodeKind, SqlTree, ROOT};

pub const RIGHT_OUTER_JOIN_WARNING: &str = "-- WARNING! Right Outer Join Not Permitted";

/// Run every pass, in order.
pub fn preprocess(tree: &mut SqlTree) {
    brace_top_clauses(tree);
    brace_single_statement_bodies(tree);
    canonicalize_inequality(tree);
    order_join_predicates(tree);
    enforce_transaction_isolation(tree);
}

fn collect_by<F: Fn(&SqlTree, NodeId) -> bool>(tree: &SqlTree, pred: F) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![ROOT];
    while let Some(node) = stack.pop() {
        if pred(tree, node) {
            out.push(node);
        }
        for &child in tree.children(node).iter().rev() {
            stack.push(child);
        }
    }
    out
}

fn is_significant(tree: &SqlTree, node: NodeId) -> bool {
    !tree.kind(node).is_whitespace_or_comment()
}

fn upper_text(tree: &SqlTree, node: NodeId) -> String {
    match tree.simple_text(node) {
        Some(simple) => simple.to_string(),
        None => tree.text(node).to_ascii_uppercase(),
    }
}

/// Pass 1: a bare numeric TOP argument becomes a parenthesized expression,
/// so `TOP 10` and `TOP (10)` format identically.
fn brace_top_clauses(tree: &mut SqlTree) {
    let tops = collect_by(tree, |t, n| {
        t.kind(n) == NodeKind::OtherKeyword
            && t.parent_kind(n) == Some(NodeKind::SqlClause)
            && upper_text(t, n) == "TOP"
    });
    for top in tops {
        let mut sibling = tree.next_sibling(top);
        while let Some(s) = sibling {
            match tree.kind(s) {
                NodeKind::ExpressionParens => break,
                NodeKind::NumberValue => {
                    let parent = tree.parent(s).unwrap_or(ROOT);
                    let index = tree
                        .children(parent)
                        .iter()
                        .position(|&c| c == s)
                        .unwrap_or(0);
                    tree.detach(s);
                    let parens = tree.new_node(NodeKind::ExpressionParens, "");
                    tree.insert_child_at(parent, index, parens);
                    tree.add_child(parens, NodeKind::OpenParens, "(");
                    tree.append(parens, s);
                    tree.add_child(parens, NodeKind::CloseParens, ")");
                    break;
                }
                _ if is_significant(tree, s) => break,
                _ => sibling = tree.next_sibling(s),
            }
        }
    }
}

/// Pass 2: an IF/ELSE branch holding a single bare statement is wrapped in
/// a synthesized BEGIN/END block, so downstream stages see one body shape.
fn brace_single_statement_bodies(tree: &mut SqlTree) {
    let bodies = collect_by(tree, |t, n| {
        t.kind(n) == NodeKind::ContainerSingleStatement
            && matches!(
                t.parent_kind(n),
                Some(NodeKind::IfStatement) | Some(NodeKind::ElseClause)
            )
    });
    for body in bodies {
        let Some(stmt) = tree.child_by_kind(body, NodeKind::SqlStatement) else {
            continue;
        };
        let Some(clause) = tree.child_by_kind(stmt, NodeKind::SqlClause) else {
            continue;
        };
        if tree.child_by_kind(clause, NodeKind::BeginEndBlock).is_some() {
            continue;
        }
        // An ELSE whose sole statement is another IF is a chain link; the
        // nested IF keeps the ELSE's line and braces its own bodies.
        if tree.parent_kind(body) == Some(NodeKind::ElseClause)
            && tree.child_by_kind(clause, NodeKind::IfStatement).is_some()
        {
            continue;
        }

        let new_stmt = tree.new_node(NodeKind::SqlStatement, "");
        tree.insert_before(stmt, new_stmt);
        tree.detach(stmt);

        let new_clause = tree.add_child(new_stmt, NodeKind::SqlClause, "");
        let block = tree.add_child(new_clause, NodeKind::BeginEndBlock, "");
        let open = tree.add_child(block, NodeKind::ContainerOpen, "");
        tree.add_child(open, NodeKind::OtherKeyword, "BEGIN");
        let multi = tree.add_child(block, NodeKind::ContainerMultiStatement, "");
        tree.append(multi, stmt);
        let close = tree.add_child(block, NodeKind::ContainerClose, "");
        tree.add_child(close, NodeKind::OtherKeyword, "END");
    }
}

/// Pass 3: `<>` becomes `!=`.
fn canonicalize_inequality(tree: &mut SqlTree) {
    let operators = collect_by(tree, |t, n| {
        t.kind(n) == NodeKind::OtherOperator && t.text(n) == "<>"
    });
    for op in operators {
        tree.set_text(op, "!=");
    }
}

/// Pass 4: inner-join ON predicates are reordered so the enclosing table's
/// alias comes first; right outer joins get a warning comment instead.
fn order_join_predicates(tree: &mut SqlTree) {
    let join_clauses = collect_by(tree, |t, n| {
        t.kind(n) == NodeKind::SqlClause
            && t.child_by_kind(n, NodeKind::JoinOnSection).is_some()
    });
    for clause in join_clauses {
        let Some(join_kw) = tree
            .children(clause)
            .iter()
            .copied()
            .find(|&c| is_significant(tree, c))
        else {
            continue;
        };
        let join_type = upper_text(tree, join_kw);

        if join_type.starts_with("RIGHT") {
            let comment = tree.new_node(NodeKind::CommentSingleLine, RIGHT_OUTER_JOIN_WARNING);
            tree.insert_before(join_kw, comment);
            let newline = tree.new_node(NodeKind::WhiteSpace, "\n");
            tree.insert_before(join_kw, newline);
            continue;
        }
        if !join_type.starts_with("INNER") && join_type != "JOIN" {
            // LEFT and FULL outer joins are left alone.
            continue;
        }

        let Some(alias) = enclosing_alias(tree, clause) else {
            continue;
        };
        let Some(on_section) = tree.child_by_kind(clause, NodeKind::JoinOnSection) else {
            continue;
        };
        reorder_equality_operands(tree, on_section, &alias);
    }
}

/// The alias of the table the join attaches to: taken from the nearest
/// preceding clause, preferring the name after AS, falling back to the last
/// bare name.
fn enclosing_alias(tree: &SqlTree, join_clause: NodeId) -> Option<String> {
    let mut prev = tree.prev_sibling(join_clause);
    while let Some(p) = prev {
        if tree.kind(p) == NodeKind::SqlClause {
            break;
        }
        prev = tree.prev_sibling(p);
    }
    let source = prev?;

    let children: Vec<NodeId> = tree.children(source).to_vec();
    let mut after_as = false;
    let mut last_name = None;
    for child in children {
        match tree.kind(child) {
            NodeKind::OtherKeyword if upper_text(tree, child) == "AS" => after_as = true,
            NodeKind::OtherNode | NodeKind::BracketQuotedName => {
                last_name = Some(tree.text(child).to_string());
                if after_as {
                    break;
                }
            }
            _ => {}
        }
    }
    last_name
}

/// Within one `a.x = b.y` equality, swap the two name pairs when the left
/// pair does not start with the enclosing alias. Operates on each equality
/// found in the ON section, scanning flat children.
fn reorder_equality_operands(tree: &mut SqlTree, on_section: NodeId, alias: &str) {
    let children: Vec<NodeId> = tree.children(on_section).to_vec();
    let mut first: Vec<NodeId> = Vec::new();
    let mut second: Vec<NodeId> = Vec::new();
    let mut seen_equals = false;

    let mut flush = |tree: &mut SqlTree, first: &mut Vec<NodeId>, second: &mut Vec<NodeId>| {
        if first.len() == 2 && second.len() == 2 && tree.text(first[0]) != alias {
            for i in 0..2 {
                let a = tree.text(first[i]).to_string();
                let b = tree.text(second[i]).to_string();
                tree.set_text(first[i], &b);
                tree.set_text(second[i], &a);
            }
        }
        first.clear();
        second.clear();
    };

    for child in children {
        match tree.kind(child) {
            NodeKind::OtherNode | NodeKind::BracketQuotedName => {
                if seen_equals {
                    second.push(child);
                } else {
                    first.push(child);
                }
            }
            NodeKind::EqualsSign => seen_equals = true,
            NodeKind::AndOperator | NodeKind::OrOperator => {
                if seen_equals {
                    flush(tree, &mut first, &mut second);
                    seen_equals = false;
                }
            }
            _ => {
                if seen_equals && second.len() >= 2 {
                    flush(tree, &mut first, &mut second);
                    seen_equals = false;
                }
            }
        }
    }
    if seen_equals {
        flush(tree, &mut first, &mut second);
    }
}

/// Pass 5: a procedural body with statements but no `SET TRANSACTION
/// ISOLATION LEVEL READ UNCOMMITTED` gets one synthesized as its first
/// statement.
fn enforce_transaction_isolation(tree: &mut SqlTree) {
    let blocks = collect_by(tree, |t, n| t.kind(n) == NodeKind::DdlProceduralBlock);
    for block in blocks {
        let Some(as_block) = tree.child_by_kind(block, NodeKind::DdlAsBlock) else {
            continue;
        };
        let Some(body) = tree.child_by_kind(as_block, NodeKind::ContainerGeneralContent) else {
            continue;
        };
        let statements = tree.children_by_kind(body, NodeKind::SqlStatement);
        if statements.is_empty() {
            continue;
        }
        if statements.iter().any(|&s| is_isolation_statement(tree, s)) {
            continue;
        }

        let stmt = tree.new_node(NodeKind::SqlStatement, "");
        // After any leading trivia, so leaf concatenation keeps the body's
        // original spacing around the synthesized statement.
        let at = tree
            .children(body)
            .iter()
            .position(|&c| !tree.kind(c).is_whitespace_or_comment())
            .unwrap_or(0);
        tree.insert_child_at(body, at, stmt);
        let clause = tree.add_child(stmt, NodeKind::SqlClause, "");
        for (i, word) in ["SET", "TRANSACTION", "ISOLATION", "LEVEL", "READ", "UNCOMMITTED"]
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                tree.add_child(clause, NodeKind::WhiteSpace, " ");
            }
            tree.add_child(clause, NodeKind::OtherKeyword, word);
        }
        tree.add_child(clause, NodeKind::Semicolon, ";");
        tree.add_child(clause, NodeKind::WhiteSpace, " ");
    }
}

fn is_isolation_statement(tree: &SqlTree, stmt: NodeId) -> bool {
    for clause in tree.children_by_kind(stmt, NodeKind::SqlClause) {
        let mut count = 0;
        for &child in tree.children(clause) {
            if matches!(
                upper_text(tree, child).as_str(),
                "SET" | "TRANSACTION" | "ISOLATION" | "LEVEL" | "READ" | "UNCOMMITTED"
            ) {
                count += 1;
            }
            if count == 6 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::tokenize;

    fn preprocessed(sql: &str) -> SqlTree {
        let mut tree = parse(&tokenize(sql));
        preprocess(&mut tree);
        tree
    }

    #[test]
    fn test_top_number_wrapped() {
        let tree = preprocessed("SELECT TOP 10 a FROM t");
        assert_eq!(tree.subtree_text(ROOT), "SELECT TOP (10) a FROM t");
    }

    #[test]
    fn test_top_already_parenthesized_untouched() {
        let tree = preprocessed("SELECT TOP (10) a FROM t");
        assert_eq!(tree.subtree_text(ROOT), "SELECT TOP (10) a FROM t");
    }

    #[test]
    fn test_if_body_gets_begin_end() {
        let tree = preprocessed("IF @x = 1 SELECT 1");
        let text = tree.subtree_text(ROOT);
        assert!(text.contains("BEGIN"), "got: {text}");
        assert!(text.ends_with("END"), "got: {text}");

        let stmt = tree.children_by_kind(ROOT, NodeKind::SqlStatement)[0];
        let clause = tree.child_by_kind(stmt, NodeKind::SqlClause).unwrap();
        let if_node = tree.child_by_kind(clause, NodeKind::IfStatement).unwrap();
        let body = tree
            .child_by_kind(if_node, NodeKind::ContainerSingleStatement)
            .unwrap();
        let body_stmt = tree.child_by_kind(body, NodeKind::SqlStatement).unwrap();
        let body_clause = tree.child_by_kind(body_stmt, NodeKind::SqlClause).unwrap();
        assert!(tree
            .child_by_kind(body_clause, NodeKind::BeginEndBlock)
            .is_some());
    }

    #[test]
    fn test_if_body_with_existing_block_untouched() {
        let sql = "IF @x = 1 BEGIN SELECT 1 END";
        let tree = preprocessed(sql);
        assert_eq!(tree.subtree_text(ROOT), sql);
    }

    #[test]
    fn test_else_body_gets_begin_end() {
        let tree = preprocessed("IF @x = 1 SELECT 1 ELSE SELECT 2");
        let text = tree.subtree_text(ROOT);
        assert_eq!(text.matches("BEGIN").count(), 2);
        assert_eq!(text.matches("END").count(), 2);
    }

    #[test]
    fn test_else_if_chain_not_braced() {
        let tree = preprocessed("IF @x = 1 SELECT 1 ELSE IF @x = 2 SELECT 2");
        let stmt = tree.children_by_kind(ROOT, NodeKind::SqlStatement)[0];
        let clause = tree.child_by_kind(stmt, NodeKind::SqlClause).unwrap();
        let if_node = tree.child_by_kind(clause, NodeKind::IfStatement).unwrap();
        let else_clause = tree.child_by_kind(if_node, NodeKind::ElseClause).unwrap();
        let body = tree
            .child_by_kind(else_clause, NodeKind::ContainerSingleStatement)
            .unwrap();
        let body_stmt = tree.child_by_kind(body, NodeKind::SqlStatement).unwrap();
        let body_clause = tree.child_by_kind(body_stmt, NodeKind::SqlClause).unwrap();
        // The chained IF is not wrapped; its own body is.
        let nested = tree.child_by_kind(body_clause, NodeKind::IfStatement);
        assert!(nested.is_some());
        assert!(tree
            .child_by_kind(body_clause, NodeKind::BeginEndBlock)
            .is_none());
        let nested_body = tree
            .child_by_kind(nested.unwrap(), NodeKind::ContainerSingleStatement)
            .unwrap();
        let nested_stmt = tree.child_by_kind(nested_body, NodeKind::SqlStatement).unwrap();
        let nested_clause = tree.child_by_kind(nested_stmt, NodeKind::SqlClause).unwrap();
        assert!(tree
            .child_by_kind(nested_clause, NodeKind::BeginEndBlock)
            .is_some());
    }

    #[test]
    fn test_inequality_canonicalized() {
        let tree = preprocessed("SELECT a FROM t WHERE x <> 1");
        assert_eq!(tree.subtree_text(ROOT), "SELECT a FROM t WHERE x != 1");
    }

    #[test]
    fn test_string_containing_inequality_untouched() {
        let sql = "SELECT '<>' FROM t";
        let tree = preprocessed(sql);
        assert_eq!(tree.subtree_text(ROOT), sql);
    }

    #[test]
    fn test_inner_join_operands_swapped() {
        let tree = preprocessed("SELECT * FROM x AS A INNER JOIN y AS B ON B.id = A.id");
        assert_eq!(
            tree.subtree_text(ROOT),
            "SELECT * FROM x AS A INNER JOIN y AS B ON A.id = B.id"
        );
    }

    #[test]
    fn test_inner_join_already_ordered_untouched() {
        let sql = "SELECT * FROM x AS A INNER JOIN y AS B ON A.id = B.id";
        let tree = preprocessed(sql);
        assert_eq!(tree.subtree_text(ROOT), sql);
    }

    #[test]
    fn test_left_outer_join_untouched() {
        let sql = "SELECT * FROM x AS A LEFT OUTER JOIN y AS B ON B.id = A.id";
        let tree = preprocessed(sql);
        assert_eq!(tree.subtree_text(ROOT), sql);
    }

    #[test]
    fn test_right_outer_join_warned_not_swapped() {
        let tree = preprocessed("SELECT * FROM x AS A RIGHT OUTER JOIN y AS B ON B.id = A.id");
        let text = tree.subtree_text(ROOT);
        assert!(text.contains(RIGHT_OUTER_JOIN_WARNING));
        assert!(text.contains("ON B.id = A.id"));
    }

    #[test]
    fn test_isolation_statement_inserted() {
        let tree = preprocessed("CREATE PROCEDURE dbo.p AS SELECT 1");
        let text = tree.subtree_text(ROOT);
        assert!(text.contains("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED;"));
        // The synthesized leaves carry their own spacing, so plain leaf
        // concatenation never runs words together.
        assert!(!text.contains("ASSET"));
        assert!(!text.contains("UNCOMMITTED;SELECT"));
    }

    #[test]
    fn test_isolation_statement_not_duplicated() {
        let sql = "CREATE PROCEDURE dbo.p AS SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED; SELECT 1";
        let tree = preprocessed(sql);
        let text = tree.subtree_text(ROOT);
        assert_eq!(text.matches("UNCOMMITTED").count(), 1);
    }

    #[test]
    fn test_non_procedural_ddl_untouched() {
        let sql = "CREATE TABLE t (id INT)";
        let tree = preprocessed(sql);
        assert!(!tree.subtree_text(ROOT).contains("UNCOMMITTED"));
    }
}
