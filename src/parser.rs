//! Token stream to lossless tree.
//!
//! The parser walks the token sequence once, maintaining a cursor into the
//! tree (the current container node). Structure keywords open and close
//! containers; every other token, whitespace and comments included, is
//! attached to the cursor as a leaf. Nothing is ever dropped and nothing
//! aborts: input the parser cannot classify is attached as-is and tagged
//! with the error flag.

use compact_str::CompactString;

use crate::keywords;
use crate::token::{Token, TokenKind};
use crate::tree::{NodeId, NodeKind, SqlTree, ROOT};

/// Build a tree whose leaves are exactly the given tokens, in order.
pub fn parse(tokens: &[Token]) -> SqlTree {
    let mut parser = Parser {
        tokens,
        index: 0,
        tree: SqlTree::new(),
        current: ROOT,
        cte_alias_pending: false,
    };
    parser.run();
    parser.tree
}

fn is_parens(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::ExpressionParens
            | NodeKind::FunctionParens
            | NodeKind::InParens
            | NodeKind::DdlParens
            | NodeKind::DdlDetailParens
            | NodeKind::SelectionTargetParens
    )
}

/// Containers whose direct children are whole statements.
fn is_statement_holder(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Root
            | NodeKind::ContainerMultiStatement
            | NodeKind::ContainerSingleStatement
            | NodeKind::ContainerGeneralContent
            | NodeKind::CursorForBlock
            | NodeKind::MergeAction
    )
}

fn is_join_keyword(upper: &str) -> bool {
    matches!(
        upper,
        "JOIN"
            | "INNER JOIN"
            | "LEFT JOIN"
            | "RIGHT JOIN"
            | "FULL JOIN"
            | "LEFT OUTER JOIN"
            | "RIGHT OUTER JOIN"
            | "FULL OUTER JOIN"
            | "CROSS JOIN"
            | "CROSS APPLY"
            | "OUTER APPLY"
    )
}

fn is_set_operator(upper: &str) -> bool {
    matches!(upper, "UNION" | "UNION ALL" | "EXCEPT" | "INTERSECT")
}

fn is_clause_starter(upper: &str) -> bool {
    matches!(
        upper,
        "FROM"
            | "WHERE"
            | "GROUP BY"
            | "ORDER BY"
            | "HAVING"
            | "VALUES"
            | "OUTPUT"
            | "OPTION"
            | "INTO"
    ) || is_join_keyword(upper)
        || is_set_operator(upper)
}

fn is_statement_starter(upper: &str) -> bool {
    matches!(
        upper,
        "SELECT"
            | "INSERT"
            | "INSERT INTO"
            | "UPDATE"
            | "DELETE"
            | "DELETE FROM"
            | "CREATE"
            | "ALTER"
            | "DROP"
            | "TRUNCATE"
            | "DECLARE"
            | "SET"
            | "PRINT"
            | "EXEC"
            | "EXECUTE"
            | "IF"
            | "WHILE"
            | "RETURN"
            | "USE"
            | "GRANT"
            | "DENY"
            | "REVOKE"
            | "MERGE"
            | "COMMIT"
            | "ROLLBACK"
            | "SAVE"
            | "OPEN"
            | "CLOSE"
            | "FETCH"
            | "DEALLOCATE"
            | "RAISERROR"
            | "WAITFOR"
            | "GOTO"
            | "BREAK"
            | "CONTINUE"
            | "BEGIN"
            | "BEGIN TRY"
            | "BEGIN CATCH"
            | "KILL"
            | "CHECKPOINT"
            | "DBCC"
            | "BACKUP"
            | "RESTORE"
            | "BULK"
    )
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    tree: SqlTree,
    current: NodeId,
    /// Inside a CTE header, the next bare name is the CTE alias.
    cte_alias_pending: bool,
}

impl<'a> Parser<'a> {
    fn run(&mut self) {
        while self.index < self.tokens.len() {
            let token = &self.tokens[self.index];
            self.dispatch(token);
            self.index += 1;
        }
        self.tag_unclosed();
    }

    fn dispatch(&mut self, token: &'a Token) {
        match token.kind {
            TokenKind::WhiteSpace => {
                self.add_leaf(NodeKind::WhiteSpace, token);
            }
            TokenKind::SingleLineComment
            | TokenKind::SingleLineCommentCstyle
            | TokenKind::MultiLineComment => {
                let id = self.add_leaf(NodeKind::for_token(token), token);
                if token.kind == TokenKind::MultiLineComment
                    && !block_comment_is_terminated(&token.text)
                {
                    self.tree.tag_error(id);
                }
            }
            TokenKind::BatchSeparator => self.handle_batch_separator(token),
            TokenKind::Semicolon => self.handle_semicolon(token),
            TokenKind::OpenParens => self.handle_open_parens(token),
            TokenKind::CloseParens => self.handle_close_parens(token),
            TokenKind::Keyword | TokenKind::CompoundKeyword => self.handle_keyword(token),
            TokenKind::Comma => {
                self.escape_partial_containers();
                if self.nearest_in_expression(NodeKind::CteWithClause).is_some() {
                    self.escape_cte_body();
                    self.cte_alias_pending = true;
                }
                self.ensure_content_context();
                self.add_leaf(NodeKind::Comma, token);
            }
            TokenKind::String | TokenKind::NString => {
                self.ensure_content_context();
                let kind = NodeKind::for_token(token);
                let skip = if token.kind == TokenKind::NString { 1 } else { 0 };
                let id = self.add_leaf(kind, token);
                if !quoted_is_terminated(&token.text, skip, b'\'') {
                    self.tree.tag_error(id);
                }
            }
            TokenKind::QuotedString => {
                self.ensure_content_context();
                let id = self.add_leaf(NodeKind::QuotedString, token);
                if !quoted_is_terminated(&token.text, 0, b'"') {
                    self.tree.tag_error(id);
                }
            }
            TokenKind::BracketQuotedName => {
                self.ensure_content_context();
                let id = self.handle_name(token, NodeKind::BracketQuotedName);
                if !bracket_is_terminated(&token.text) {
                    self.tree.tag_error(id);
                }
            }
            TokenKind::Other => {
                self.ensure_content_context();
                self.handle_name(token, NodeKind::OtherNode);
            }
            _ => {
                self.ensure_content_context();
                self.add_leaf(NodeKind::for_token(token), token);
            }
        }
    }

    // --- attachment primitives ---

    fn add_leaf(&mut self, kind: NodeKind, token: &Token) -> NodeId {
        self.tree.add_token(self.current, kind, token)
    }

    fn open(&mut self, kind: NodeKind) -> NodeId {
        let id = self.tree.add_child(self.current, kind, "");
        self.current = id;
        id
    }

    /// Make sure plain content has a statement and clause to live in.
    fn ensure_content_context(&mut self) {
        if is_statement_holder(self.tree.kind(self.current)) {
            self.begin_statement();
        }
    }

    fn begin_statement(&mut self) {
        let holder = self.statement_holder();
        let stmt = self.tree.add_child(holder, NodeKind::SqlStatement, "");
        let clause = self.tree.add_child(stmt, NodeKind::SqlClause, "");
        self.current = clause;
    }

    /// Nearest ancestor (inclusive) whose children are statements.
    fn statement_holder(&self) -> NodeId {
        let mut node = self.current;
        loop {
            if is_statement_holder(self.tree.kind(node)) {
                return node;
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                None => return ROOT,
            }
        }
    }

    fn current_statement(&self) -> Option<NodeId> {
        self.tree.ancestor_of_kind(self.current, NodeKind::SqlStatement)
    }

    /// Close the current statement. Single-statement containers close with
    /// it, which also completes the construct (IF body, cursor FOR query,
    /// merge action) that owns them.
    fn end_statement(&mut self) {
        self.escape_partial_containers();
        self.cte_alias_pending = false;
        let Some(stmt) = self.current_statement() else {
            self.current = self.statement_holder();
            return;
        };
        let mut holder = self.tree.parent(stmt).unwrap_or(ROOT);
        while matches!(
            self.tree.kind(holder),
            NodeKind::ContainerSingleStatement | NodeKind::CursorForBlock | NodeKind::MergeAction
        ) {
            let above = self.tree.parent(holder).unwrap_or(ROOT);
            match self.tree.ancestor_of_kind(above, NodeKind::SqlStatement) {
                Some(outer) => holder = self.tree.parent(outer).unwrap_or(ROOT),
                None => {
                    holder = ROOT;
                    break;
                }
            }
        }
        self.current = holder;
    }

    /// Pop out of expression fragments that close implicitly: BETWEEN
    /// bounds and name-run targets.
    fn escape_partial_containers(&mut self) {
        loop {
            match self.tree.kind(self.current) {
                NodeKind::BetweenLowerBound | NodeKind::BetweenUpperBound => {
                    let between = self.tree.parent(self.current).unwrap_or(ROOT);
                    self.current = self.tree.parent(between).unwrap_or(ROOT);
                }
                NodeKind::SelectionTarget | NodeKind::CteAlias => {
                    self.current = self.tree.parent(self.current).unwrap_or(ROOT);
                }
                _ => return,
            }
        }
    }

    /// Nearest ancestor of `kind`, without crossing a parens container or a
    /// statement boundary. Used for expression-level structure (CASE,
    /// BETWEEN, CTE headers) that cannot span those.
    fn nearest_in_expression(&self, kind: NodeKind) -> Option<NodeId> {
        let mut node = self.current;
        loop {
            let k = self.tree.kind(node);
            if k == kind {
                return Some(node);
            }
            if is_parens(k) || k == NodeKind::SqlStatement || is_statement_holder(k) {
                return None;
            }
            node = self.tree.parent(node)?;
        }
    }

    /// Nearest ancestor satisfying `pred`, searched all the way up.
    fn nearest_any(&self, pred: impl Fn(NodeKind) -> bool) -> Option<NodeId> {
        let mut node = self.current;
        loop {
            if pred(self.tree.kind(node)) {
                return Some(node);
            }
            node = self.tree.parent(node)?;
        }
    }

    /// Where a new clause would attach: the enclosing statement, or the
    /// enclosing parens container for subqueries.
    fn clause_holder(&self) -> NodeId {
        let mut node = self.current;
        loop {
            let kind = self.tree.kind(node);
            if kind == NodeKind::SqlStatement || is_parens(kind) || is_statement_holder(kind) {
                return node;
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                None => return ROOT,
            }
        }
    }

    fn start_new_clause(&mut self) -> NodeId {
        self.escape_partial_containers();
        let holder = self.clause_holder();
        if is_statement_holder(self.tree.kind(holder)) {
            self.current = holder;
            self.begin_statement();
            return self.current;
        }
        let clause = self.tree.add_child(holder, NodeKind::SqlClause, "");
        self.current = clause;
        clause
    }

    // --- lookahead ---

    fn peek_significant(&self) -> Option<&'a Token> {
        self.tokens[self.index + 1..]
            .iter()
            .find(|t| !t.kind.is_whitespace_or_comment())
    }

    fn prev_significant_token(&self) -> Option<&'a Token> {
        self.tokens[..self.index]
            .iter()
            .rev()
            .find(|t| !t.kind.is_whitespace_or_comment())
    }

    // --- parens ---

    fn handle_open_parens(&mut self, token: &Token) {
        self.ensure_content_context();

        // INSERT column lists and CTE headers take the DDL-detail shape.
        if self.tree.kind(self.current) == NodeKind::SelectionTarget {
            self.escape_partial_containers();
            let open = self.open(NodeKind::DdlDetailParens);
            self.tree.add_token(open, NodeKind::OpenParens, token);
            return;
        }
        let in_cte_header = matches!(
            self.tree.kind(self.current),
            NodeKind::CteWithClause | NodeKind::CteAlias
        );
        self.escape_partial_containers();

        let kind = if in_cte_header {
            NodeKind::DdlDetailParens
        } else {
            self.classify_parens()
        };
        let open = self.open(kind);
        self.tree.add_token(open, NodeKind::OpenParens, token);
    }

    fn classify_parens(&self) -> NodeKind {
        let Some(prev) = self.prev_significant_token() else {
            return NodeKind::ExpressionParens;
        };
        match prev.kind {
            // A name directly before the parens makes it an argument list,
            // except in a DDL header where it is the defined object's
            // column or parameter list.
            TokenKind::Other | TokenKind::BracketQuotedName => {
                if self.in_ddl_header() {
                    NodeKind::DdlParens
                } else {
                    NodeKind::FunctionParens
                }
            }
            TokenKind::Keyword | TokenKind::CompoundKeyword => {
                let upper = prev.keyword_text();
                if upper == "IN" || upper == "NOT IN" {
                    NodeKind::InParens
                } else if upper == "TABLE" || upper == "VALUES" {
                    // Column definition lists and constructed row lists.
                    NodeKind::DdlParens
                } else if keywords::is_data_type(&upper) {
                    // Type size arguments stay on the type's line.
                    NodeKind::DdlDetailParens
                } else if keywords::is_function_keyword(&upper) {
                    NodeKind::FunctionParens
                } else if upper == "FROM" || upper == "USING" || is_join_keyword(&upper) {
                    NodeKind::SelectionTargetParens
                } else if self
                    .nearest_any(|k| {
                        matches!(k, NodeKind::DdlProceduralBlock | NodeKind::DdlOtherBlock)
                    })
                    .is_some()
                {
                    NodeKind::DdlParens
                } else {
                    NodeKind::ExpressionParens
                }
            }
            _ => NodeKind::ExpressionParens,
        }
    }

    fn handle_close_parens(&mut self, token: &Token) {
        // Pop to the innermost open parens within this statement.
        let mut node = self.current;
        let target = loop {
            let kind = self.tree.kind(node);
            if is_parens(kind) {
                break Some(node);
            }
            if kind == NodeKind::SqlStatement || is_statement_holder(kind) {
                break None;
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                None => break None,
            }
        };
        match target {
            Some(parens) => {
                self.tree.add_token(parens, NodeKind::CloseParens, token);
                self.current = self.tree.parent(parens).unwrap_or(ROOT);
                self.escape_partial_containers();
            }
            None => {
                self.ensure_content_context();
                let id = self.add_leaf(NodeKind::CloseParens, token);
                self.tree.tag_error(id);
            }
        }
    }

    // --- statement boundaries ---

    fn handle_batch_separator(&mut self, token: &Token) {
        self.tag_unclosed();
        self.current = ROOT;
        let sep = self.tree.add_child(ROOT, NodeKind::BatchSeparator, "");
        self.tree.add_token(sep, NodeKind::OtherKeyword, token);
    }

    fn handle_semicolon(&mut self, token: &Token) {
        self.escape_partial_containers();
        if self.current_statement().is_some() {
            // Attach at the cursor so the terminator stays inline with the
            // content it follows, then close the statement.
            self.add_leaf(NodeKind::Semicolon, token);
            self.end_statement();
            return;
        }
        // The statement already closed itself (END, for instance). If it is
        // still the newest child here, the terminator belongs inside it.
        let holder = self.current;
        if let Some(&last) = self.tree.children(holder).last() {
            if self.tree.kind(last) == NodeKind::SqlStatement {
                if let Some(clause) = self
                    .tree
                    .children(last)
                    .iter()
                    .rev()
                    .copied()
                    .find(|&c| self.tree.kind(c) == NodeKind::SqlClause)
                {
                    self.tree.add_token(clause, NodeKind::Semicolon, token);
                    return;
                }
            }
        }
        self.add_leaf(NodeKind::Semicolon, token);
    }

    // --- names ---

    fn handle_name(&mut self, token: &Token, kind: NodeKind) -> NodeId {
        if self.cte_alias_pending && self.tree.kind(self.current) == NodeKind::CteWithClause {
            self.cte_alias_pending = false;
            let alias = self.open(NodeKind::CteAlias);
            let id = self.tree.add_token(alias, kind, token);
            self.current = self.tree.parent(alias).unwrap_or(ROOT);
            return id;
        }
        self.add_leaf(kind, token)
    }

    // --- keywords ---

    fn handle_keyword(&mut self, token: &'a Token) {
        let upper = token.keyword_text();
        let upper = upper.as_str();

        // A statement starter or BEGIN ends an IF/WHILE condition; the body
        // is a single-statement container.
        if self.tree.kind(self.current) == NodeKind::BooleanExpression
            && (is_statement_starter(upper))
            && matches!(
                self.tree.parent_kind(self.current),
                Some(NodeKind::IfStatement) | Some(NodeKind::WhileLoop)
            )
        {
            let owner = self.tree.parent(self.current).unwrap_or(ROOT);
            self.current = owner;
            self.open(NodeKind::ContainerSingleStatement);
            // fall through to normal dispatch below
        }

        match upper {
            "CASE" => {
                self.ensure_content_context();
                let case = self.open(NodeKind::CaseStatement);
                self.tree.add_token(case, NodeKind::OtherKeyword, token);
                self.open(NodeKind::CaseInput);
            }
            "WHEN" => self.handle_when(token),
            "WHEN MATCHED" | "WHEN NOT MATCHED" => self.handle_merge_when(token),
            "THEN" => self.handle_then(token),
            "ELSE" => self.handle_else(token),
            "END" => self.handle_end(token),
            "END TRY" | "END CATCH" => self.handle_end_try_catch(token, upper),
            "BEGIN TRY" | "BEGIN CATCH" => self.handle_begin_try_catch(token, upper),
            "BEGIN" => self.handle_begin(token),
            "AND" => self.handle_and(token),
            "OR" => self.handle_or(token),
            "BETWEEN" | "NOT BETWEEN" => {
                self.ensure_content_context();
                let between = self.open(NodeKind::BetweenCondition);
                self.tree
                    .add_token(between, NodeKind::CompoundKeyword, token);
                self.open(NodeKind::BetweenLowerBound);
            }
            "ON" => self.handle_on(token),
            "AS" => self.handle_as(token),
            "WITH" => self.handle_with(token),
            "TO" | "FROM" if self.in_permissions() => {
                let block = self
                    .nearest_any(|k| k == NodeKind::PermissionsBlock)
                    .unwrap_or(ROOT);
                self.current = block;
                let recipient = self.open(NodeKind::PermissionsRecipient);
                self.tree.add_token(recipient, NodeKind::OtherKeyword, token);
            }
            "USING" if self.nearest_any(|k| k == NodeKind::MergeClause).is_some() => {
                let merge = self
                    .nearest_any(|k| k == NodeKind::MergeClause)
                    .unwrap_or(ROOT);
                self.current = merge;
                let using = self.open(NodeKind::MergeUsing);
                self.tree.add_token(using, NodeKind::OtherKeyword, token);
            }
            "CURSOR" if self.tree.kind(self.current) == NodeKind::DdlDeclareBlock => {
                self.tree.set_kind(self.current, NodeKind::CursorDeclaration);
                self.add_leaf(NodeKind::OtherKeyword, token);
            }
            "FOR" => self.handle_for(token),
            "RETURNS" if self.in_ddl_header() => {
                let block = self
                    .nearest_any(|k| k == NodeKind::DdlProceduralBlock)
                    .unwrap_or(ROOT);
                self.current = block;
                let returns = self.open(NodeKind::DdlReturns);
                self.tree.add_token(returns, NodeKind::OtherKeyword, token);
            }
            _ if is_clause_starter(upper) && self.current_statement().is_some() => {
                self.handle_clause_starter(token, upper);
            }
            _ if is_statement_starter(upper) => {
                self.handle_statement_starter(token, upper);
            }
            _ => {
                self.ensure_content_context();
                let kind = self.keyword_leaf_kind(token, upper);
                self.add_leaf(kind, token);
            }
        }
    }

    fn keyword_leaf_kind(&self, token: &Token, upper: &str) -> NodeKind {
        if token.kind == TokenKind::CompoundKeyword {
            return NodeKind::CompoundKeyword;
        }
        if keywords::is_pseudo_name(upper) {
            return NodeKind::PseudoName;
        }
        if keywords::is_data_type(upper) {
            return NodeKind::DataTypeKeyword;
        }
        if keywords::is_function_keyword(upper) {
            if let Some(next) = self.peek_significant() {
                if next.kind == TokenKind::OpenParens {
                    return NodeKind::FunctionKeyword;
                }
            }
        }
        NodeKind::OtherKeyword
    }

    fn handle_when(&mut self, token: &Token) {
        if let Some(case) = self.nearest_in_expression(NodeKind::CaseStatement) {
            self.escape_partial_containers();
            self.current = case;
            let when = self.open(NodeKind::CaseWhen);
            self.tree.add_token(when, NodeKind::OtherKeyword, token);
        } else {
            self.ensure_content_context();
            self.add_leaf(NodeKind::OtherKeyword, token);
        }
    }

    fn handle_then(&mut self, token: &Token) {
        if let Some(when) = self.nearest_in_expression(NodeKind::CaseWhen) {
            self.escape_partial_containers();
            self.current = when;
            let then = self.open(NodeKind::CaseThen);
            self.tree.add_token(then, NodeKind::OtherKeyword, token);
        } else if let Some(merge_when) = self.nearest_any(|k| k == NodeKind::MergeWhen) {
            self.current = merge_when;
            let then = self.open(NodeKind::MergeThen);
            self.tree.add_token(then, NodeKind::OtherKeyword, token);
            self.open(NodeKind::MergeAction);
        } else {
            self.ensure_content_context();
            self.add_leaf(NodeKind::OtherKeyword, token);
        }
    }

    fn handle_else(&mut self, token: &Token) {
        if let Some(case) = self.nearest_in_expression(NodeKind::CaseStatement) {
            self.escape_partial_containers();
            self.current = case;
            let else_clause = self.open(NodeKind::CaseElse);
            self.tree.add_token(else_clause, NodeKind::OtherKeyword, token);
            return;
        }
        // ELSE is a statement boundary for the IF body; close the body,
        // then re-open the most recently finished IF without an ELSE branch.
        self.end_statement();
        if let Some(if_node) = self.find_pending_if() {
            self.reclaim_trailing_trivia(if_node);
            self.current = if_node;
            let else_clause = self.open(NodeKind::ElseClause);
            self.tree.add_token(else_clause, NodeKind::OtherKeyword, token);
            self.open(NodeKind::ContainerSingleStatement);
            return;
        }
        self.ensure_content_context();
        let id = self.add_leaf(NodeKind::OtherKeyword, token);
        self.tree.tag_error(id);
    }

    /// Whitespace and comments that landed on the holder after a statement
    /// closed itself belong inside the construct being re-opened; move them
    /// so leaf order still matches the source.
    fn reclaim_trailing_trivia(&mut self, target: NodeId) {
        let holder = self.statement_holder();
        let mut trivia = Vec::new();
        while let Some(&last) = self.tree.children(holder).last() {
            if !self.tree.kind(last).is_whitespace_or_comment() {
                break;
            }
            self.tree.detach(last);
            trivia.push(last);
        }
        for id in trivia.into_iter().rev() {
            self.tree.append(target, id);
        }
    }

    /// Deepest IF without an ELSE branch along the last-statement path of
    /// the current holder.
    fn find_pending_if(&self) -> Option<NodeId> {
        let holder = self.statement_holder();
        let last_stmt = self
            .tree
            .children(holder)
            .iter()
            .rev()
            .copied()
            .find(|&c| self.tree.kind(c) == NodeKind::SqlStatement)?;
        let mut found = None;
        self.find_pending_if_in(last_stmt, &mut found);
        found
    }

    fn find_pending_if_in(&self, node: NodeId, found: &mut Option<NodeId>) {
        if self.tree.kind(node) == NodeKind::IfStatement
            && self.tree.child_by_kind(node, NodeKind::ElseClause).is_none()
        {
            *found = Some(node);
        }
        for &child in self.tree.children(node) {
            self.find_pending_if_in(child, found);
        }
    }

    fn handle_end(&mut self, token: &Token) {
        if let Some(case) = self.nearest_in_expression(NodeKind::CaseStatement) {
            self.escape_partial_containers();
            self.tree.add_token(case, NodeKind::OtherKeyword, token);
            self.current = self.tree.parent(case).unwrap_or(ROOT);
            return;
        }
        if let Some(block) = self.nearest_any(|k| k == NodeKind::BeginEndBlock) {
            self.current = block;
            let close = self.tree.add_child(block, NodeKind::ContainerClose, "");
            self.tree.add_token(close, NodeKind::OtherKeyword, token);
            self.end_statement();
            return;
        }
        self.ensure_content_context();
        let id = self.add_leaf(NodeKind::OtherKeyword, token);
        self.tree.tag_error(id);
    }

    fn handle_begin(&mut self, token: &Token) {
        if let Some(next) = self.peek_significant() {
            let next_upper = next.keyword_text();
            if next_upper == "TRAN" || next_upper == "TRANSACTION" || next_upper == "DISTRIBUTED" {
                self.open_statement_if_needed();
                let tran = self.open(NodeKind::BeginTransaction);
                self.tree.add_token(tran, NodeKind::OtherKeyword, token);
                return;
            }
        }
        self.open_statement_if_needed();
        let block = self.open(NodeKind::BeginEndBlock);
        let open = self.tree.add_child(block, NodeKind::ContainerOpen, "");
        self.tree.add_token(open, NodeKind::OtherKeyword, token);
        self.open(NodeKind::ContainerMultiStatement);
    }

    fn handle_begin_try_catch(&mut self, token: &Token, upper: &str) {
        let kind = if upper == "BEGIN TRY" {
            NodeKind::TryBlock
        } else {
            NodeKind::CatchBlock
        };
        // A CATCH directly after its TRY closes stays in the same clause;
        // the handler is part of the statement the TRY started.
        if !(kind == NodeKind::CatchBlock && self.follows_try_block()) {
            self.open_statement_if_needed();
        }
        let block = self.open(kind);
        let open = self.tree.add_child(block, NodeKind::ContainerOpen, "");
        self.tree.add_token(open, NodeKind::CompoundKeyword, token);
        self.open(NodeKind::ContainerMultiStatement);
    }

    fn follows_try_block(&self) -> bool {
        if self.tree.kind(self.current) != NodeKind::SqlClause {
            return false;
        }
        self.tree
            .children(self.current)
            .iter()
            .rev()
            .copied()
            .find(|&c| !self.tree.kind(c).is_whitespace_or_comment())
            .map(|c| self.tree.kind(c) == NodeKind::TryBlock)
            .unwrap_or(false)
    }

    fn handle_end_try_catch(&mut self, token: &Token, upper: &str) {
        let kind = if upper == "END TRY" {
            NodeKind::TryBlock
        } else {
            NodeKind::CatchBlock
        };
        match self.nearest_any(|k| k == kind) {
            Some(block) => {
                let close = self.tree.add_child(block, NodeKind::ContainerClose, "");
                self.tree.add_token(close, NodeKind::CompoundKeyword, token);
                if upper == "END TRY" {
                    // BEGIN CATCH continues the same statement.
                    self.current = self.tree.parent(block).unwrap_or(ROOT);
                } else {
                    self.current = block;
                    self.end_statement();
                }
            }
            None => {
                self.ensure_content_context();
                let id = self.add_leaf(NodeKind::CompoundKeyword, token);
                self.tree.tag_error(id);
            }
        }
    }

    fn handle_and(&mut self, token: &Token) {
        if self.tree.kind(self.current) == NodeKind::BetweenLowerBound {
            let between = self.tree.parent(self.current).unwrap_or(ROOT);
            self.current = between;
            self.tree.add_token(between, NodeKind::OtherKeyword, token);
            self.open(NodeKind::BetweenUpperBound);
            return;
        }
        self.escape_partial_containers();
        self.ensure_content_context();
        let and = self.tree.add_child(self.current, NodeKind::AndOperator, "");
        self.tree.add_token(and, NodeKind::OtherKeyword, token);
    }

    fn handle_or(&mut self, token: &Token) {
        self.escape_partial_containers();
        self.ensure_content_context();
        let or = self.tree.add_child(self.current, NodeKind::OrOperator, "");
        self.tree.add_token(or, NodeKind::OtherKeyword, token);
    }

    fn handle_on(&mut self, token: &Token) {
        // Join predicate?
        if let Some(clause) = self.tree.ancestor_of_kind(self.current, NodeKind::SqlClause) {
            if self
                .first_significant_leaf(clause)
                .map(|leaf| is_join_keyword(&self.leaf_upper(leaf)))
                .unwrap_or(false)
            {
                self.escape_partial_containers();
                self.current = clause;
                let on = self.open(NodeKind::JoinOnSection);
                self.tree.add_token(on, NodeKind::OtherKeyword, token);
                return;
            }
        }
        if let Some(merge) = self.nearest_any(|k| k == NodeKind::MergeClause) {
            if self.nearest_any(|k| k == NodeKind::MergeCondition).is_none() {
                self.current = merge;
                let cond = self.open(NodeKind::MergeCondition);
                self.tree.add_token(cond, NodeKind::OtherKeyword, token);
                return;
            }
        }
        if self.in_permissions() {
            let block = self
                .nearest_any(|k| k == NodeKind::PermissionsBlock)
                .unwrap_or(ROOT);
            self.current = block;
            let target = self.open(NodeKind::PermissionsTarget);
            self.tree.add_token(target, NodeKind::OtherKeyword, token);
            return;
        }
        self.ensure_content_context();
        self.add_leaf(NodeKind::OtherKeyword, token);
    }

    fn in_permissions(&self) -> bool {
        self.nearest_any(|k| {
            matches!(
                k,
                NodeKind::PermissionsBlock
                    | NodeKind::PermissionsDetail
                    | NodeKind::PermissionsTarget
                    | NodeKind::PermissionsRecipient
            )
        })
        .is_some()
            && self.current_statement().is_some()
    }

    fn in_ddl_header(&self) -> bool {
        let mut node = self.current;
        loop {
            let kind = self.tree.kind(node);
            if matches!(
                kind,
                NodeKind::DdlProceduralBlock
                    | NodeKind::DdlOtherBlock
                    | NodeKind::DdlReturns
                    | NodeKind::DdlWithClause
            ) {
                return true;
            }
            if kind == NodeKind::SqlStatement || is_statement_holder(kind) {
                return false;
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                None => return false,
            }
        }
    }

    fn handle_as(&mut self, token: &Token) {
        // CTE body: WITH x AS ( ... )
        if let Some(cte) = self.nearest_in_expression(NodeKind::CteWithClause) {
            self.escape_partial_containers();
            self.current = cte;
            let as_block = self.open(NodeKind::CteAsBlock);
            self.tree.add_token(as_block, NodeKind::OtherKeyword, token);
            return;
        }
        // Procedure/function/view body: CREATE ... AS <statements>
        if self.in_ddl_header() {
            let block = self
                .nearest_any(|k| {
                    matches!(k, NodeKind::DdlProceduralBlock | NodeKind::DdlOtherBlock)
                })
                .unwrap_or(ROOT);
            self.current = block;
            let as_block = self.open(NodeKind::DdlAsBlock);
            self.tree.add_token(as_block, NodeKind::OtherKeyword, token);
            self.open(NodeKind::ContainerGeneralContent);
            return;
        }
        self.ensure_content_context();
        self.add_leaf(NodeKind::OtherKeyword, token);
    }

    fn handle_with(&mut self, token: &'a Token) {
        if self.in_ddl_header() {
            let block = self
                .nearest_any(|k| {
                    matches!(k, NodeKind::DdlProceduralBlock | NodeKind::DdlOtherBlock)
                })
                .unwrap_or(ROOT);
            self.current = block;
            let with = self.open(NodeKind::DdlWithClause);
            self.tree.add_token(with, NodeKind::OtherKeyword, token);
            return;
        }
        // Statement-initial WITH opens a CTE header; anywhere else it is a
        // table hint or options keyword.
        if self.at_statement_start() {
            self.open_statement_if_needed();
            let cte = self.open(NodeKind::CteWithClause);
            self.tree.add_token(cte, NodeKind::OtherKeyword, token);
            self.cte_alias_pending = true;
            return;
        }
        self.add_leaf(NodeKind::OtherKeyword, token);
    }

    fn handle_for(&mut self, token: &Token) {
        if let Some(cursor) = self.nearest_any(|k| k == NodeKind::CursorDeclaration) {
            if self
                .tree
                .child_by_kind(cursor, NodeKind::CursorForBlock)
                .is_none()
            {
                self.current = cursor;
                let for_block = self.open(NodeKind::CursorForBlock);
                self.tree.add_token(for_block, NodeKind::OtherKeyword, token);
            } else {
                self.current = cursor;
                let options = self.open(NodeKind::CursorForOptions);
                self.tree.add_token(options, NodeKind::OtherKeyword, token);
            }
            return;
        }
        self.ensure_content_context();
        self.add_leaf(NodeKind::OtherKeyword, token);
    }

    fn handle_merge_when(&mut self, token: &Token) {
        // Merge WHEN branches are siblings of the MERGE clause content.
        if let Some(merge) = self.nearest_any(|k| k == NodeKind::MergeClause) {
            self.current = self.tree.parent(merge).unwrap_or(ROOT);
            let when = self.open(NodeKind::MergeWhen);
            self.tree.add_token(when, NodeKind::CompoundKeyword, token);
            return;
        }
        if let Some(when) = self.nearest_any(|k| k == NodeKind::MergeWhen) {
            self.current = self.tree.parent(when).unwrap_or(ROOT);
            let next = self.open(NodeKind::MergeWhen);
            self.tree.add_token(next, NodeKind::CompoundKeyword, token);
            return;
        }
        self.ensure_content_context();
        self.add_leaf(NodeKind::CompoundKeyword, token);
    }

    // --- clause and statement starters ---

    fn handle_clause_starter(&mut self, token: &Token, upper: &str) {
        // Inside a CTE header, the main statement keyword ends the header.
        self.escape_cte_if_open();

        if is_set_operator(upper) {
            self.escape_partial_containers();
            let holder = self.clause_holder();
            if is_statement_holder(self.tree.kind(holder)) {
                self.begin_statement();
                self.add_leaf(NodeKind::CompoundKeyword, token);
                return;
            }
            let set_op = self.tree.add_child(holder, NodeKind::SetOperatorClause, "");
            let kind = if token.kind == TokenKind::CompoundKeyword {
                NodeKind::CompoundKeyword
            } else {
                NodeKind::OtherKeyword
            };
            self.tree.add_token(set_op, kind, token);
            self.current = self.tree.add_child(holder, NodeKind::SqlClause, "");
            return;
        }

        self.start_new_clause();
        let kind = if token.kind == TokenKind::CompoundKeyword {
            NodeKind::CompoundKeyword
        } else {
            NodeKind::OtherKeyword
        };
        self.add_leaf(kind, token);
    }

    fn at_statement_start(&self) -> bool {
        if is_statement_holder(self.tree.kind(self.current)) {
            return true;
        }
        if self.tree.kind(self.current) != NodeKind::SqlClause {
            return false;
        }
        self.first_significant_leaf(self.current).is_none()
    }

    /// End the running statement if one is open with content, then position
    /// at a fresh empty clause.
    fn open_statement_if_needed(&mut self) {
        self.escape_partial_containers();
        if self.at_statement_start() {
            self.ensure_content_context();
            return;
        }
        let holder = self.clause_holder();
        if is_parens(self.tree.kind(holder)) {
            // Subquery context: starters open clauses, never statements.
            self.current = self.tree.add_child(holder, NodeKind::SqlClause, "");
            return;
        }
        self.end_statement();
        self.begin_statement();
    }

    fn handle_statement_starter(&mut self, token: &'a Token, upper: &str) {
        // Privilege lists reuse statement keywords (GRANT SELECT, INSERT...).
        if self.in_permissions() {
            let kind = if token.kind == TokenKind::CompoundKeyword {
                NodeKind::CompoundKeyword
            } else {
                self.keyword_leaf_kind(token, upper)
            };
            self.add_leaf(kind, token);
            return;
        }
        // SELECT feeding INSERT stays inside the INSERT statement.
        if upper == "SELECT" {
            if let Some(stmt) = self.current_statement() {
                let first = self.first_significant_leaf(stmt).map(|l| self.leaf_upper(l));
                if matches!(first.as_deref(), Some("INSERT") | Some("INSERT INTO")) {
                    self.escape_partial_containers();
                    self.start_new_clause();
                    self.add_leaf(NodeKind::OtherKeyword, token);
                    return;
                }
            }
        }
        // SET inside an UPDATE is a clause.
        if upper == "SET" {
            if let Some(stmt) = self.current_statement() {
                let first = self.first_significant_leaf(stmt).map(|l| self.leaf_upper(l));
                if first.as_deref() == Some("UPDATE") {
                    self.start_new_clause();
                    self.add_leaf(NodeKind::OtherKeyword, token);
                    return;
                }
            }
        }
        // The main statement after a CTE header continues the same
        // statement as a new clause.
        if let Some(cte) = self.nearest_in_expression(NodeKind::CteWithClause) {
            self.current = self.tree.parent(cte).unwrap_or(ROOT);
            self.cte_alias_pending = false;
            self.start_new_clause();
        } else {
            self.open_statement_if_needed();
        }

        match upper {
            "IF" => {
                let if_stmt = self.open(NodeKind::IfStatement);
                self.tree.add_token(if_stmt, NodeKind::OtherKeyword, token);
                self.open(NodeKind::BooleanExpression);
            }
            "WHILE" => {
                let while_loop = self.open(NodeKind::WhileLoop);
                self.tree.add_token(while_loop, NodeKind::OtherKeyword, token);
                self.open(NodeKind::BooleanExpression);
            }
            "DECLARE" => {
                let declare = self.open(NodeKind::DdlDeclareBlock);
                self.tree.add_token(declare, NodeKind::OtherKeyword, token);
            }
            "CREATE" | "ALTER" => {
                let procedural = self
                    .peek_significant()
                    .map(|next| {
                        matches!(
                            next.keyword_text().as_str(),
                            "PROC" | "PROCEDURE" | "FUNCTION" | "TRIGGER"
                        )
                    })
                    .unwrap_or(false);
                let kind = if procedural {
                    NodeKind::DdlProceduralBlock
                } else {
                    NodeKind::DdlOtherBlock
                };
                let block = self.open(kind);
                self.tree.add_token(block, NodeKind::OtherKeyword, token);
            }
            "GRANT" | "DENY" | "REVOKE" => {
                let block = self.open(NodeKind::PermissionsBlock);
                self.tree.add_token(block, NodeKind::OtherKeyword, token);
                self.open(NodeKind::PermissionsDetail);
            }
            "MERGE" => {
                let merge = self.open(NodeKind::MergeClause);
                self.tree.add_token(merge, NodeKind::OtherKeyword, token);
                self.open(NodeKind::MergeTarget);
            }
            "COMMIT" | "ROLLBACK" | "SAVE" => {
                let kind = match upper {
                    "COMMIT" => NodeKind::CommitTransaction,
                    "ROLLBACK" => NodeKind::RollbackTransaction,
                    _ => NodeKind::SaveTransaction,
                };
                let tran = self.open(kind);
                self.tree.add_token(tran, NodeKind::OtherKeyword, token);
            }
            "BEGIN" => self.handle_begin(token),
            "BEGIN TRY" | "BEGIN CATCH" => {
                self.handle_begin_try_catch(token, upper);
            }
            "INSERT" | "INSERT INTO" | "UPDATE" => {
                let kind = if token.kind == TokenKind::CompoundKeyword {
                    NodeKind::CompoundKeyword
                } else {
                    NodeKind::OtherKeyword
                };
                self.add_leaf(kind, token);
                self.open(NodeKind::SelectionTarget);
            }
            _ => {
                let kind = if token.kind == TokenKind::CompoundKeyword {
                    NodeKind::CompoundKeyword
                } else {
                    self.keyword_leaf_kind(token, upper)
                };
                self.add_leaf(kind, token);
            }
        }
    }

    fn escape_cte_if_open(&mut self) {
        if let Some(cte) = self.nearest_in_expression(NodeKind::CteWithClause) {
            // Position after the CTE header, in its statement.
            self.current = self.tree.parent(cte).unwrap_or(ROOT);
            self.cte_alias_pending = false;
        }
    }

    fn escape_cte_body(&mut self) {
        if let Some(as_block) = self.nearest_in_expression(NodeKind::CteAsBlock) {
            self.current = self.tree.parent(as_block).unwrap_or(ROOT);
        }
    }

    // --- leaf queries ---

    fn first_significant_leaf(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .leaves(node)
            .into_iter()
            .find(|&leaf| !self.tree.kind(leaf).is_whitespace_or_comment())
    }

    fn leaf_upper(&self, leaf: NodeId) -> CompactString {
        match self.tree.simple_text(leaf) {
            Some(simple) => CompactString::from(simple),
            None => CompactString::from(self.tree.text(leaf).to_ascii_uppercase()),
        }
    }

    /// Tag containers that an EOF or batch separator leaves open.
    fn tag_unclosed(&mut self) {
        let mut node = self.current;
        loop {
            let kind = self.tree.kind(node);
            if is_parens(kind)
                || matches!(
                    kind,
                    NodeKind::CaseStatement
                        | NodeKind::BeginEndBlock
                        | NodeKind::TryBlock
                        | NodeKind::CatchBlock
                )
            {
                self.tree.tag_error(node);
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                None => break,
            }
        }
    }
}

fn block_comment_is_terminated(text: &str) -> bool {
    // Nested comments: every /* must have a matching */.
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
            }
            _ => i += 1,
        }
    }
    depth == 0
}

fn quoted_is_terminated(text: &str, prefix_len: usize, quote: u8) -> bool {
    let bytes = &text.as_bytes()[prefix_len..];
    if bytes.len() < 2 || bytes[0] != quote {
        return false;
    }
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if i + 1 < bytes.len() && bytes[i + 1] == quote {
                i += 2;
                continue;
            }
            return i == bytes.len() - 1;
        }
        i += 1;
    }
    false
}

fn bracket_is_terminated(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'[' {
        return false;
    }
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b']' {
            if i + 1 < bytes.len() && bytes[i + 1] == b']' {
                i += 2;
                continue;
            }
            return i == bytes.len() - 1;
        }
        i += 1;
    }
    false
}
