//! The configurable pretty-printer.
//!
//! Rendering walks the parse tree once with a small amount of deferred
//! state: line breaks, word separators, and statement terminators are
//! recorded as "expected" and only materialized when the next visible
//! token arrives. That keeps trailing whitespace out of the output and
//! lets several rules compete for the same boundary (the last writer
//! wins the flags, the first token consumes them).
//!
//! Parenthesized sections render into a detached child state first, so
//! the decision to expand them across lines can depend on whether their
//! content broke.

use std::collections::HashMap;

use memchr::memchr2;

use crate::error::{Result, TsqlfmtError};
use crate::keywords;
use crate::options::FormatOptions;
use crate::tree::{NodeId, NodeKind, SqlTree, ROOT};

use super::{
    html_escape, identity, obfuscate, CLASS_COMMENT, CLASS_ERROR, CLASS_FUNCTION, CLASS_KEYWORD,
    CLASS_OPERATOR, CLASS_STRING,
};

/// Prepended to the output when the tree contains unrecognized content.
pub const PARSE_ERROR_WARNING: &str = "--WARNING! ERRORS ENCOUNTERED DURING SQL PARSING!";

/// Render a tree with the standard formatter.
pub fn format(tree: &SqlTree, options: &FormatOptions) -> Result<String> {
    let mut formatter = StandardFormatter {
        tree,
        options: options.clone(),
    };
    let mut state = RenderState::new(options);
    if tree.has_errors() {
        state.add_content(PARSE_ERROR_WARNING, None);
        state.add_line_break();
    }
    let top = tree.children(ROOT);
    formatter.process_list(top, &mut state)?;
    if state.statement_end_char_expected && state.current_line_length > 0 {
        state.add_content(";", None);
        state.statement_end_char_expected = false;
    }
    state.break_as_expected();
    if let (Some(region), Some(start)) = (state.special_region, state.region_start) {
        // Unclosed [noformat]/[minify] region: splice everything from the
        // marker to the end of the document in the region's own rendering.
        let leaves = tree.leaves_between(start, None);
        let spliced = match region {
            SpecialRegion::NoFormat => {
                identity::render_leaves(tree, &leaves, options.html_coloring)
            }
            SpecialRegion::Minify => {
                obfuscate::render_leaves(tree, &leaves, options.html_coloring)
            }
        };
        state.special_region = None;
        state.add_raw(&spliced);
    }
    Ok(state.out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialRegion {
    NoFormat,
    Minify,
}

/// Accumulated output plus the deferred-boundary flags.
struct RenderState {
    out: String,
    html: bool,
    indent_string: String,
    /// Display width of one indent level.
    indent_length: usize,
    max_line_width: usize,

    indent_level: i32,
    current_line_length: usize,
    current_line_has_content: bool,

    break_expected: bool,
    additional_breaks_expected: usize,
    word_separator_expected: bool,
    statement_break_expected: bool,
    /// A `;` owed to the current statement, emitted lazily so it can land
    /// after whatever turns out to be the statement's last token.
    statement_end_char_expected: bool,
    source_break_pending: bool,
    /// The next expected break backs out one level first. Used for clause
    /// starters so the keyword sits left of the clause body.
    unindent_initial_break: bool,

    /// Most recent keyword seen at each indent level.
    recent_keywords: HashMap<i32, String>,

    special_region: Option<SpecialRegion>,
    region_start: Option<NodeId>,
}

impl RenderState {
    fn new(options: &FormatOptions) -> Self {
        let tab_count = options.indent.matches('\t').count();
        let indent_length =
            options.indent.len() + tab_count * options.spaces_per_tab.saturating_sub(1);
        RenderState {
            out: String::new(),
            html: options.html_coloring,
            indent_string: options.indent.clone(),
            indent_length,
            max_line_width: options.max_line_width,
            indent_level: 0,
            current_line_length: 0,
            current_line_has_content: false,
            break_expected: false,
            additional_breaks_expected: 0,
            word_separator_expected: false,
            statement_break_expected: false,
            statement_end_char_expected: false,
            source_break_pending: false,
            unindent_initial_break: false,
            recent_keywords: HashMap::new(),
            special_region: None,
            region_start: None,
        }
    }

    /// Detached state for rendering a parenthesized section. Starts at the
    /// current indent with clean flags and no active region.
    fn child(&self) -> Self {
        RenderState {
            out: String::new(),
            html: self.html,
            indent_string: self.indent_string.clone(),
            indent_length: self.indent_length,
            max_line_width: self.max_line_width,
            indent_level: self.indent_level,
            current_line_length: (self.indent_level.max(0) as usize) * self.indent_length,
            current_line_has_content: self.current_line_has_content,
            break_expected: false,
            additional_breaks_expected: 0,
            word_separator_expected: false,
            statement_break_expected: false,
            statement_end_char_expected: false,
            source_break_pending: false,
            unindent_initial_break: false,
            recent_keywords: HashMap::new(),
            special_region: None,
            region_start: None,
        }
    }

    /// Merge a rendered child section back in. If the child left a special
    /// region open, the region carries over to this state.
    fn assimilate(&mut self, child: RenderState) {
        self.current_line_length = child.current_line_length;
        self.current_line_has_content = child.current_line_has_content;
        if self.special_region.is_none() {
            self.out.push_str(&child.out);
            if child.special_region.is_some() {
                self.special_region = child.special_region;
                self.region_start = child.region_start;
            }
        }
    }

    // --- low-level output ---

    fn append(&mut self, content: &str, class: Option<&str>) {
        match (self.html, class) {
            (true, Some(name)) => {
                self.out.push_str("<span class=\"");
                self.out.push_str(name);
                self.out.push_str("\">");
                self.out.push_str(&html_escape(content));
                self.out.push_str("</span>");
            }
            (true, None) => self.out.push_str(&html_escape(content)),
            (false, _) => self.out.push_str(content),
        }
    }

    fn add_content(&mut self, content: &str, class: Option<&str>) {
        if self.current_line_has_content
            && self.current_line_length + content.len() > self.max_line_width
        {
            self.break_to_next_line();
        }
        self.current_line_length += content.len();
        self.current_line_has_content = true;
        if self.special_region.is_none() {
            self.append(content, class);
        }
    }

    /// Bypasses both HTML escaping and region suppression. Used for spliced
    /// region bodies, which arrive already rendered.
    fn add_raw(&mut self, content: &str) {
        self.out.push_str(content);
    }

    fn add_line_break(&mut self) {
        if self.special_region.is_none() {
            self.out.push('\n');
        }
        self.current_line_length = 0;
        self.current_line_has_content = false;
    }

    // Spaces are boundary characters, not content; they never count toward
    // the line width.
    fn add_space(&mut self) {
        if self.special_region.is_none() {
            self.out.push(' ');
        }
    }

    fn indent(&mut self, levels: i32) {
        for _ in 0..levels.max(0) {
            if self.special_region.is_none() {
                self.out.push_str(&self.indent_string);
            }
            self.current_line_length += self.indent_length;
        }
    }

    fn indent_current(&mut self) {
        let level = self.indent_level;
        self.indent(level);
    }

    fn break_to_next_line(&mut self) {
        self.add_line_break();
        self.indent_current();
        self.break_expected = false;
        self.source_break_pending = false;
        self.word_separator_expected = false;
    }

    fn break_as_expected(&mut self) {
        if self.break_expected {
            self.break_to_next_line();
        }
        while self.additional_breaks_expected > 0 {
            self.additional_breaks_expected -= 1;
            self.add_line_break();
            self.indent_current();
        }
    }

    fn increment_indent(&mut self) {
        self.indent_level += 1;
    }

    fn decrement_indent(&mut self) {
        self.indent_level -= 1;
    }

    // --- word/comment separation ---

    fn separate_words(&mut self) {
        self.separate_words_opt(true);
    }

    fn separate_words_opt(&mut self, add_space: bool) {
        if self.break_expected || self.additional_breaks_expected > 0 {
            let was_unindent = self.unindent_initial_break;
            if was_unindent {
                self.decrement_indent();
            }
            self.break_as_expected();
            if was_unindent {
                self.increment_indent();
            }
        } else if self.word_separator_expected && add_space {
            self.add_space();
        }
        self.unindent_initial_break = false;
        self.source_break_pending = false;
        self.word_separator_expected = false;
    }

    fn separate_comment(&mut self, single_line: bool) {
        if self.source_break_pending && (single_line || self.current_line_has_content) {
            self.break_expected = true;
            self.break_as_expected();
        } else if self.word_separator_expected {
            self.add_space();
        }
        self.source_break_pending = false;
        self.word_separator_expected = false;
    }

    // --- keyword recency, per indent level ---

    fn set_recent_keyword(&mut self, word: &str) {
        self.recent_keywords
            .insert(self.indent_level, word.to_uppercase());
    }

    /// The innermost keyword recorded at or above the current level.
    fn recent_keyword(&self) -> Option<String> {
        self.recent_keywords
            .iter()
            .filter(|(&level, _)| level >= self.indent_level)
            .min_by_key(|(&level, _)| level)
            .map(|(_, word)| word.clone())
    }

    fn reset_keywords(&mut self) {
        let level = self.indent_level;
        self.recent_keywords.retain(|&k, _| k < level);
    }

    // --- inspection of rendered content ---

    fn starts_with_break(&self) -> bool {
        self.out.starts_with('\n')
    }

    fn contains_line_break(&self) -> bool {
        self.out.contains('\n')
    }

    fn open_class(&mut self, class: &str) {
        if self.html && self.special_region.is_none() {
            self.out.push_str("<span class=\"");
            self.out.push_str(class);
            self.out.push_str("\">");
        }
    }

    fn close_class(&mut self) {
        if self.html && self.special_region.is_none() {
            self.out.push_str("</span>");
        }
    }
}

struct StandardFormatter<'a> {
    tree: &'a SqlTree,
    // Cloned because comma expansion is temporarily overridden while
    // rendering multi-row VALUES lists.
    options: FormatOptions,
}

impl<'a> StandardFormatter<'a> {
    fn kids(&self, node: NodeId) -> &'a [NodeId] {
        let tree: &'a SqlTree = self.tree;
        tree.children(node)
    }

    fn process_list(&mut self, nodes: &[NodeId], state: &mut RenderState) -> Result<()> {
        for &node in nodes {
            self.process_node(node, state)?;
        }
        Ok(())
    }

    fn process_node(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        let entry_indent = state.indent_level;
        let has_error = self.tree.node_has_error(node);
        if has_error {
            state.open_class(CLASS_ERROR);
        }
        self.dispatch(node, state)?;
        if has_error {
            state.close_class();
        }
        if state.indent_level != entry_indent {
            return Err(TsqlfmtError::InternalConsistency(format!(
                "indent level not restored after {:?} node",
                self.tree.kind(node)
            )));
        }
        Ok(())
    }

    fn dispatch(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        let kind = self.tree.kind(node);
        match kind {
            NodeKind::SqlStatement => {
                self.separate_statement(node, state);
                state.reset_keywords();
                self.process_list(self.kids(node), state)?;
                state.statement_break_expected = true;
            }
            NodeKind::SqlClause => {
                state.unindent_initial_break = true;
                state.statement_end_char_expected = true;
                state.increment_indent();
                self.process_list(self.kids(node), state)?;
                state.decrement_indent();
                if self.options.new_clause_line_breaks > 0 {
                    state.break_expected = true;
                }
                if self.options.new_clause_line_breaks > 1 {
                    state.additional_breaks_expected = self.options.new_clause_line_breaks - 1;
                }
            }
            NodeKind::SetOperatorClause => {
                state.decrement_indent();
                state.break_to_next_line();
                state.break_to_next_line();
                state.increment_indent();
                self.process_list(self.kids(node), state)?;
                state.break_expected = true;
                state.additional_breaks_expected = 1;
            }
            NodeKind::BatchSeparator => {
                if state.statement_end_char_expected && state.current_line_has_content {
                    state.add_content(";", None);
                    state.statement_end_char_expected = false;
                }
                state.break_to_next_line();
                self.process_list(self.kids(node), state)?;
                state.break_expected = true;
            }

            NodeKind::BeginEndBlock | NodeKind::TryBlock | NodeKind::CatchBlock => {
                self.process_block(node, state)?;
            }
            NodeKind::ContainerSingleStatement
            | NodeKind::ContainerMultiStatement
            | NodeKind::MergeAction => {
                let else_if = kind == NodeKind::ContainerSingleStatement
                    && self.tree.parent_kind(node) == Some(NodeKind::ElseClause)
                    && self.contains_if_statement(node);
                if else_if {
                    // ELSE IF stays on the ELSE's line and level.
                    state.decrement_indent();
                    self.process_list(self.kids(node), state)?;
                    state.increment_indent();
                } else {
                    state.break_expected = true;
                    self.process_list(self.kids(node), state)?;
                }
                state.statement_break_expected = false;
                state.unindent_initial_break = false;
            }

            NodeKind::CaseStatement => self.process_case_statement(node, state)?,
            NodeKind::CaseWhen => {
                if self.options.expand_case_statements {
                    state.break_expected = true;
                }
                let (head, tail) = self.split_after_first_significant(node);
                self.process_list(head, state)?;
                state.increment_indent();
                let then_at = tail
                    .iter()
                    .position(|&c| self.tree.kind(c) == NodeKind::CaseThen)
                    .unwrap_or(tail.len());
                self.process_list(&tail[..then_at], state)?;
                state.decrement_indent();
                self.process_list(&tail[then_at..], state)?;
            }
            NodeKind::CaseThen | NodeKind::CaseElse => {
                if self.options.expand_case_statements {
                    state.break_expected = kind == NodeKind::CaseElse;
                }
                let (head, tail) = self.split_after_first_significant(node);
                self.process_list(head, state)?;
                state.increment_indent();
                self.process_list(tail, state)?;
                state.decrement_indent();
            }
            NodeKind::CaseInput => {
                let significant = self
                    .tree
                    .leaves(node)
                    .iter()
                    .any(|&l| !self.tree.kind(l).is_whitespace_or_comment());
                if significant {
                    state.separate_words();
                }
                self.process_list(self.kids(node), state)?;
            }

            NodeKind::ElseClause => {
                state.break_expected = true;
                let (head, tail) =
                    self.split_at_kind(node, NodeKind::ContainerSingleStatement);
                state.decrement_indent();
                self.process_list(head, state)?;
                state.increment_indent();
                self.process_list(tail, state)?;
            }

            NodeKind::BooleanExpression
            | NodeKind::BetweenLowerBound
            | NodeKind::BetweenUpperBound => {
                state.separate_words();
                self.process_list(self.kids(node), state)?;
            }
            NodeKind::BetweenCondition => self.process_between(node, state)?,
            NodeKind::AndOperator | NodeKind::OrOperator => {
                if self.options.expand_boolean_expressions {
                    state.break_expected = true;
                }
                self.process_list(self.kids(node), state)?;
            }
            NodeKind::JoinOnSection => {
                if self.options.break_join_on_sections {
                    state.break_expected = true;
                }
                self.process_list(self.kids(node), state)?;
            }

            NodeKind::SelectionTargetParens
            | NodeKind::ExpressionParens
            | NodeKind::InParens
            | NodeKind::DdlParens => self.process_large_parens(node, state)?,
            NodeKind::DdlDetailParens | NodeKind::FunctionParens => {
                self.process_small_parens(node, state)?;
            }

            NodeKind::DdlAsBlock | NodeKind::CursorForBlock => {
                state.break_expected = true;
                state.decrement_indent();
                let (head, tail) = self.split_after_first_significant(node);
                self.process_list(head, state)?;
                state.break_expected = true;
                self.process_list(tail, state)?;
                state.increment_indent();
            }
            NodeKind::CursorForOptions | NodeKind::CteAsBlock => {
                state.break_expected = true;
                state.decrement_indent();
                let (head, tail) = self.split_after_first_significant(node);
                self.process_list(head, state)?;
                state.increment_indent();
                self.process_list(tail, state)?;
            }
            NodeKind::DdlWithClause => {
                state.decrement_indent();
                self.process_list(self.kids(node), state)?;
                state.increment_indent();
            }
            NodeKind::CteAlias => {
                state.unindent_initial_break = true;
                self.process_list(self.kids(node), state)?;
            }
            NodeKind::DdlReturns | NodeKind::MergeUsing | NodeKind::MergeWhen => {
                state.break_expected = true;
                state.unindent_initial_break = true;
                self.process_list(self.kids(node), state)?;
            }
            NodeKind::PermissionsTarget
            | NodeKind::PermissionsRecipient
            | NodeKind::MergeCondition
            | NodeKind::MergeThen => {
                state.break_expected = true;
                state.unindent_initial_break = true;
                state.increment_indent();
                self.process_list(self.kids(node), state)?;
                state.decrement_indent();
            }

            // Grouping kinds that add no formatting of their own.
            NodeKind::Root
            | NodeKind::IfStatement
            | NodeKind::WhileLoop
            | NodeKind::ContainerOpen
            | NodeKind::ContainerClose
            | NodeKind::ContainerGeneralContent
            | NodeKind::SelectionTarget
            | NodeKind::DdlProceduralBlock
            | NodeKind::DdlOtherBlock
            | NodeKind::DdlDeclareBlock
            | NodeKind::CteWithClause
            | NodeKind::CursorDeclaration
            | NodeKind::BeginTransaction
            | NodeKind::SaveTransaction
            | NodeKind::CommitTransaction
            | NodeKind::RollbackTransaction
            | NodeKind::PermissionsBlock
            | NodeKind::PermissionsDetail
            | NodeKind::MergeClause
            | NodeKind::MergeTarget => {
                self.process_list(self.kids(node), state)?;
            }

            // --- leaves ---
            NodeKind::WhiteSpace => self.process_whitespace(node, state),
            NodeKind::CommentSingleLine | NodeKind::CommentSingleLineCstyle => {
                self.process_single_line_comment(node, state);
            }
            NodeKind::CommentMultiLine => self.process_multiline_comment(node, state),

            NodeKind::OtherKeyword | NodeKind::DataTypeKeyword => {
                self.process_keyword(node, state);
            }
            NodeKind::CompoundKeyword => {
                state.separate_words();
                let simple = self.leaf_upper(node);
                state.set_recent_keyword(&simple);
                state.add_content(&self.cased_keyword(&simple), Some(CLASS_KEYWORD));
                state.word_separator_expected = true;
            }
            NodeKind::FunctionKeyword => {
                state.separate_words();
                let upper = self.leaf_upper(node);
                state.set_recent_keyword(&upper);
                state.add_content(self.tree.text(node), Some(CLASS_FUNCTION));
                state.word_separator_expected = true;
            }
            NodeKind::PseudoName => {
                state.separate_words();
                state.add_content(
                    &self.cased_keyword(self.tree.text(node)),
                    Some(CLASS_KEYWORD),
                );
                state.word_separator_expected = true;
            }

            NodeKind::Comma => self.process_comma(node, state),
            NodeKind::Period | NodeKind::ScopeResolutionOperator => {
                state.word_separator_expected = false;
                state.break_as_expected();
                state.add_content(self.tree.text(node), Some(CLASS_OPERATOR));
            }
            NodeKind::Semicolon => {
                state.word_separator_expected = false;
                // A terminator written directly after END stays on the END
                // line, the same place the lazily emitted one lands.
                if self.follows_block_close(node) {
                    state.break_expected = false;
                    state.additional_breaks_expected = 0;
                }
                state.break_as_expected();
                state.add_content(self.tree.text(node), Some(CLASS_OPERATOR));
                state.statement_end_char_expected = false;
            }
            NodeKind::Asterisk | NodeKind::EqualsSign | NodeKind::OtherOperator => {
                state.separate_words();
                let text = self.tree.text(node);
                state.add_content(&self.cased_operator(text), Some(CLASS_OPERATOR));
                // A tight minus reads as a sign, not an operator.
                state.word_separator_expected = text != "-";
            }
            NodeKind::OpenParens | NodeKind::CloseParens => {
                // Only reachable on error recovery; within parens nodes the
                // delimiters are rendered by the parens handlers.
                state.separate_words();
                state.add_content(
                    &self.cased_operator(self.tree.text(node)),
                    Some(CLASS_OPERATOR),
                );
                state.word_separator_expected = true;
            }

            NodeKind::StringLiteral | NodeKind::NStringLiteral => {
                state.separate_words();
                state.add_content(self.tree.text(node), Some(CLASS_STRING));
                state.word_separator_expected = true;
            }
            NodeKind::QuotedString => {
                state.separate_words();
                state.add_content(self.tree.text(node), None);
                state.word_separator_expected = true;
            }
            NodeKind::BracketQuotedName => {
                state.separate_words();
                let text = self.tree.text(node);
                let inner = text
                    .strip_prefix('[')
                    .and_then(|t| t.strip_suffix(']'))
                    .unwrap_or("");
                let upper = inner.to_uppercase();
                if !upper.is_empty() && keywords::is_data_type(&upper) {
                    // A bracketed data type name is an escaping artifact;
                    // render it bare.
                    state.add_content(&upper, None);
                } else {
                    state.add_content(text, None);
                }
                state.word_separator_expected = true;
            }
            NodeKind::NumberValue => {
                state.separate_words();
                state.add_content(&self.tree.text(node).to_lowercase(), None);
                state.word_separator_expected = true;
            }
            NodeKind::BinaryValue => {
                state.separate_words();
                let text = self.tree.text(node);
                if text.len() > 2 {
                    let digits = text[2..].to_uppercase();
                    state.add_content(&format!("0x{digits}"), None);
                } else {
                    state.add_content(text, None);
                }
                state.word_separator_expected = true;
            }
            NodeKind::MonetaryValue | NodeKind::OtherNode => {
                state.separate_words();
                state.add_content(self.tree.text(node), None);
                state.word_separator_expected = true;
            }
        }
        Ok(())
    }

    // --- statement boundaries ---

    fn separate_statement(&mut self, stmt: NodeId, state: &mut RenderState) {
        if !state.statement_break_expected {
            return;
        }
        // Runs of SET/DECLARE/PRINT read as one block; give them clause
        // spacing instead of statement spacing.
        let exempt = match self.first_significant_leaf(stmt) {
            Some(leaf) if self.tree.kind(leaf) == NodeKind::OtherKeyword => {
                let upper = self.leaf_upper(leaf);
                matches!(upper.as_str(), "SET" | "DECLARE" | "PRINT")
                    && state.recent_keyword().as_deref() == Some(upper.as_str())
            }
            _ => false,
        };
        if state.statement_end_char_expected {
            state.add_content(";", None);
            state.statement_end_char_expected = false;
        }
        let breaks = if exempt {
            self.options.new_clause_line_breaks
        } else {
            self.options.new_statement_line_breaks
        };
        for _ in 0..breaks {
            state.add_line_break();
        }
        state.indent_current();
        state.break_expected = false;
        state.additional_breaks_expected = 0;
        state.source_break_pending = false;
        state.statement_break_expected = false;
        state.word_separator_expected = false;
    }

    // --- blocks ---

    fn process_block(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        // A block that is the sole statement of a single-statement container
        // (an IF or WHILE body) renders at the container's own level.
        let parent = self.tree.parent(node);
        let grandparent = parent.and_then(|n| self.tree.parent(n));
        let great = grandparent.and_then(|n| self.tree.parent(n));
        let squeezed = parent.map(|n| self.tree.kind(n) == NodeKind::SqlClause) == Some(true)
            && grandparent.map(|n| self.tree.kind(n) == NodeKind::SqlStatement) == Some(true)
            && great.map(|n| self.tree.kind(n) == NodeKind::ContainerSingleStatement)
                == Some(true);
        if squeezed {
            state.decrement_indent();
        }
        for &child in self.kids(node) {
            if self.tree.kind(child) == NodeKind::ContainerClose {
                state.decrement_indent();
                state.break_expected = true;
                self.process_node(child, state)?;
                state.increment_indent();
            } else {
                self.process_node(child, state)?;
            }
        }
        if squeezed {
            state.increment_indent();
        }
        Ok(())
    }

    fn contains_if_statement(&self, container: NodeId) -> bool {
        self.tree
            .children_by_kind(container, NodeKind::SqlStatement)
            .iter()
            .any(|&stmt| {
                self.tree
                    .children_by_kind(stmt, NodeKind::SqlClause)
                    .iter()
                    .any(|&clause| {
                        self.tree
                            .child_by_kind(clause, NodeKind::IfStatement)
                            .is_some()
                    })
            })
    }

    // --- CASE ---

    fn process_case_statement(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        let parent_kind = self.tree.parent_kind(node);
        let embedded = matches!(
            parent_kind,
            Some(NodeKind::FunctionParens) | Some(NodeKind::ContainerGeneralContent)
        );
        if embedded {
            state.break_expected = true;
            state.break_as_expected();
        }
        let (head, tail) = self.split_after_first_significant(node);
        self.process_list(head, state)?;
        state.increment_indent();
        // Everything up to the END keyword is branch content.
        let end_at = tail
            .iter()
            .position(|&c| self.tree.kind(c) == NodeKind::OtherKeyword)
            .unwrap_or(tail.len());
        self.process_list(&tail[..end_at], state)?;
        if self.options.expand_case_statements {
            state.break_expected = true;
        }
        state.decrement_indent();
        self.process_list(&tail[end_at..], state)?;
        if parent_kind == Some(NodeKind::FunctionParens) {
            state.break_expected = true;
        }
        Ok(())
    }

    // --- BETWEEN ---

    fn process_between(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        let kids = self.kids(node);
        let lower = kids
            .iter()
            .position(|&c| self.tree.kind(c) == NodeKind::BetweenLowerBound);
        let upper = kids
            .iter()
            .position(|&c| self.tree.kind(c) == NodeKind::BetweenUpperBound);
        match (lower, upper) {
            (Some(li), Some(ui)) if li < ui => {
                self.process_list(&kids[..li], state)?;
                state.increment_indent();
                state.increment_indent();
                self.process_node(kids[li], state)?;
                if self.options.expand_between_conditions {
                    state.break_expected = true;
                }
                state.decrement_indent();
                self.process_list(&kids[li + 1..ui], state)?;
                state.increment_indent();
                self.process_list(&kids[ui..], state)?;
                state.decrement_indent();
                state.decrement_indent();
            }
            // Incomplete condition, already error-tagged upstream.
            _ => self.process_list(kids, state)?,
        }
        Ok(())
    }

    // --- parens ---

    fn paren_body(&self, node: NodeId) -> Vec<NodeId> {
        self.kids(node)
            .iter()
            .copied()
            .filter(|&c| {
                !matches!(
                    self.tree.kind(c),
                    NodeKind::OpenParens | NodeKind::CloseParens
                )
            })
            .collect()
    }

    fn process_small_parens(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        state.word_separator_expected = false;
        let has_case = self
            .kids(node)
            .iter()
            .any(|&c| self.tree.kind(c) == NodeKind::CaseStatement);
        if has_case {
            state.break_expected = true;
        }
        state.break_as_expected();
        state.add_content(&self.cased_operator("("), Some(CLASS_OPERATOR));
        let body = self.paren_body(node);
        state.increment_indent();
        self.process_list(&body, state)?;
        state.decrement_indent();
        state.break_as_expected();
        state.add_content(&self.cased_operator(")"), Some(CLASS_OPERATOR));
        state.word_separator_expected = true;
        Ok(())
    }

    fn process_large_parens(&mut self, node: NodeId, state: &mut RenderState) -> Result<()> {
        let kind = self.tree.kind(node);
        let entry_indent = state.indent_level;
        let saved_expand = self.options.expand_comma_lists;
        state.separate_words_opt(false);
        let recent = state.recent_keyword();
        let mut indent_after = false;

        if kind == NodeKind::DdlParens {
            match recent.as_deref() {
                Some("VALUES") => {
                    let row_count = self
                        .tree
                        .parent(node)
                        .map(|p| self.tree.children_by_kind(p, NodeKind::DdlParens).len())
                        .unwrap_or(1);
                    if row_count > 1 {
                        // Multi-row constructor: one row per line, values
                        // inside each row kept together.
                        self.options.expand_comma_lists = false;
                        state.add_line_break();
                        state.indent_current();
                    } else {
                        self.options.expand_comma_lists = true;
                        indent_after = true;
                        state.add_line_break();
                        state.decrement_indent();
                        state.indent_current();
                    }
                }
                _ => {
                    // Column definition lists, constraint lists.
                    indent_after = true;
                    state.add_line_break();
                    state.decrement_indent();
                    state.indent_current();
                }
            }
        } else {
            match recent.as_deref() {
                Some("TOP") => {}
                Some("INSERT") | Some("INSERT INTO") | Some("VALUES") | Some("IF") => {
                    indent_after = true;
                    state.add_line_break();
                    state.decrement_indent();
                    state.indent_current();
                }
                Some("AND") | Some("OR") => {
                    state.add_line_break();
                    state.indent_current();
                    indent_after = true;
                }
                _ => {
                    let parent_kind = self.tree.parent_kind(node);
                    let with_body = parent_kind == Some(NodeKind::ContainerGeneralContent)
                        && self
                            .tree
                            .parent(node)
                            .and_then(|p| self.tree.parent_kind(p))
                            == Some(NodeKind::DdlWithClause);
                    match parent_kind {
                        Some(NodeKind::SqlClause) | Some(NodeKind::DdlParens) => {
                            state.add_line_break();
                            state.indent_current();
                            indent_after = true;
                        }
                        Some(NodeKind::ExpressionParens) => {}
                        _ if with_body => {
                            state.add_line_break();
                            state.indent_current();
                            indent_after = true;
                        }
                        _ => {
                            state.add_line_break();
                            state.indent_current();
                        }
                    }
                }
            }
        }

        state.add_content(&self.cased_operator("("), Some(CLASS_OPERATOR));
        let mut inner = state.child();
        if indent_after {
            inner.increment_indent();
            inner.break_expected = true;
        }
        let body = self.paren_body(node);
        self.process_list(&body, &mut inner)?;

        if inner.break_expected || inner.contains_line_break() {
            if matches!(kind, NodeKind::DdlParens | NodeKind::ExpressionParens) {
                if !inner.starts_with_break() {
                    state.add_line_break();
                    state.break_expected = false;
                    state.source_break_pending = false;
                    state.word_separator_expected = false;
                }
                state.indent_current();
                state.assimilate(inner);
                state.add_line_break();
                state.indent_current();
            } else {
                if !inner.starts_with_break() {
                    state.break_to_next_line();
                }
                state.assimilate(inner);
                state.break_to_next_line();
            }
        } else {
            state.assimilate(inner);
        }

        state.add_content(&self.cased_operator(")"), Some(CLASS_OPERATOR));
        state.word_separator_expected = true;
        if indent_after && state.indent_level != entry_indent {
            state.increment_indent();
        }
        self.options.expand_comma_lists = saved_expand;
        Ok(())
    }

    // --- leaf helpers ---

    fn process_keyword(&mut self, node: NodeId, state: &mut RenderState) {
        let upper = self.leaf_upper(node);
        state.separate_words();
        state.add_content(
            &self.cased_keyword(self.tree.text(node)),
            Some(CLASS_KEYWORD),
        );
        state.word_separator_expected = true;

        let parent_kind = self.tree.parent_kind(node);
        match parent_kind {
            Some(NodeKind::DdlDeclareBlock) if upper == "DECLARE" => {
                let table_variable = self
                    .tree
                    .parent(node)
                    .and_then(|p| self.tree.child_by_kind(p, NodeKind::DdlParens))
                    .is_some();
                if !table_variable {
                    state.add_line_break();
                    state.indent_current();
                    state.word_separator_expected = false;
                }
            }
            Some(NodeKind::ContainerClose) => {
                state.statement_end_char_expected = true;
            }
            Some(NodeKind::SqlClause) | Some(NodeKind::ExpressionParens) => {
                match upper.as_str() {
                    "SELECT" => {
                        if !self.has_select_modifier(node) {
                            state.add_line_break();
                            state.indent_current();
                            state.word_separator_expected = false;
                        }
                    }
                    "DISTINCT" => {
                        state.add_line_break();
                        state.indent_current();
                        state.word_separator_expected = false;
                    }
                    "OUTPUT" => {
                        let after_exec = matches!(
                            state.recent_keyword().as_deref(),
                            Some("EXEC") | Some("EXECUTE")
                        );
                        if !after_exec {
                            state.add_line_break();
                            state.indent_current();
                            state.word_separator_expected = false;
                        }
                    }
                    "SET" => {
                        if state.recent_keyword().as_deref() == Some("UPDATE") {
                            state.add_line_break();
                            state.indent_current();
                            state.word_separator_expected = false;
                        } else {
                            state.statement_break_expected = true;
                        }
                    }
                    "USE" => {
                        state.statement_break_expected = true;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        state.set_recent_keyword(&upper);
    }

    fn has_select_modifier(&self, select: NodeId) -> bool {
        let Some(parent) = self.tree.parent(select) else {
            return false;
        };
        self.tree.children(parent).iter().any(|&sibling| {
            sibling != select
                && self.tree.kind(sibling) == NodeKind::OtherKeyword
                && matches!(self.leaf_upper(sibling).as_str(), "TOP" | "DISTINCT")
        })
    }

    fn process_comma(&mut self, node: NodeId, state: &mut RenderState) {
        let parent_kind = self.tree.parent_kind(node);
        let expanded = (self.options.expand_comma_lists
            && !matches!(
                parent_kind,
                Some(NodeKind::DdlDetailParens)
                    | Some(NodeKind::FunctionParens)
                    | Some(NodeKind::InParens)
            ))
            || (self.options.expand_in_lists && parent_kind == Some(NodeKind::InParens));
        if self.options.trailing_commas {
            state.break_as_expected();
            state.add_content(&self.cased_operator(","), Some(CLASS_OPERATOR));
            let in_values = state.recent_keyword().as_deref() == Some("VALUES");
            if expanded && !in_values {
                state.break_expected = true;
            } else {
                state.word_separator_expected = true;
            }
        } else if expanded {
            state.break_to_next_line();
            state.add_content(&self.cased_operator(","), Some(CLASS_OPERATOR));
            if self.options.space_after_expanded_comma {
                state.word_separator_expected = true;
            }
        } else {
            state.break_as_expected();
            state.add_content(&self.cased_operator(","), Some(CLASS_OPERATOR));
            state.word_separator_expected = true;
        }
    }

    fn process_whitespace(&mut self, node: NodeId, state: &mut RenderState) {
        if has_line_break(self.tree.text(node)) {
            // Trailing breaks inside a column list would detach the closing
            // parenthesis; drop them.
            let trailing_in_parens = self.tree.parent_kind(node) == Some(NodeKind::DdlParens)
                && self
                    .tree
                    .next_sibling(node)
                    .map(|n| self.tree.kind(n) == NodeKind::CloseParens)
                    .unwrap_or(true);
            if !trailing_in_parens {
                state.source_break_pending = true;
            }
        }
        if state.source_break_pending {
            if let Some(prev) = self.tree.prev_sibling(node) {
                // Content after a line comment must not join the comment
                // line.
                if matches!(
                    self.tree.kind(prev),
                    NodeKind::CommentSingleLine | NodeKind::CommentSingleLineCstyle
                ) {
                    state.break_expected = true;
                }
            }
        }
    }

    fn process_single_line_comment(&mut self, node: NodeId, state: &mut RenderState) {
        self.maybe_close_region(node, state);
        state.separate_comment(true);
        let formatted = normalize_line_comment(self.tree.text(node));
        match self.tree.parent_kind(node) {
            Some(NodeKind::DdlParens) => {
                let after_break = self
                    .tree
                    .prev_sibling(node)
                    .map(|p| {
                        self.tree.kind(p) == NodeKind::WhiteSpace
                            && has_line_break(self.tree.text(p))
                    })
                    .unwrap_or(false);
                if after_break {
                    state.indent(1);
                }
                state.add_content(&formatted, Some(CLASS_COMMENT));
                state.break_expected = true;
            }
            Some(NodeKind::SqlClause)
                if matches!(
                    state.recent_keyword().as_deref(),
                    Some("INSERT") | Some("INSERT INTO") | Some("UPDATE") | Some("DELETE")
                        | Some("DELETE FROM")
                ) =>
            {
                // Keep the comment attached; the break belongs to the
                // upcoming VALUES/SET content.
                state.add_content(&formatted, Some(CLASS_COMMENT));
            }
            _ => {
                state.add_content(&formatted, Some(CLASS_COMMENT));
                state.break_expected = true;
                state.source_break_pending = true;
            }
        }
        self.maybe_open_region(node, state, true);
    }

    fn process_multiline_comment(&mut self, node: NodeId, state: &mut RenderState) {
        self.maybe_close_region(node, state);
        state.separate_comment(false);
        state.add_content(self.tree.text(node), Some(CLASS_COMMENT));
        let followed_by_break = self
            .tree
            .next_sibling(node)
            .map(|n| {
                self.tree.kind(n) == NodeKind::WhiteSpace && has_line_break(self.tree.text(n))
            })
            .unwrap_or(false);
        if self.tree.parent_kind(node) == Some(NodeKind::SqlStatement) || followed_by_break {
            state.break_expected = true;
        } else {
            state.word_separator_expected = true;
        }
        self.maybe_open_region(node, state, false);
    }

    // --- [noformat]/[minify] regions ---

    fn maybe_close_region(&mut self, node: NodeId, state: &mut RenderState) {
        let Some(region) = state.special_region else {
            return;
        };
        let upper = self.tree.text(node).to_uppercase();
        let closes = match region {
            SpecialRegion::NoFormat => upper.contains("[/NOFORMAT]"),
            SpecialRegion::Minify => upper.contains("[/MINIFY]"),
        };
        if !closes {
            return;
        }
        let Some(start) = state.region_start else {
            state.special_region = None;
            return;
        };
        let leaves = self.tree.leaves_between(start, Some(node));
        let spliced = match region {
            SpecialRegion::NoFormat => {
                identity::render_leaves(self.tree, &leaves, self.options.html_coloring)
            }
            SpecialRegion::Minify => {
                obfuscate::render_leaves(self.tree, &leaves, self.options.html_coloring)
            }
        };
        state.special_region = None;
        state.region_start = None;
        state.add_raw(&spliced);
        state.word_separator_expected = false;
        state.break_expected = false;
    }

    fn maybe_open_region(&mut self, node: NodeId, state: &mut RenderState, break_first: bool) {
        if state.special_region.is_some() {
            return;
        }
        let upper = self.tree.text(node).to_uppercase();
        let region = if upper.contains("[NOFORMAT]") {
            Some(SpecialRegion::NoFormat)
        } else if upper.contains("[MINIFY]") {
            Some(SpecialRegion::Minify)
        } else {
            None
        };
        if let Some(region) = region {
            if break_first {
                state.add_line_break();
            }
            state.special_region = Some(region);
            state.region_start = Some(node);
        }
    }

    // --- text helpers ---

    fn first_significant_leaf(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .leaves(node)
            .into_iter()
            .find(|&l| !self.tree.kind(l).is_whitespace_or_comment())
    }

    /// True when `node` immediately follows a construct whose rendered tail
    /// is a block-closing END, with nothing between them in the source.
    fn follows_block_close(&self, node: NodeId) -> bool {
        let Some(prev) = self.tree.prev_sibling(node) else {
            return false;
        };
        if self.tree.kind(prev).is_whitespace_or_comment() {
            return false;
        }
        self.tree
            .leaves(prev)
            .into_iter()
            .rev()
            .find(|&l| !self.tree.kind(l).is_whitespace_or_comment())
            .map(|l| self.tree.parent_kind(l) == Some(NodeKind::ContainerClose))
            .unwrap_or(false)
    }

    fn leaf_upper(&self, node: NodeId) -> String {
        self.tree
            .simple_text(node)
            .unwrap_or(self.tree.text(node))
            .to_uppercase()
    }

    fn cased_keyword(&self, raw: &str) -> String {
        let upper = raw.to_uppercase();
        let base: &str = if self.options.keyword_standardization {
            keywords::standardized(&upper).unwrap_or(raw)
        } else {
            raw
        };
        if self.options.uppercase_keywords {
            base.to_uppercase()
        } else {
            base.to_lowercase()
        }
    }

    fn cased_operator(&self, raw: &str) -> String {
        if self.options.uppercase_keywords {
            raw.to_uppercase()
        } else {
            raw.to_lowercase()
        }
    }

    // --- list splitting ---

    fn split_at_kind(&self, node: NodeId, kind: NodeKind) -> (&'a [NodeId], &'a [NodeId]) {
        let kids = self.kids(node);
        match kids.iter().position(|&c| self.tree.kind(c) == kind) {
            Some(i) => (&kids[..i], &kids[i..]),
            None => (kids, &[]),
        }
    }

    fn split_after_first_significant(&self, node: NodeId) -> (&'a [NodeId], &'a [NodeId]) {
        let kids = self.kids(node);
        match kids
            .iter()
            .position(|&c| !self.tree.kind(c).is_whitespace_or_comment())
        {
            Some(i) => (&kids[..=i], &kids[i + 1..]),
            None => (kids, &[]),
        }
    }
}

fn has_line_break(text: &str) -> bool {
    memchr2(b'\n', b'\r', text.as_bytes()).is_some()
}

fn normalize_line_comment(raw: &str) -> String {
    if raw.len() <= 2 {
        return raw.to_string();
    }
    let (marker, rest) = raw.split_at(2);
    if rest.starts_with(' ') || rest.starts_with('-') || rest.starts_with('/') {
        raw.to_string()
    } else {
        format!("{marker} {rest}")
    }
}
