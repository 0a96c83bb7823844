//! The lossless parse tree.
//!
//! Nodes live in an arena (`Vec<NodeData>`); children are owned exclusively
//! by their parent's child list, and the parent link is a plain index back
//! into the arena, so ownership is strictly top-down and cycles are
//! structurally impossible. Concatenating the text of every leaf in document
//! order reproduces the parsed input exactly.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::token::{Token, TokenKind};

/// Index into the tree arena.
pub type NodeId = usize;

pub type ChildVec = SmallVec<[NodeId; 4]>;

/// The closed set of syntactic categories. Grouping kinds have children and
/// no text; leaf kinds carry the raw source text of a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // --- grouping nodes ---
    Root,
    SqlStatement,
    SqlClause,
    SetOperatorClause,
    BatchSeparator,
    BeginEndBlock,
    TryBlock,
    CatchBlock,
    CaseStatement,
    CaseInput,
    CaseWhen,
    CaseThen,
    CaseElse,
    IfStatement,
    ElseClause,
    WhileLoop,
    BooleanExpression,
    AndOperator,
    OrOperator,
    BetweenCondition,
    BetweenLowerBound,
    BetweenUpperBound,
    ContainerOpen,
    ContainerClose,
    ContainerSingleStatement,
    ContainerMultiStatement,
    ContainerGeneralContent,
    SelectionTarget,
    SelectionTargetParens,
    ExpressionParens,
    FunctionParens,
    InParens,
    DdlParens,
    DdlDetailParens,
    DdlProceduralBlock,
    DdlOtherBlock,
    DdlDeclareBlock,
    DdlAsBlock,
    DdlReturns,
    DdlWithClause,
    CteWithClause,
    CteAlias,
    CteAsBlock,
    CursorDeclaration,
    CursorForBlock,
    CursorForOptions,
    BeginTransaction,
    SaveTransaction,
    CommitTransaction,
    RollbackTransaction,
    PermissionsBlock,
    PermissionsDetail,
    PermissionsTarget,
    PermissionsRecipient,
    MergeClause,
    MergeTarget,
    MergeUsing,
    MergeCondition,
    MergeWhen,
    MergeThen,
    MergeAction,
    JoinOnSection,
    // --- leaf nodes ---
    OpenParens,
    CloseParens,
    WhiteSpace,
    CommentSingleLine,
    CommentSingleLineCstyle,
    CommentMultiLine,
    StringLiteral,
    NStringLiteral,
    QuotedString,
    BracketQuotedName,
    NumberValue,
    BinaryValue,
    MonetaryValue,
    Comma,
    Period,
    Semicolon,
    EqualsSign,
    Asterisk,
    OtherOperator,
    ScopeResolutionOperator,
    CompoundKeyword,
    OtherKeyword,
    DataTypeKeyword,
    FunctionKeyword,
    PseudoName,
    OtherNode,
}

impl NodeKind {
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            Self::CommentSingleLine | Self::CommentSingleLineCstyle | Self::CommentMultiLine
        )
    }

    pub fn is_whitespace_or_comment(self) -> bool {
        self == Self::WhiteSpace || self.is_comment()
    }

    /// Kinds that never carry children.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            Self::OpenParens
                | Self::CloseParens
                | Self::WhiteSpace
                | Self::CommentSingleLine
                | Self::CommentSingleLineCstyle
                | Self::CommentMultiLine
                | Self::StringLiteral
                | Self::NStringLiteral
                | Self::QuotedString
                | Self::BracketQuotedName
                | Self::NumberValue
                | Self::BinaryValue
                | Self::MonetaryValue
                | Self::Comma
                | Self::Period
                | Self::Semicolon
                | Self::EqualsSign
                | Self::Asterisk
                | Self::OtherOperator
                | Self::ScopeResolutionOperator
                | Self::CompoundKeyword
                | Self::OtherKeyword
                | Self::DataTypeKeyword
                | Self::FunctionKeyword
                | Self::PseudoName
                | Self::OtherNode
        )
    }

    /// The leaf kind for a token, before any parser reclassification.
    pub fn for_token(token: &Token) -> NodeKind {
        match token.kind {
            TokenKind::WhiteSpace => Self::WhiteSpace,
            TokenKind::SingleLineComment => Self::CommentSingleLine,
            TokenKind::SingleLineCommentCstyle => Self::CommentSingleLineCstyle,
            TokenKind::MultiLineComment => Self::CommentMultiLine,
            TokenKind::String => Self::StringLiteral,
            TokenKind::NString => Self::NStringLiteral,
            TokenKind::QuotedString => Self::QuotedString,
            TokenKind::BracketQuotedName => Self::BracketQuotedName,
            TokenKind::Number => Self::NumberValue,
            TokenKind::BinaryValue => Self::BinaryValue,
            TokenKind::MonetaryValue => Self::MonetaryValue,
            TokenKind::Comma => Self::Comma,
            TokenKind::Period => Self::Period,
            TokenKind::Semicolon => Self::Semicolon,
            TokenKind::EqualsSign => Self::EqualsSign,
            TokenKind::Asterisk => Self::Asterisk,
            TokenKind::OtherOperator => Self::OtherOperator,
            TokenKind::ScopeResolutionOperator => Self::ScopeResolutionOperator,
            TokenKind::CompoundKeyword => Self::CompoundKeyword,
            TokenKind::Keyword => Self::OtherKeyword,
            TokenKind::OpenParens => Self::OpenParens,
            TokenKind::CloseParens => Self::CloseParens,
            // The parser wraps GO in a structural batch separator node.
            TokenKind::BatchSeparator => Self::OtherKeyword,
            TokenKind::Other => Self::OtherNode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    /// Raw source text; non-empty only for leaves.
    pub text: CompactString,
    /// Single-spaced uppercase form, set for compound keyword leaves.
    pub simple_text: Option<CompactString>,
    pub parent: Option<NodeId>,
    pub children: ChildVec,
    pub has_error: bool,
}

/// An arena-backed parse tree rooted at node 0.
#[derive(Debug, Clone)]
pub struct SqlTree {
    nodes: Vec<NodeData>,
}

pub const ROOT: NodeId = 0;

impl SqlTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                text: CompactString::default(),
                simple_text: None,
                parent: None,
                children: ChildVec::new(),
                has_error: false,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    fn alloc(&mut self, kind: NodeKind, text: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind,
            text: CompactString::from(text),
            simple_text: None,
            parent: None,
            children: ChildVec::new(),
            has_error: false,
        });
        id
    }

    /// Create a detached node. It must be attached with `append` or one of
    /// the insert operations before the tree is considered consistent.
    pub fn new_node(&mut self, kind: NodeKind, text: &str) -> NodeId {
        self.alloc(kind, text)
    }

    /// Create a node and append it as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, kind: NodeKind, text: &str) -> NodeId {
        let id = self.alloc(kind, text);
        self.append(parent, id);
        id
    }

    /// Create a leaf node from a token and append it under `parent`.
    pub fn add_token(&mut self, parent: NodeId, kind: NodeKind, token: &Token) -> NodeId {
        let id = self.add_child(parent, kind, &token.text);
        self.nodes[id].simple_text = token.simple_text.clone();
        id
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, id: NodeId) {
        debug_assert!(self.nodes[id].parent.is_none());
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.push(id);
    }

    /// Attach a detached node at `index` within `parent`'s child list.
    pub fn insert_child_at(&mut self, parent: NodeId, index: usize, id: NodeId) {
        debug_assert!(self.nodes[id].parent.is_none());
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.insert(index, id);
    }

    /// Attach a detached node immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, id: NodeId) {
        let parent = self.nodes[sibling].parent.expect("sibling must be attached");
        let index = self.child_index(parent, sibling);
        self.insert_child_at(parent, index, id);
    }

    /// Detach a node from its parent. The node and its subtree remain in the
    /// arena and can be re-attached elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            let index = self.child_index(parent, id);
            self.nodes[parent].children.remove(index);
        }
    }

    /// Replace `old` with `new` in the parent's child list; `old` is
    /// detached, `new` must be detached beforehand.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes[old].parent.expect("node must be attached");
        let index = self.child_index(parent, old);
        self.nodes[old].parent = None;
        self.nodes[new].parent = Some(parent);
        self.nodes[parent].children[index] = new;
    }

    fn child_index(&self, parent: NodeId, child: NodeId) -> usize {
        self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == child)
            .expect("child list out of sync with parent link")
    }

    // --- accessors ---

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn simple_text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].simple_text.as_deref()
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id].kind = kind;
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].text = CompactString::from(text);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn parent_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.parent(id).map(|p| self.kind(p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id].parent?;
        let index = self.child_index(parent, id);
        self.nodes[parent].children.get(index + 1).copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id].parent?;
        let index = self.child_index(parent, id);
        index.checked_sub(1).map(|i| self.nodes[parent].children[i])
    }

    pub fn child_by_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.kind(c) == kind)
    }

    pub fn children_by_kind(&self, id: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.kind(c) == kind)
            .collect()
    }

    /// Nearest ancestor (including `id` itself) of the given kind.
    pub fn ancestor_of_kind(&self, mut id: NodeId, kind: NodeKind) -> Option<NodeId> {
        loop {
            if self.kind(id) == kind {
                return Some(id);
            }
            id = self.parent(id)?;
        }
    }

    // --- error tracking ---

    /// Mark a node as unrecognized content. The flag also propagates to the
    /// root so callers can test for errors without walking the tree.
    pub fn tag_error(&mut self, id: NodeId) {
        self.nodes[id].has_error = true;
        self.nodes[ROOT].has_error = true;
    }

    pub fn node_has_error(&self, id: NodeId) -> bool {
        self.nodes[id].has_error
    }

    pub fn has_errors(&self) -> bool {
        self.nodes[ROOT].has_error
    }

    // --- document-order traversal ---

    /// All leaves of the subtree at `id`, in document order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(id, &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if self.nodes[id].children.is_empty() {
            if !self.nodes[id].text.is_empty() {
                out.push(id);
            }
            return;
        }
        for &child in self.nodes[id].children.iter() {
            self.collect_leaves(child, out);
        }
    }

    /// Concatenated leaf text of the subtree at `id`, in document order.
    pub fn subtree_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for leaf in self.leaves(id) {
            out.push_str(self.text(leaf));
        }
        out
    }

    /// Leaves strictly after the subtree of `start` and strictly before the
    /// subtree of `end` (document order). `end = None` means "to the end of
    /// the document". Used to extract `[noformat]`/`[minify]` region bodies.
    pub fn leaves_between(&self, start: NodeId, end: Option<NodeId>) -> Vec<NodeId> {
        let all = self.leaves(ROOT);
        let start_last = *self.leaves(start).last().unwrap_or(&start);
        let mut out = Vec::new();
        let mut active = false;
        for leaf in all {
            if Some(leaf) == end {
                break;
            }
            if active {
                out.push(leaf);
            }
            if leaf == start_last {
                active = true;
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for SqlTree {
    fn default() -> Self {
        Self::new()
    }
}
