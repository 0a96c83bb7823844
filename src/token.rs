use compact_str::CompactString;

/// Position in source string (byte offset).
pub type Pos = usize;

/// All token types recognized by the tokenizer.
///
/// Whitespace and comments are ordinary tokens: the tree built from these
/// tokens keeps every byte of the input, so the concatenated leaf text of a
/// parse reproduces the source exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    WhiteSpace,
    SingleLineComment,
    /// `// ...`, the alternate C-style single-line form.
    SingleLineCommentCstyle,
    MultiLineComment,
    Keyword,
    /// A multi-word keyword recognized as a unit (e.g. `LEFT OUTER JOIN`).
    /// Carries the original spacing in `text` and a single-spaced uppercase
    /// form in `simple_text`.
    CompoundKeyword,
    BracketQuotedName,
    QuotedString,
    String,
    NString,
    Number,
    BinaryValue,
    MonetaryValue,
    OpenParens,
    CloseParens,
    Comma,
    Period,
    Semicolon,
    EqualsSign,
    Asterisk,
    OtherOperator,
    ScopeResolutionOperator,
    /// A line consisting solely of the batch keyword `GO`, with an optional
    /// repeat count.
    BatchSeparator,
    /// Anything else: identifiers, variables, labels, unknown symbols.
    Other,
}

impl TokenKind {
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            Self::SingleLineComment | Self::SingleLineCommentCstyle | Self::MultiLineComment
        )
    }

    pub fn is_whitespace_or_comment(self) -> bool {
        self == Self::WhiteSpace || self.is_comment()
    }

    /// Tokens that end on a word character, so the minifier must keep a
    /// separator before a following word-start token.
    pub fn is_word_like(self) -> bool {
        matches!(
            self,
            Self::Keyword
                | Self::CompoundKeyword
                | Self::Number
                | Self::BinaryValue
                | Self::MonetaryValue
                | Self::BatchSeparator
                | Self::Other
        )
    }
}

/// An immutable token produced by the tokenizer.
///
/// `text` is the raw source slice including any delimiters (quotes, comment
/// markers), never a decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: CompactString,
    /// Single-spaced uppercase form, set only for compound keywords.
    pub simple_text: Option<CompactString>,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, pos: Pos) -> Self {
        Self {
            kind,
            text: CompactString::from(text),
            simple_text: None,
            pos,
        }
    }

    pub fn compound(text: &str, simple_text: &str, pos: Pos) -> Self {
        Self {
            kind: TokenKind::CompoundKeyword,
            text: CompactString::from(text),
            simple_text: Some(CompactString::from(simple_text)),
            pos,
        }
    }

    /// Uppercase keyword text for matching, single-spaced for compounds.
    pub fn keyword_text(&self) -> CompactString {
        match &self.simple_text {
            Some(simple) => simple.clone(),
            None => CompactString::from(self.text.to_ascii_uppercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_classification() {
        assert!(TokenKind::SingleLineComment.is_comment());
        assert!(TokenKind::SingleLineCommentCstyle.is_comment());
        assert!(TokenKind::MultiLineComment.is_comment());
        assert!(!TokenKind::Keyword.is_comment());
        assert!(TokenKind::WhiteSpace.is_whitespace_or_comment());
    }

    #[test]
    fn test_word_like() {
        assert!(TokenKind::Keyword.is_word_like());
        assert!(TokenKind::Number.is_word_like());
        assert!(!TokenKind::Comma.is_word_like());
        assert!(!TokenKind::OpenParens.is_word_like());
    }

    #[test]
    fn test_token_creation() {
        let tok = Token::new(TokenKind::Other, "foo", 5);
        assert_eq!(tok.kind, TokenKind::Other);
        assert_eq!(tok.text, "foo");
        assert_eq!(tok.pos, 5);
        assert!(tok.simple_text.is_none());
    }

    #[test]
    fn test_compound_keyword_text() {
        let tok = Token::compound("left  outer\tjoin", "LEFT OUTER JOIN", 0);
        assert_eq!(tok.keyword_text(), "LEFT OUTER JOIN");

        let plain = Token::new(TokenKind::Keyword, "select", 0);
        assert_eq!(plain.keyword_text(), "SELECT");
    }
}
