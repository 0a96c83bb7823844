//! Hand-written lexer for T-SQL source text.
//!
//! `tokenize` is total: any input produces a token sequence, and
//! concatenating the raw text of every token reproduces the input exactly.
//! Unterminated strings, quoted names, and block comments become best-effort
//! tokens spanning to end of input; deciding whether a token is *valid* is
//! the parser's job, not the tokenizer's.

use memchr::memchr;

use crate::keywords;
use crate::token::{Token, TokenKind};

/// Tokenize SQL source text into an ordered, lossless token sequence.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Whether any non-whitespace token has been emitted since the last
    /// line break. Needed to recognize the batch separator, which must be
    /// the only content on its line.
    line_has_content: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line_has_content: false,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let b = self.bytes[start];
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c => self.lex_whitespace(),
                b'-' if self.peek(1) == Some(b'-') => self.lex_line_comment(TokenKind::SingleLineComment),
                b'/' if self.peek(1) == Some(b'/') => {
                    self.lex_line_comment(TokenKind::SingleLineCommentCstyle)
                }
                b'/' if self.peek(1) == Some(b'*') => self.lex_block_comment(),
                b'[' => self.lex_delimited(b'[', b']', TokenKind::BracketQuotedName),
                b'"' => self.lex_delimited(b'"', b'"', TokenKind::QuotedString),
                b'\'' => self.lex_string(start, TokenKind::String),
                b'N' | b'n' if self.peek(1) == Some(b'\'') => {
                    self.pos += 1;
                    self.lex_string(start, TokenKind::NString);
                }
                b'0' if matches!(self.peek(1), Some(b'x') | Some(b'X')) => self.lex_binary(),
                b'0'..=b'9' => self.lex_number(),
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.lex_number(),
                b'$' => self.lex_monetary(),
                b'(' => self.lex_single(TokenKind::OpenParens),
                b')' => self.lex_single(TokenKind::CloseParens),
                b',' => self.lex_single(TokenKind::Comma),
                b'.' => self.lex_single(TokenKind::Period),
                b';' => self.lex_single(TokenKind::Semicolon),
                b':' if self.peek(1) == Some(b':') => {
                    self.emit(TokenKind::ScopeResolutionOperator, start, start + 2)
                }
                b'=' => self.lex_single(TokenKind::EqualsSign),
                b'*' => self.lex_single(TokenKind::Asterisk),
                b'!' | b'<' | b'>' | b'+' | b'-' | b'/' | b'%' | b'&' | b'|' | b'^' | b'~' => {
                    self.lex_operator()
                }
                _ if is_word_byte(b) => self.lex_word(),
                _ => {
                    // Unknown symbol (including any non-ASCII run): catch-all.
                    let mut end = start + 1;
                    while end < self.bytes.len()
                        && !self.bytes[end].is_ascii()
                        && !is_word_byte(self.bytes[end])
                    {
                        end += 1;
                    }
                    self.emit(TokenKind::Other, start, end);
                }
            }
        }
        self.tokens
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        if kind == TokenKind::WhiteSpace {
            if self.src[start..end].contains('\n') {
                self.line_has_content = false;
            }
        } else {
            self.line_has_content = true;
        }
        self.tokens.push(Token::new(kind, &self.src[start..end], start));
        self.pos = end;
    }

    fn lex_single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.emit(kind, start, start + 1);
    }

    fn lex_whitespace(&mut self) {
        let start = self.pos;
        let mut end = start;
        while end < self.bytes.len()
            && matches!(self.bytes[end], b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
        {
            end += 1;
        }
        self.emit(TokenKind::WhiteSpace, start, end);
    }

    fn lex_line_comment(&mut self, kind: TokenKind) {
        let start = self.pos;
        let end = match memchr(b'\n', &self.bytes[start..]) {
            Some(offset) => {
                // Keep a trailing \r with the whitespace token, not the comment.
                let mut e = start + offset;
                if e > start && self.bytes[e - 1] == b'\r' {
                    e -= 1;
                }
                e
            }
            None => self.bytes.len(),
        };
        self.emit(kind, start, end);
    }

    /// Block comment, honoring T-SQL's nested `/* */` pairs. An unterminated
    /// comment spans to end of input.
    fn lex_block_comment(&mut self) {
        let start = self.pos;
        let mut i = start + 2;
        let mut depth = 1usize;
        while i < self.bytes.len() {
            if self.bytes[i] == b'/' && self.bytes.get(i + 1) == Some(&b'*') {
                depth += 1;
                i += 2;
            } else if self.bytes[i] == b'*' && self.bytes.get(i + 1) == Some(&b'/') {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    break;
                }
            } else {
                i += 1;
            }
        }
        self.emit(TokenKind::MultiLineComment, start, i);
    }

    /// A `[...]` or `"..."` delimited name with doubled-delimiter escaping.
    fn lex_delimited(&mut self, open: u8, close: u8, kind: TokenKind) {
        let start = self.pos;
        debug_assert_eq!(self.bytes[start], open);
        let mut i = start + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == close {
                if self.bytes.get(i + 1) == Some(&close) {
                    i += 2;
                    continue;
                }
                i += 1;
                break;
            }
            i += 1;
        }
        self.emit(kind, start, i);
    }

    /// A string literal with doubled single-quote escaping. `start` points at
    /// the `N` prefix for unicode strings; `self.pos` points at the quote.
    fn lex_string(&mut self, start: usize, kind: TokenKind) {
        let mut i = self.pos + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == b'\'' {
                if self.bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                i += 1;
                break;
            }
            i += 1;
        }
        self.emit(kind, start, i);
    }

    fn lex_binary(&mut self) {
        let start = self.pos;
        let mut i = start + 2;
        while i < self.bytes.len() && self.bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        self.emit(TokenKind::BinaryValue, start, i);
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let mut i = start;
        while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < self.bytes.len() && self.bytes[i] == b'.' {
            i += 1;
            while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i < self.bytes.len()
            && matches!(self.bytes[i], b'e' | b'E')
            && matches!(
                self.bytes.get(i + 1),
                Some(b'0'..=b'9') | Some(b'+') | Some(b'-')
            )
        {
            i += 2;
            while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        self.emit(TokenKind::Number, start, i);
    }

    fn lex_monetary(&mut self) {
        let start = self.pos;
        let mut i = start + 1;
        if i < self.bytes.len() && self.bytes[i] == b'-' {
            i += 1;
        }
        while i < self.bytes.len() && (self.bytes[i].is_ascii_digit() || self.bytes[i] == b'.') {
            i += 1;
        }
        self.emit(TokenKind::MonetaryValue, start, i);
    }

    fn lex_operator(&mut self) {
        let start = self.pos;
        let two: Option<&str> = self
            .src
            .get(start..start + 2)
            .filter(|s| matches!(
                *s,
                "<>" | "!=" | ">=" | "<=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|="
                    | "^=" | "!<" | "!>"
            ));
        let end = if two.is_some() { start + 2 } else { start + 1 };
        self.emit(TokenKind::OtherOperator, start, end);
    }

    /// A run of word characters: keyword, compound keyword, batch separator,
    /// or catch-all "other" (identifiers, variables, temp tables).
    fn lex_word(&mut self) {
        let start = self.pos;
        let end = self.word_end(start);
        let word = &self.src[start..end];
        let upper = word.to_ascii_uppercase();

        if upper == "GO" && !self.line_has_content && !word_starts_with_marker(word) {
            if let Some(sep_end) = self.batch_separator_end(end) {
                self.emit(TokenKind::BatchSeparator, start, sep_end);
                return;
            }
        }

        if keywords::is_keyword(&upper) {
            if let Some((compound_end, simple)) = self.match_compound(&upper, end) {
                self.line_has_content = true;
                self.tokens
                    .push(Token::compound(&self.src[start..compound_end], &simple, start));
                self.pos = compound_end;
                return;
            }
            self.emit(TokenKind::Keyword, start, end);
            return;
        }

        self.emit(TokenKind::Other, start, end);
    }

    fn word_end(&self, start: usize) -> usize {
        let mut end = start;
        while end < self.bytes.len() && is_word_byte(self.bytes[end]) {
            end += 1;
        }
        end
    }

    /// `GO` is a batch separator only when its line holds nothing else but
    /// an optional integer repeat count. Returns the token end (covering the
    /// count, if any) or None when the line has other content.
    fn batch_separator_end(&self, word_end: usize) -> Option<usize> {
        let mut i = word_end;
        while i < self.bytes.len() && matches!(self.bytes[i], b' ' | b'\t') {
            i += 1;
        }
        let count_start = i;
        while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        let count_end = i;
        while i < self.bytes.len() && matches!(self.bytes[i], b' ' | b'\t' | b'\r') {
            i += 1;
        }
        if i < self.bytes.len() && self.bytes[i] != b'\n' {
            return None;
        }
        if count_end > count_start {
            Some(count_end)
        } else {
            Some(word_end)
        }
    }

    /// Longest-match scan for a compound keyword starting with the word
    /// already consumed (uppercased in `first`). Only whitespace may appear
    /// between the constituent words.
    fn match_compound(&self, first: &str, mut end: usize) -> Option<(usize, String)> {
        for seq in keywords::COMPOUND_KEYWORDS {
            if seq[0] != first {
                continue;
            }
            let mut cursor = end;
            let mut matched = true;
            for expected in &seq[1..] {
                let ws_end = self.skip_inline_whitespace(cursor);
                if ws_end == cursor {
                    matched = false;
                    break;
                }
                let w_end = self.word_end(ws_end);
                if w_end == ws_end
                    || !self.src[ws_end..w_end].eq_ignore_ascii_case(expected)
                {
                    matched = false;
                    break;
                }
                cursor = w_end;
            }
            if matched {
                end = cursor;
                return Some((end, seq.join(" ")));
            }
        }
        None
    }

    fn skip_inline_whitespace(&self, mut i: usize) -> usize {
        while i < self.bytes.len()
            && matches!(self.bytes[i], b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
        {
            i += 1;
        }
        i
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'#') || b >= 0x80
}

/// Variables/temp names start with a marker character and are never keywords.
fn word_starts_with_marker(word: &str) -> bool {
    word.starts_with('@') || word.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).into_iter().map(|t| t.kind).collect()
    }

    fn roundtrip(sql: &str) {
        let joined: String = tokenize(sql).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined, sql, "token concatenation must reproduce input");
    }

    #[test]
    fn test_simple_select() {
        let tokens = tokenize("SELECT a FROM t");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Keyword,
                TokenKind::WhiteSpace,
                TokenKind::Other,
                TokenKind::WhiteSpace,
                TokenKind::Keyword,
                TokenKind::WhiteSpace,
                TokenKind::Other,
            ]
        );
        roundtrip("SELECT a FROM t");
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let tokens = tokenize("'it''s' x");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "'it''s'");
        roundtrip("'it''s' x");
    }

    #[test]
    fn test_nstring() {
        let tokens = tokenize("N'été'");
        assert_eq!(tokens[0].kind, TokenKind::NString);
        assert_eq!(tokens[0].text, "N'été'");
    }

    #[test]
    fn test_unterminated_string_consumes_rest() {
        let tokens = tokenize("SELECT 'oops");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::String);
        assert_eq!(tokens.last().unwrap().text, "'oops");
        roundtrip("SELECT 'oops");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let tokens = tokenize("/* never closed");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::MultiLineComment);
        roundtrip("/* never closed");
    }

    #[test]
    fn test_nested_block_comment() {
        let sql = "/* outer /* inner */ still outer */ x";
        let tokens = tokenize(sql);
        assert_eq!(tokens[0].kind, TokenKind::MultiLineComment);
        assert_eq!(tokens[0].text, "/* outer /* inner */ still outer */");
        roundtrip(sql);
    }

    #[test]
    fn test_line_comment_forms() {
        assert_eq!(
            kinds("-- a\n// b"),
            vec![
                TokenKind::SingleLineComment,
                TokenKind::WhiteSpace,
                TokenKind::SingleLineCommentCstyle,
            ]
        );
        roundtrip("-- a\r\n// b");
    }

    #[test]
    fn test_bracket_and_quoted_names() {
        let tokens = tokenize("[with]]bracket] \"and\"\"quote\"");
        assert_eq!(tokens[0].kind, TokenKind::BracketQuotedName);
        assert_eq!(tokens[0].text, "[with]]bracket]");
        assert_eq!(tokens[2].kind, TokenKind::QuotedString);
        assert_eq!(tokens[2].text, "\"and\"\"quote\"");
    }

    #[test]
    fn test_number_forms() {
        for sql in ["42", "3.14", ".5", "1e10", "2.5E-3"] {
            let tokens = tokenize(sql);
            assert_eq!(tokens.len(), 1, "{}", sql);
            assert_eq!(tokens[0].kind, TokenKind::Number, "{}", sql);
        }
    }

    #[test]
    fn test_binary_and_monetary() {
        assert_eq!(kinds("0xAB1f")[0], TokenKind::BinaryValue);
        assert_eq!(kinds("$12.50")[0], TokenKind::MonetaryValue);
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("a <> b != c :: d");
        let ops: Vec<_> = tokens
            .iter()
            .filter(|t| !t.kind.is_whitespace_or_comment() && t.kind != TokenKind::Other)
            .collect();
        assert_eq!(ops[0].kind, TokenKind::OtherOperator);
        assert_eq!(ops[0].text, "<>");
        assert_eq!(ops[1].kind, TokenKind::OtherOperator);
        assert_eq!(ops[1].text, "!=");
        assert_eq!(ops[2].kind, TokenKind::ScopeResolutionOperator);
    }

    #[test]
    fn test_compound_keyword() {
        let tokens = tokenize("a LEFT  OUTER JOIN b");
        let compound = tokens
            .iter()
            .find(|t| t.kind == TokenKind::CompoundKeyword)
            .unwrap();
        assert_eq!(compound.text, "LEFT  OUTER JOIN");
        assert_eq!(compound.simple_text.as_deref(), Some("LEFT OUTER JOIN"));
        roundtrip("a LEFT  OUTER JOIN b");
    }

    #[test]
    fn test_batch_separator() {
        let tokens = tokenize("SELECT 1\nGO\nSELECT 2");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::BatchSeparator));

        let tokens = tokenize("GO 5\n");
        assert_eq!(tokens[0].kind, TokenKind::BatchSeparator);
        assert_eq!(tokens[0].text, "GO 5");

        // GO as an identifier-position word is not a separator
        let tokens = tokenize("SELECT go FROM t");
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::BatchSeparator));
    }

    #[test]
    fn test_variables_and_temp_tables() {
        let tokens = tokenize("@var #tmp @@rowcount");
        let others: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Other)
            .collect();
        assert_eq!(others.len(), 3);
    }

    #[test]
    fn test_lossless_on_garbage() {
        let sql = "SELECT ?? \u{2603} 'x\n[unclosed";
        roundtrip(sql);
    }
}
