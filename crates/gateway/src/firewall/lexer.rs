//! A small SQL tokenizer.
//!
//! It understands just enough PostgreSQL lexical structure to tell keywords
//! apart from identifiers, string literals, quoted identifiers and comments.
//! It does not parse.

use thiserror::Error;

/// Kinds of token the firewall distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// `"quoted identifier"`.
    QuotedIdent,
    /// `'string'`, `E'string'`, or `$tag$dollar-quoted$tag$`.
    String,
    /// `0xFF` or `X'FF'`.
    Hex,
    /// Numeric literal.
    Number,
    /// `$1` positional parameter.
    Param,
    /// `-- line` or `/* block */` comment.
    Comment,
    /// `;`.
    Semicolon,
    /// Any other single character (operators, parentheses, commas).
    Punct,
}

/// One token with its source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// What was recognized.
    pub kind: TokenKind,
    /// Exact source text, quotes included.
    pub text: &'a str,
    /// Byte offset into the input.
    pub offset: usize,
}

impl Token<'_> {
    /// Whether this is the unquoted keyword `keyword` (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Input the tokenizer could not make sense of.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A `'` literal never closed.
    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),
    /// A `"` identifier never closed.
    #[error("unterminated quoted identifier at offset {0}")]
    UnterminatedIdentifier(usize),
    /// A `/*` comment never closed.
    #[error("unterminated comment at offset {0}")]
    UnterminatedComment(usize),
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn slice(&self, start: usize) -> &'a str {
        self.src.get(start..self.pos).unwrap_or_default()
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token {
            kind,
            text: self.slice(start),
            offset: start,
        }
    }

    /// Consume a quoted run starting at the opening `quote`; doubled quotes
    /// escape, and backslashes escape when `backslash` is set.
    fn quoted(&mut self, quote: u8, backslash: bool) -> bool {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            if backslash && b == b'\\' {
                self.pos += 1;
            } else if b == quote {
                if self.peek(0) == Some(quote) {
                    self.pos += 1;
                } else {
                    return true;
                }
            }
        }
        self.pos = self.bytes.len();
        false
    }

    /// `$tag$` opener at the current position, if any.
    fn dollar_tag(&self) -> Option<usize> {
        let mut end = self.pos + 1;
        while let Some(&b) = self.bytes.get(end) {
            if b == b'$' {
                return Some(end + 1 - self.pos);
            }
            let ok = if end == self.pos + 1 {
                b.is_ascii_alphabetic() || b == b'_'
            } else {
                b.is_ascii_alphanumeric() || b == b'_'
            };
            if !ok {
                return None;
            }
            end += 1;
        }
        None
    }

    fn next_token(&mut self) -> Option<Result<Token<'a>, LexError>> {
        while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let start = self.pos;
        let b = self.peek(0)?;

        let kind = match b {
            b'-' if self.peek(1) == Some(b'-') => {
                while self.peek(0).is_some_and(|c| c != b'\n') {
                    self.pos += 1;
                }
                TokenKind::Comment
            }
            b'/' if self.peek(1) == Some(b'*') => {
                self.pos += 2;
                let mut depth = 1_u32;
                while depth > 0 {
                    match (self.peek(0), self.peek(1)) {
                        (None, _) => return Some(Err(LexError::UnterminatedComment(start))),
                        (Some(b'*'), Some(b'/')) => {
                            depth -= 1;
                            self.pos += 2;
                        }
                        (Some(b'/'), Some(b'*')) => {
                            depth += 1;
                            self.pos += 2;
                        }
                        _ => self.pos += 1,
                    }
                }
                TokenKind::Comment
            }
            b'\'' => {
                if !self.quoted(b'\'', false) {
                    return Some(Err(LexError::UnterminatedString(start)));
                }
                TokenKind::String
            }
            b'"' => {
                if !self.quoted(b'"', false) {
                    return Some(Err(LexError::UnterminatedIdentifier(start)));
                }
                TokenKind::QuotedIdent
            }
            b'$' => {
                if let Some(len) = self.dollar_tag() {
                    let tag = self.src.get(start..start + len).unwrap_or_default();
                    self.pos += len;
                    match self.src.get(self.pos..).and_then(|rest| rest.find(tag)) {
                        Some(close) => self.pos += close + len,
                        None => return Some(Err(LexError::UnterminatedString(start))),
                    }
                    TokenKind::String
                } else if self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                    while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    TokenKind::Param
                } else {
                    self.pos += 1;
                    TokenKind::Punct
                }
            }
            b'0' if matches!(self.peek(1), Some(b'x' | b'X'))
                && self.peek(2).is_some_and(|c| c.is_ascii_hexdigit()) =>
            {
                self.pos += 2;
                while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                    self.pos += 1;
                }
                TokenKind::Hex
            }
            b'0'..=b'9' => {
                self.number();
                TokenKind::Number
            }
            b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.number();
                TokenKind::Number
            }
            b'x' | b'X' | b'b' | b'B' if self.peek(1) == Some(b'\'') => {
                self.pos += 1;
                if !self.quoted(b'\'', false) {
                    return Some(Err(LexError::UnterminatedString(start)));
                }
                TokenKind::Hex
            }
            b'e' | b'E' if self.peek(1) == Some(b'\'') => {
                self.pos += 1;
                if !self.quoted(b'\'', true) {
                    return Some(Err(LexError::UnterminatedString(start)));
                }
                TokenKind::String
            }
            b'n' | b'N' if self.peek(1) == Some(b'\'') => {
                self.pos += 1;
                if !self.quoted(b'\'', false) {
                    return Some(Err(LexError::UnterminatedString(start)));
                }
                TokenKind::String
            }
            b';' => {
                self.pos += 1;
                TokenKind::Semicolon
            }
            _ if b.is_ascii_alphabetic() || b == b'_' || b >= 0x80 => {
                while self
                    .peek(0)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80)
                {
                    self.pos += 1;
                }
                TokenKind::Word
            }
            _ => {
                self.pos += 1;
                TokenKind::Punct
            }
        };

        Some(Ok(self.token(kind, start)))
    }

    fn number(&mut self) {
        while self
            .peek(0)
            .is_some_and(|c| c.is_ascii_digit() || c == b'.' || c == b'_')
        {
            self.pos += 1;
        }
        if matches!(self.peek(0), Some(b'e' | b'E'))
            && (self.peek(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek(1), Some(b'+' | b'-'))
                    && self.peek(2).is_some_and(|c| c.is_ascii_digit())))
        {
            self.pos += 2;
            while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
    }
}

/// Split `src` into tokens, whitespace dropped.
///
/// # Errors
///
/// Returns `LexError` for unterminated literals, identifiers or comments.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token?);
    }
    Ok(tokens)
}
