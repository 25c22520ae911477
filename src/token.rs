//! Token stream and cursors.
//!
//! The engine is lexer-agnostic: any tokenizer that can produce a sequence of
//! `(kind, value, position)` tokens can feed it. A [`TokenStream`] owns the
//! full token sequence, including token kinds the stream is configured to
//! elide (whitespace-like kinds that grammar positions skip over), and a
//! [`Cursor`] is a cheap copyable view used for speculative scanning.
//!
//! Two families of cursor operations exist side by side: `peek`/`next` skip
//! elided kinds, while `raw_peek`/`raw_cursor`/`range` see every token. The
//! raw family is what precise token-range capture is built on.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::errors::{ErrorKind, ParseError};

/// Opaque token kind handle, assigned by the tokenizer.
pub type TokenKind = i32;

/// Wildcard kind: a literal declared with this kind matches any token kind.
pub const ANY_KIND: TokenKind = -1;

/// Kind of the synthetic end-of-input token terminating every stream.
pub const EOF_KIND: TokenKind = -2;

/// A location in the source text.
///
/// Ordered by byte offset, so positions from the same source compare the way
/// the text reads.
///
/// # Examples
///
/// ```rust
/// use anvaya::token::Position;
/// let a = Position::new(0, 1, 1);
/// let b = Position::new(5, 1, 6);
/// assert!(a < b);
/// assert_eq!(b.to_string(), "1:6");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Position of the first byte of a source.
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One lexed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            value: value.into(),
            pos,
        }
    }

    /// The synthetic terminator token.
    pub fn eof(pos: Position) -> Self {
        Self::new(EOF_KIND, "", pos)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == EOF_KIND
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            write!(f, "<EOF>")
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// The full token sequence for one parse, elided kinds included.
///
/// The stream is always terminated by an EOF token; cursors saturate at it
/// rather than running off the end.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    elide: HashSet<TokenKind>,
}

impl TokenStream {
    /// Build a stream from already-lexed tokens. `elide` names the token
    /// kinds that `peek`/`next` skip over.
    pub fn new(mut tokens: Vec<Token>, elide: HashSet<TokenKind>) -> Self {
        if !tokens.last().map(Token::is_eof).unwrap_or(false) {
            let pos = tokens
                .last()
                .map(|t| {
                    Position::new(
                        t.pos.offset + t.value.len(),
                        t.pos.line,
                        t.pos.column + t.value.chars().count() as u32,
                    )
                })
                .unwrap_or_else(Position::start);
            tokens.push(Token::eof(pos));
        }
        Self { tokens, elide }
    }

    /// Drain a fallible token source, forwarding the first tokenizer failure
    /// as a [`ErrorKind::Lexer`] error.
    pub fn collect<I, E>(source: I, elide: HashSet<TokenKind>) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = Result<Token, E>>,
        E: fmt::Display,
    {
        let mut tokens = Vec::new();
        for item in source {
            match item {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    let pos = tokens.last().map(|t: &Token| t.pos).unwrap_or_default();
                    return Err(ParseError::new(
                        ErrorKind::Lexer {
                            message: e.to_string(),
                        },
                        pos,
                    ));
                }
            }
        }
        Ok(Self::new(tokens, elide))
    }

    pub fn is_elided(&self, kind: TokenKind) -> bool {
        self.elide.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        // Never true in practice: the EOF terminator is always present.
        self.tokens.is_empty()
    }

    /// A cursor positioned at the start of the stream.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { stream: self, at: 0 }
    }

    fn at(&self, index: usize) -> &Token {
        &self.tokens[index.min(self.tokens.len() - 1)]
    }
}

/// A raw index into a [`TokenStream`], with both elision-aware and raw views.
///
/// Copying a cursor is how speculation forks its read position; nothing in
/// the stream itself is mutated by scanning.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'t> {
    stream: &'t TokenStream,
    at: usize,
}

impl<'t> Cursor<'t> {
    /// The `k`-th upcoming non-elided token, without consuming anything.
    pub fn peek(&self, k: usize) -> &'t Token {
        let mut index = self.at;
        let mut remaining = k;
        loop {
            let token = self.stream.at(index);
            if token.is_eof() {
                return token;
            }
            if self.stream.is_elided(token.kind) {
                index += 1;
                continue;
            }
            if remaining == 0 {
                return token;
            }
            remaining -= 1;
            index += 1;
        }
    }

    /// Consume and return the next non-elided token. At end of input the EOF
    /// token is returned and the cursor does not move.
    pub fn next(&mut self) -> &'t Token {
        loop {
            let token = self.stream.at(self.at);
            if token.is_eof() {
                return token;
            }
            self.at += 1;
            if !self.stream.is_elided(token.kind) {
                return token;
            }
        }
    }

    /// The `k`-th upcoming token counting elided ones.
    pub fn raw_peek(&self, k: usize) -> &'t Token {
        self.stream.at(self.at + k)
    }

    /// The raw index of the cursor, usable with [`Cursor::range`].
    pub fn raw_cursor(&self) -> usize {
        self.at
    }

    /// All tokens in `[start, end)`, elided ones included.
    pub fn range(&self, start: usize, end: usize) -> &'t [Token] {
        let len = self.stream.tokens.len();
        &self.stream.tokens[start.min(len)..end.min(len)]
    }

    pub(crate) fn rewind(&mut self, raw: usize) {
        self.at = raw;
    }

    /// Count of non-elided tokens in `[start, end)`.
    pub(crate) fn significant_between(&self, start: usize, end: usize) -> usize {
        self.range(start, end)
            .iter()
            .filter(|t| !t.is_eof() && !self.stream.is_elided(t.kind))
            .count()
    }
}
