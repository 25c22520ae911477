//! Engine error handling.
//!
//! Errors are data, not prose: every failure carries a closed [`ErrorKind`],
//! the position it happened at, and (for assignment failures) the qualified
//! name of the destination field. The engine returns errors rather than
//! panicking; the only unrecoverable kind, [`ErrorKind::GrammarAbort`], is
//! one no recovery point is allowed to swallow, which aborts the parse
//! without aborting the process.
//!
//! A [`SourceContext`] can be attached at the engine boundary so errors
//! render as full `miette` diagnostics with source excerpts; the engine core
//! never needs the source text itself.

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::token::{Position, Token};

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// Named source text for diagnostic rendering.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

/// Every failure mode of the engine, as a closed enum.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Match-time failures.
    #[error("unexpected token {got:?} (expected {expected})")]
    UnexpectedToken { got: String, expected: String },
    #[error("sub-expression {expr} cannot be empty")]
    SubExpressionEmpty { expr: String },
    #[error("sub-expression {expr} must match at least once")]
    SubExpressionTooFew { expr: String },

    // Assignment-time failures.
    #[error("invalid integer {value:?}")]
    InvalidInteger { value: String },
    #[error("invalid float {value:?}")]
    InvalidFloat { value: String },
    #[error("{actual} value is not the correct type (expected {expected})")]
    TypeMismatch { expected: String, actual: String },
    #[error("unsupported destination for {field}")]
    UnsupportedFieldType { field: String },
    #[error("capture failed: {message}")]
    CaptureFailed { message: String },

    // Forwarded from the token source.
    #[error("lexer error: {message}")]
    Lexer { message: String },

    // Degenerate-grammar conditions. Unrecoverable: speculation may not
    // swallow these, so they always abort the parse.
    #[error("{message}")]
    GrammarAbort { message: String },
}

impl ErrorKind {
    /// Stable suffix used in diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::UnexpectedToken { .. } => "unexpected_token",
            Self::SubExpressionEmpty { .. } => "sub_expression_empty",
            Self::SubExpressionTooFew { .. } => "sub_expression_too_few",
            Self::InvalidInteger { .. } => "invalid_integer",
            Self::InvalidFloat { .. } => "invalid_float",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnsupportedFieldType { .. } => "unsupported_field_type",
            Self::CaptureFailed { .. } => "capture_failed",
            Self::Lexer { .. } => "lexer",
            Self::GrammarAbort { .. } => "grammar_abort",
        }
    }

    /// Coarse grouping, convenient for test assertions.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnexpectedToken { .. }
            | Self::SubExpressionEmpty { .. }
            | Self::SubExpressionTooFew { .. } => ErrorCategory::Match,
            Self::InvalidInteger { .. }
            | Self::InvalidFloat { .. }
            | Self::TypeMismatch { .. }
            | Self::UnsupportedFieldType { .. }
            | Self::CaptureFailed { .. } => ErrorCategory::Assignment,
            Self::Lexer { .. } => ErrorCategory::Lexer,
            Self::GrammarAbort { .. } => ErrorCategory::Grammar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Match,
    Assignment,
    Lexer,
    Grammar,
}

impl ErrorCategory {
    const fn code_segment(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Assignment => "assign",
            Self::Lexer => "lex",
            Self::Grammar => "grammar",
        }
    }
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

/// A parse failure: what went wrong, where, and into which field.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub pos: Position,
    /// Qualified destination (`Type.field`) for assignment failures.
    pub field: Option<String>,
    pub help: Option<String>,
    len: usize,
    source: Option<Arc<NamedSource<String>>>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, pos: Position) -> Self {
        Self {
            kind,
            pos,
            field: None,
            help: None,
            len: 1,
            source: None,
        }
    }

    /// An error labeled with the span of the offending token.
    pub fn at_token(kind: ErrorKind, token: &Token) -> Self {
        Self::new(kind, token.pos).with_len(token.value.len().max(1))
    }

    /// The usual "expected X, got Y" failure at the given token.
    pub fn unexpected_token(got: &Token, expected: impl Into<String>) -> Self {
        Self::at_token(
            ErrorKind::UnexpectedToken {
                got: got.to_string(),
                expected: expected.into(),
            },
            got,
        )
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Record the qualified destination field, keeping the innermost one.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        if self.field.is_none() {
            self.field = Some(field.into());
        }
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_source(mut self, context: &SourceContext) -> Self {
        self.source = Some(context.to_named_source());
        self
    }

    pub(crate) fn relocate(mut self, pos: Position, len: usize) -> Self {
        self.pos = pos;
        self.len = len;
        self
    }

    /// True for failures no recovery point may swallow.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::GrammarAbort { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    fn primary_label(&self) -> &'static str {
        match self.kind {
            ErrorKind::UnexpectedToken { .. } => "unexpected token",
            ErrorKind::SubExpressionEmpty { .. } => "matched nothing here",
            ErrorKind::SubExpressionTooFew { .. } => "matched too few times",
            ErrorKind::InvalidInteger { .. } => "invalid integer",
            ErrorKind::InvalidFloat { .. } => "invalid float",
            ErrorKind::TypeMismatch { .. } => "type mismatch",
            ErrorKind::UnsupportedFieldType { .. } => "unsupported destination",
            ErrorKind::CaptureFailed { .. } => "capture failed here",
            ErrorKind::Lexer { .. } => "lexer failure",
            ErrorKind::GrammarAbort { .. } => "grammar cannot make progress",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.pos)?;
        if let Some(field) = &self.field {
            write!(f, "{field}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ParseError {}

impl Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!(
            "anvaya::{}::{}",
            self.category().code_segment(),
            self.kind.code_suffix()
        )))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = SourceSpan::from(self.pos.offset..self.pos.offset + self.len);
        let label = LabeledSpan::new_with_span(Some(self.primary_label().to_string()), span);
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source
            .as_ref()
            .map(|s| &**s as &dyn miette::SourceCode)
    }
}
