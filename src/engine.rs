//! The parse driver: wires a token stream, an operator tree and a type
//! registry together, runs the root node, and shapes the result for callers.
//!
//! On failure the deepest-error witness decides which diagnostic surfaces:
//! the alternative that consumed the most input before failing is almost
//! always the one the author meant to write.

use std::sync::Arc;

use crate::context::{ParseConfig, ParseContext};
use crate::errors::{ErrorKind, ParseError, SourceContext};
use crate::grammar::{Node, NodeOutcome};
use crate::schema::TypeRegistry;
use crate::token::{Position, TokenKind, TokenStream};
use crate::value::{StructValue, Value};

/// Outcome of a parse that may have produced both a value and an error: a
/// failing parse still hands back whatever part of the tree it built.
#[derive(Debug, Clone)]
pub struct PartialParse {
    pub value: Option<Value>,
    pub error: Option<ParseError>,
}

impl PartialParse {
    /// Collapse to a plain result, preferring the error when both exist.
    pub fn into_result(self) -> Result<Value, ParseError> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err(ParseError::new(
                ErrorKind::GrammarAbort {
                    message: "parse produced neither a value nor an error".to_string(),
                },
                Position::default(),
            )),
        }
    }
}

/// A reusable parser: one operator tree plus its type registry and per-parse
/// configuration. The tree is immutable, so a parser may be shared freely;
/// every call to [`Parser::parse`] runs with its own context.
pub struct Parser {
    registry: Arc<TypeRegistry>,
    root: Node,
    config: ParseConfig,
    source: Option<SourceContext>,
}

impl Parser {
    pub fn new(registry: Arc<TypeRegistry>, root: Node) -> Self {
        Self {
            registry,
            root,
            config: ParseConfig::default(),
            source: None,
        }
    }

    /// Override the repetition ceiling for this parser.
    pub fn max_iterations(mut self, ceiling: usize) -> Self {
        self.config.max_iterations = ceiling;
        self
    }

    /// Allow speculative branches to consume up to `n` significant tokens
    /// and still back out of a failure.
    pub fn lookahead(mut self, n: usize) -> Self {
        self.config.lookahead = n;
        self
    }

    /// Accept leftover tokens after the root match.
    pub fn allow_trailing(mut self, allow: bool) -> Self {
        self.config.allow_trailing = allow;
        self
    }

    /// Compare literals of these token kinds case-insensitively.
    pub fn case_insensitive(mut self, kinds: impl IntoIterator<Item = TokenKind>) -> Self {
        self.config.case_insensitive.extend(kinds);
        self
    }

    /// Attach source text so surfaced errors render with excerpts.
    pub fn source(mut self, context: SourceContext) -> Self {
        self.source = Some(context);
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Parse to completion, surfacing the partial value tree alongside any
    /// error.
    pub fn parse_partial(&self, stream: &TokenStream) -> PartialParse {
        let mut ctx = ParseContext::new(stream, &self.config, &self.registry);
        let parent = match &self.root {
            Node::Struct { type_id, .. } | Node::Custom { type_id, .. } => {
                self.registry.instantiate(*type_id)
            }
            _ => StructValue::anonymous(),
        };
        let partial = match self.root.parse(&mut ctx, &parent) {
            NodeOutcome::Match(values) => {
                let token = ctx.peek(0);
                if !self.config.allow_trailing && !token.is_eof() {
                    let error =
                        ctx.deepest_error(ParseError::unexpected_token(token, "end of input"));
                    PartialParse {
                        value: values.into_iter().next(),
                        error: Some(error),
                    }
                } else {
                    PartialParse {
                        value: values.into_iter().next(),
                        error: None,
                    }
                }
            }
            NodeOutcome::NoMatch => {
                let token = ctx.peek(0);
                let error =
                    ctx.deepest_error(ParseError::unexpected_token(token, self.root.to_string()));
                PartialParse {
                    value: None,
                    error: Some(error),
                }
            }
            NodeOutcome::Fail { partial, error } => PartialParse {
                value: partial.into_iter().next(),
                error: Some(error),
            },
        };
        self.attach_source(partial)
    }

    /// Parse to completion, failing on any error.
    pub fn parse(&self, stream: &TokenStream) -> Result<Value, ParseError> {
        self.parse_partial(stream).into_result()
    }

    fn attach_source(&self, mut partial: PartialParse) -> PartialParse {
        if let Some(source) = &self.source {
            partial.error = partial.error.take().map(|e| e.with_source(source));
        }
        partial
    }
}
