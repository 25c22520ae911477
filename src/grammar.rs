//! The operator tree and its matching semantics.
//!
//! A grammar compiles (elsewhere) into a tree of [`Node`]s; parsing is a
//! recursive-descent walk of that tree against a token cursor. Every node
//! reports one of three outcomes: it did not match (cursor untouched), it
//! matched a list of captured values (cursor advanced), or it failed with an
//! error and whatever partial values it produced along the way.
//!
//! The tree is immutable once built and holds no per-parse state, so one
//! tree can drive any number of parses, each with its own context.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::context::ParseContext;
use crate::errors::{ErrorKind, ParseError};
use crate::schema::{CustomParser, FieldDescriptor};
use crate::token::{Token, TokenKind, ANY_KIND};
use crate::value::{StructRef, TypeId, Value};

/// Result of one node's match attempt.
///
/// `Fail` carries both the error and the partial values produced before it,
/// so a failing parse can still hand back a best-effort value tree.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The node did not match; the cursor is unchanged.
    NoMatch,
    /// The node matched, consuming tokens and producing these values. The
    /// list may be empty: an optional position that matched zero times is
    /// still a successful match.
    Match(Vec<Value>),
    /// The node failed partway through.
    Fail {
        partial: Vec<Value>,
        error: ParseError,
    },
}

impl NodeOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, NodeOutcome::Match(_))
    }
}

/// Cardinality of a group position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Once,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
    /// Matches like `Once` but refuses an empty match.
    NonEmpty,
}

/// A node in the operator tree.
#[derive(Clone)]
pub enum Node {
    /// Build a fresh instance of a declared type from the body's captures.
    Struct { type_id: TypeId, body: Box<Node> },
    /// Match every item in order.
    Sequence(Vec<Node>),
    /// Ordered choice between alternatives.
    Disjunction(Vec<Node>),
    /// The body with an explicit cardinality.
    Group { body: Box<Node>, mode: GroupMode },
    /// Zero or one of the body; always succeeds.
    Optional(Box<Node>),
    /// Zero or more of the body; always succeeds.
    Repetition(Box<Node>),
    /// Any one token of the given kind.
    Reference { kind: TokenKind, name: String },
    /// One token with this exact value (and kind, unless `ANY_KIND`).
    Literal {
        value: String,
        kind: TokenKind,
        display: Option<String>,
    },
    /// One token, provided the body would *not* match here.
    Negation(Box<Node>),
    /// Bind the body's output into a field of the enclosing struct.
    Capture {
        field: FieldDescriptor,
        body: Box<Node>,
    },
    /// Delegate to a user-supplied sub-parser.
    Custom {
        type_id: TypeId,
        name: String,
        parser: Arc<dyn CustomParser>,
    },
}

impl Node {
    pub fn structure(type_id: TypeId, body: Node) -> Node {
        Node::Struct {
            type_id,
            body: Box::new(body),
        }
    }

    pub fn sequence(items: Vec<Node>) -> Node {
        Node::Sequence(items)
    }

    pub fn disjunction(alternatives: Vec<Node>) -> Node {
        Node::Disjunction(alternatives)
    }

    pub fn group(body: Node, mode: GroupMode) -> Node {
        Node::Group {
            body: Box::new(body),
            mode,
        }
    }

    pub fn optional(body: Node) -> Node {
        Node::Optional(Box::new(body))
    }

    pub fn repetition(body: Node) -> Node {
        Node::Repetition(Box::new(body))
    }

    pub fn reference(kind: TokenKind, name: impl Into<String>) -> Node {
        Node::Reference {
            kind,
            name: name.into(),
        }
    }

    pub fn literal(value: impl Into<String>) -> Node {
        Node::Literal {
            value: value.into(),
            kind: ANY_KIND,
            display: None,
        }
    }

    pub fn literal_typed(
        value: impl Into<String>,
        kind: TokenKind,
        display: Option<String>,
    ) -> Node {
        Node::Literal {
            value: value.into(),
            kind,
            display,
        }
    }

    pub fn negation(body: Node) -> Node {
        Node::Negation(Box::new(body))
    }

    pub fn capture(field: FieldDescriptor, body: Node) -> Node {
        Node::Capture {
            field,
            body: Box::new(body),
        }
    }

    pub fn custom(type_id: TypeId, name: impl Into<String>, parser: Arc<dyn CustomParser>) -> Node {
        Node::Custom {
            type_id,
            name: name.into(),
            parser,
        }
    }

    /// Attempt to match this node at the context's cursor. `parent` is the
    /// struct instance captures at this grammar position bind into.
    pub fn parse<'p>(&self, ctx: &mut ParseContext<'p>, parent: &StructRef) -> NodeOutcome {
        match self {
            Node::Struct { type_id, body } => parse_struct(*type_id, body, ctx),
            Node::Sequence(items) => parse_sequence(items, ctx, parent),
            Node::Disjunction(alternatives) => parse_disjunction(alternatives, ctx, parent),
            Node::Group { body, mode } => parse_group(self, body, *mode, ctx, parent),
            Node::Optional(body) => parse_optional(body, ctx, parent),
            Node::Repetition(body) => parse_repetition(self, body, ctx, parent),
            Node::Reference { kind, .. } => parse_reference(*kind, ctx),
            Node::Literal { value, kind, .. } => parse_literal(value, *kind, ctx),
            Node::Negation(body) => parse_negation(self, body, ctx, parent),
            Node::Capture { field, body } => parse_capture(field, body, ctx, parent),
            Node::Custom { parser, .. } => parse_custom(parser.as_ref(), ctx),
        }
    }
}

// ============================================================================
// MATCH SEMANTICS
// ============================================================================

fn parse_struct<'p>(type_id: TypeId, body: &Node, ctx: &mut ParseContext<'p>) -> NodeOutcome {
    let registry = ctx.registry();
    let Some(ty) = registry.try_get(type_id) else {
        let token = ctx.peek(0);
        return NodeOutcome::Fail {
            partial: Vec::new(),
            error: ParseError::new(
                ErrorKind::GrammarAbort {
                    message: format!("unknown type #{type_id} in grammar"),
                },
                token.pos,
            ),
        };
    };
    let instance = registry.instantiate(type_id);
    let start = ctx.raw_cursor();
    if let Some(i) = ty.pos_field {
        let pos = ctx.peek(0).pos;
        instance.borrow_mut().fields[i] = Value::Pos(pos);
    }
    match body.parse(ctx, &instance) {
        NodeOutcome::Fail { error, .. } => {
            // Best effort, so the partial tree reflects what did match.
            let _ = ctx.apply();
            ctx.maybe_update_error(&error);
            NodeOutcome::Fail {
                partial: vec![Value::Struct(instance)],
                error,
            }
        }
        NodeOutcome::NoMatch => NodeOutcome::NoMatch,
        NodeOutcome::Match(_) => {
            let end = ctx.raw_cursor();
            if let Some(i) = ty.end_pos_field {
                let pos = ctx.raw_peek(0).pos;
                instance.borrow_mut().fields[i] = Value::Pos(pos);
            }
            if let Some(i) = ty.tokens_field {
                let tokens = ctx.range(start, end).to_vec();
                instance.borrow_mut().fields[i] = Value::Tokens(tokens);
            }
            match ctx.apply() {
                Ok(()) => NodeOutcome::Match(vec![Value::Struct(instance)]),
                Err(error) => NodeOutcome::Fail {
                    partial: vec![Value::Struct(instance)],
                    error,
                },
            }
        }
    }
}

fn parse_sequence<'p>(
    items: &[Node],
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item.parse(ctx, parent) {
            NodeOutcome::Match(values) => out.extend(values),
            NodeOutcome::NoMatch => {
                // Only the first item decides whether the sequence matches at
                // all; a later miss is a hard failure.
                if i == 0 {
                    return NodeOutcome::NoMatch;
                }
                let token = ctx.peek(0);
                return NodeOutcome::Fail {
                    partial: out,
                    error: ParseError::unexpected_token(token, item.to_string()),
                };
            }
            NodeOutcome::Fail { partial, error } => {
                out.extend(partial);
                return NodeOutcome::Fail {
                    partial: out,
                    error,
                };
            }
        }
    }
    NodeOutcome::Match(out)
}

fn parse_disjunction<'p>(
    alternatives: &[Node],
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let mut deepest = 0usize;
    let mut candidate: Option<(Vec<Value>, ParseError)> = None;
    for alternative in alternatives {
        let mut branch = ctx.branch();
        match alternative.parse(&mut branch, parent) {
            NodeOutcome::Fail { partial, error } => {
                let reached = branch.raw_cursor();
                if ctx.stop(&error, branch) {
                    return NodeOutcome::Fail { partial, error };
                }
                // Prefer the failure that progressed furthest.
                if reached >= deepest {
                    deepest = reached;
                    candidate = Some((partial, error));
                }
            }
            NodeOutcome::Match(values) => {
                if branch.raw_cursor() == ctx.raw_cursor() {
                    // Accepting a zero-width alternative would loop the
                    // enclosing repetition forever.
                    let token = ctx.peek(0);
                    let error = ParseError::at_token(
                        ErrorKind::GrammarAbort {
                            message: format!(
                                "alternative {alternative} matched without consuming any input at {} ({:?})",
                                token.pos, token.value
                            ),
                        },
                        token,
                    );
                    return NodeOutcome::Fail {
                        partial: values,
                        error,
                    };
                }
                ctx.accept(branch);
                return NodeOutcome::Match(values);
            }
            NodeOutcome::NoMatch => {}
        }
    }
    if let Some((partial, error)) = candidate {
        ctx.maybe_update_error(&error);
        NodeOutcome::Fail { partial, error }
    } else {
        NodeOutcome::NoMatch
    }
}

fn parse_group<'p>(
    display: &Node,
    body: &Node,
    mode: GroupMode,
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let (min, max) = match mode {
        GroupMode::Once => return body.parse(ctx, parent),
        GroupMode::NonEmpty => {
            return match body.parse(ctx, parent) {
                NodeOutcome::Fail { partial, error } => NodeOutcome::Fail { partial, error },
                NodeOutcome::Match(values) if !values.is_empty() => NodeOutcome::Match(values),
                NodeOutcome::Match(_) | NodeOutcome::NoMatch => {
                    let token = ctx.peek(0);
                    NodeOutcome::Fail {
                        partial: Vec::new(),
                        error: ParseError::at_token(
                            ErrorKind::SubExpressionEmpty {
                                expr: display.to_string(),
                            },
                            token,
                        ),
                    }
                }
            };
        }
        GroupMode::ZeroOrOne => (0, 1),
        GroupMode::ZeroOrMore => (0, ctx.max_iterations()),
        GroupMode::OneOrMore => (1, ctx.max_iterations()),
    };
    let ceiling = ctx.max_iterations();
    let mut out = Vec::new();
    let mut matches = 0usize;
    while matches < max {
        let mut branch = ctx.branch();
        match body.parse(&mut branch, parent) {
            NodeOutcome::Fail { partial, error } => {
                out.extend(partial);
                ctx.maybe_update_error(&error);
                if ctx.stop(&error, branch) {
                    return NodeOutcome::Fail {
                        partial: out,
                        error,
                    };
                }
                break;
            }
            NodeOutcome::Match(values) => {
                out.extend(values);
                ctx.accept(branch);
                matches += 1;
            }
            NodeOutcome::NoMatch => break,
        }
    }
    if matches >= ceiling {
        let token = ctx.peek(0);
        return NodeOutcome::Fail {
            partial: out,
            error: too_many_iterations(display, ceiling, token),
        };
    }
    if matches < min {
        let token = ctx.peek(0);
        return NodeOutcome::Fail {
            partial: out,
            error: ParseError::at_token(
                ErrorKind::SubExpressionTooFew {
                    expr: display.to_string(),
                },
                token,
            ),
        };
    }
    NodeOutcome::Match(out)
}

fn parse_optional<'p>(body: &Node, ctx: &mut ParseContext<'p>, parent: &StructRef) -> NodeOutcome {
    let mut branch = ctx.branch();
    let mut out = Vec::new();
    match body.parse(&mut branch, parent) {
        NodeOutcome::Fail { partial, error } => {
            out.extend(partial);
            if ctx.stop(&error, branch) {
                return NodeOutcome::Fail {
                    partial: out,
                    error,
                };
            }
        }
        NodeOutcome::Match(values) => {
            out.extend(values);
            ctx.accept(branch);
        }
        NodeOutcome::NoMatch => {}
    }
    NodeOutcome::Match(out)
}

fn parse_repetition<'p>(
    display: &Node,
    body: &Node,
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let ceiling = ctx.max_iterations();
    let mut out = Vec::new();
    let mut iterations = 0usize;
    while iterations < ceiling {
        let mut branch = ctx.branch();
        match body.parse(&mut branch, parent) {
            NodeOutcome::Fail { partial, error } => {
                out.extend(partial);
                if ctx.stop(&error, branch) {
                    return NodeOutcome::Fail {
                        partial: out,
                        error,
                    };
                }
                break;
            }
            NodeOutcome::Match(values) => {
                out.extend(values);
                ctx.accept(branch);
            }
            NodeOutcome::NoMatch => break,
        }
        iterations += 1;
    }
    if iterations >= ceiling {
        let token = ctx.peek(0);
        return NodeOutcome::Fail {
            partial: out,
            error: too_many_iterations(display, ceiling, token),
        };
    }
    NodeOutcome::Match(out)
}

fn parse_reference<'p>(kind: TokenKind, ctx: &mut ParseContext<'p>) -> NodeOutcome {
    let token = ctx.peek(0);
    if token.kind != kind {
        return NodeOutcome::NoMatch;
    }
    let value = ctx.next().value.clone();
    NodeOutcome::Match(vec![Value::Str(value)])
}

fn parse_literal<'p>(expected: &str, kind: TokenKind, ctx: &mut ParseContext<'p>) -> NodeOutcome {
    let token = ctx.peek(0);
    let equal = if ctx.case_insensitive(token.kind) {
        fold_eq(&token.value, expected)
    } else {
        token.value == expected
    };
    if equal && (kind == ANY_KIND || kind == token.kind) {
        let value = ctx.next().value.clone();
        NodeOutcome::Match(vec![Value::Str(value)])
    } else {
        NodeOutcome::NoMatch
    }
}

fn parse_negation<'p>(
    display: &Node,
    body: &Node,
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let token = ctx.peek(0);
    if token.is_eof() {
        // Nothing left to consume, so a negation cannot match.
        return NodeOutcome::NoMatch;
    }
    // The branch exists only to probe; it is neither accepted nor stopped.
    let mut branch = ctx.branch();
    match body.parse(&mut branch, parent) {
        NodeOutcome::Match(_) => NodeOutcome::Fail {
            partial: Vec::new(),
            error: ParseError::unexpected_token(token, display.to_string()),
        },
        NodeOutcome::Fail { error, .. } if error.is_fatal() => NodeOutcome::Fail {
            partial: Vec::new(),
            error,
        },
        NodeOutcome::Fail { .. } | NodeOutcome::NoMatch => {
            let value = ctx.next().value.clone();
            NodeOutcome::Match(vec![Value::Str(value)])
        }
    }
}

fn parse_capture<'p>(
    field: &FieldDescriptor,
    body: &Node,
    ctx: &mut ParseContext<'p>,
    parent: &StructRef,
) -> NodeOutcome {
    let start = ctx.raw_cursor();
    match body.parse(ctx, parent) {
        NodeOutcome::NoMatch => NodeOutcome::NoMatch,
        NodeOutcome::Match(values) => {
            let tokens = ctx.range(start, ctx.raw_cursor());
            ctx.defer(tokens, Rc::clone(parent), field.clone(), values);
            NodeOutcome::Match(vec![Value::Struct(Rc::clone(parent))])
        }
        NodeOutcome::Fail { partial, error } => {
            if !partial.is_empty() {
                let tokens = ctx.range(start, ctx.raw_cursor());
                ctx.defer(tokens, Rc::clone(parent), field.clone(), partial);
            }
            NodeOutcome::Fail {
                partial: vec![Value::Struct(Rc::clone(parent))],
                error,
            }
        }
    }
}

fn parse_custom<'p>(parser: &dyn CustomParser, ctx: &mut ParseContext<'p>) -> NodeOutcome {
    let saved = ctx.raw_cursor();
    match parser.parse(ctx.cursor_mut()) {
        Ok(Some(value)) => NodeOutcome::Match(vec![value]),
        Ok(None) => {
            ctx.rewind(saved);
            NodeOutcome::NoMatch
        }
        Err(error) => NodeOutcome::Fail {
            partial: Vec::new(),
            error,
        },
    }
}

fn too_many_iterations(display: &Node, ceiling: usize, token: &Token) -> ParseError {
    ParseError::at_token(
        ErrorKind::GrammarAbort {
            message: format!("too many iterations of {display} (> {ceiling})"),
        },
        token,
    )
}

/// Unicode-folded equality, for case-insensitive token kinds.
fn fold_eq(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

// ============================================================================
// GRAMMAR DISPLAY
// ============================================================================

impl fmt::Display for Node {
    /// Renders the node as the grammar fragment it matches, for use in
    /// "expected ..." diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Struct { body, .. } => write!(f, "{body}"),
            Node::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Node::Disjunction(alternatives) => {
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                Ok(())
            }
            Node::Group { body, mode } => {
                let suffix = match mode {
                    GroupMode::Once => "",
                    GroupMode::ZeroOrOne => "?",
                    GroupMode::ZeroOrMore => "*",
                    GroupMode::OneOrMore => "+",
                    GroupMode::NonEmpty => "!",
                };
                write!(f, "({body}){suffix}")
            }
            Node::Optional(body) => write!(f, "[ {body} ]"),
            Node::Repetition(body) => write!(f, "{{ {body} }}"),
            Node::Reference { name, .. } => write!(f, "<{}>", name.to_lowercase()),
            Node::Literal { value, display, .. } => {
                write!(f, "{value:?}")?;
                if let Some(display) = display {
                    write!(f, ":{display}")?;
                }
                Ok(())
            }
            Node::Negation(body) => write!(f, "~{body}"),
            Node::Capture { body, .. } => write!(f, "{body}"),
            Node::Custom { name, .. } => write!(f, "<{}>", name.to_lowercase()),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
