//! anvaya — a schema-driven, speculative parser engine.
//!
//! The engine is the runtime half of a grammar-driven parser: a schema
//! compiler (not included here) turns a declarative grammar into an operator
//! tree of [`Node`]s and a [`TypeRegistry`] of declared value types; the
//! engine walks that tree over a token stream, speculating with cheap
//! branches, deferring captured values until the enclosing struct commits,
//! and tracking the deepest failure so diagnostics point at the real
//! mistake.
//!
//! # Example
//!
//! Counting `+` tokens into an `i64`-backed counter field:
//!
//! ```rust
//! use std::sync::Arc;
//! use anvaya::{
//!     FieldDescriptor, Node, Parser, Position, SlotKind, StructType, Token, TokenStream,
//!     TypeRegistry,
//! };
//!
//! let mut registry = TypeRegistry::new();
//! let tally = registry.register(StructType::new("Tally").field("count", SlotKind::Counter));
//!
//! let count = FieldDescriptor::new("count", vec![0], SlotKind::Counter);
//! let root = Node::structure(
//!     tally,
//!     Node::repetition(Node::capture(count, Node::literal("+"))),
//! );
//!
//! let tokens = vec![
//!     Token::new(1, "+", Position::new(0, 1, 1)),
//!     Token::new(1, "+", Position::new(1, 1, 2)),
//!     Token::new(1, "+", Position::new(2, 1, 3)),
//! ];
//! let stream = TokenStream::new(tokens, Default::default());
//!
//! let parser = Parser::new(Arc::new(registry), root);
//! let value = parser.parse(&stream).unwrap();
//! let tally = value.as_struct().unwrap().borrow();
//! assert_eq!(tally.field(0).as_int(), Some(3));
//! ```

pub mod capture;
pub mod context;
pub mod engine;
pub mod errors;
pub mod grammar;
pub mod schema;
pub mod token;
pub mod value;

pub use crate::context::{ParseConfig, ParseContext};
pub use crate::engine::{Parser, PartialParse};
pub use crate::errors::{ErrorCategory, ErrorKind, ParseError, SourceContext};
pub use crate::grammar::{GroupMode, Node, NodeOutcome};
pub use crate::schema::{
    CaptureHook, CustomParser, FieldDef, FieldDescriptor, HookError, SlotKind, StructType,
    TextDecoder, TypeRegistry,
};
pub use crate::token::{
    Cursor, Position, Token, TokenKind, TokenStream, ANY_KIND, EOF_KIND,
};
pub use crate::value::{StructRef, StructValue, TypeId, Value};
