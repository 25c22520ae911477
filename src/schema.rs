//! Schema-side contracts the engine consumes.
//!
//! The engine never compiles a grammar itself. A schema compiler hands it two
//! artifacts: the operator tree (see [`crate::grammar`]) and a
//! [`TypeRegistry`] describing every declared struct type, its fields, and
//! the classification of each destination slot. Capture nodes carry a
//! pre-resolved [`FieldDescriptor`] pointing into this registry.
//!
//! Three user-extension traits live here as well: custom sub-parsers, capture
//! hooks, and text decoders.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::errors::ParseError;
use crate::token::Cursor;
use crate::value::{StructRef, StructValue, TypeId, Value};

/// Error type for user hooks; wrapped into a capture failure by the engine.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A user-supplied sub-parser, delegated to by a custom grammar node.
///
/// Returning `Ok(None)` signals "no match here, try something else"; the
/// engine restores the cursor itself, so implementations need not rewind.
pub trait CustomParser: Send + Sync {
    fn parse(&self, cursor: &mut Cursor<'_>) -> Result<Option<Value>, ParseError>;
}

/// A user-supplied capture routine, invoked with the string forms of every
/// captured value. The slot starts out as its default value and is mutated in
/// place; repeated captures into the same slot see their prior state.
pub trait CaptureHook: Send + Sync {
    fn capture(&self, slot: &mut Value, values: &[String]) -> Result<(), HookError>;
}

/// A user-supplied decoder, invoked once per captured value with its text.
pub trait TextDecoder: Send + Sync {
    fn decode(&self, slot: &mut Value, text: &str) -> Result<(), HookError>;
}

/// The closed classification of a destination slot.
///
/// Every field of every declared type is classified at schema-compile time;
/// the capture system dispatches on this classification alone.
#[derive(Clone)]
pub enum SlotKind {
    Bool,
    /// Signed integer of the given width (8, 16, 32 or 64 bits).
    Int { bits: u8 },
    /// Unsigned integer of the given width.
    Uint { bits: u8 },
    /// Float of the given width (32 or 64 bits).
    Float { bits: u8 },
    /// Incremented by one for every captured value; counts grammar positions
    /// like a repeated `"+"` rather than parsing their text.
    Counter,
    /// Captured values concatenate onto the current string.
    Str,
    /// A nested struct of the given declared type.
    Struct { type_id: TypeId },
    /// Each captured value is coerced to the element kind and appended.
    Collection { elem: Box<SlotKind> },
    /// Materialized to the element kind's default on first capture.
    Optional { elem: Box<SlotKind> },
    /// The first token of the capture's token range.
    RawToken,
    /// The capture's entire raw token range.
    RawTokens,
    /// A source position, written by the engine itself, never captured into.
    Position,
    /// Each captured value's text is handed to the decoder.
    Decoded { decoder: Arc<dyn TextDecoder> },
    /// All captured values are handed to the hook at once.
    Custom { hook: Arc<dyn CaptureHook> },
}

impl fmt::Debug for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Bool => write!(f, "Bool"),
            SlotKind::Int { bits } => write!(f, "Int{bits}"),
            SlotKind::Uint { bits } => write!(f, "Uint{bits}"),
            SlotKind::Float { bits } => write!(f, "Float{bits}"),
            SlotKind::Counter => write!(f, "Counter"),
            SlotKind::Str => write!(f, "Str"),
            SlotKind::Struct { type_id } => write!(f, "Struct#{type_id}"),
            SlotKind::Collection { elem } => write!(f, "Collection<{elem:?}>"),
            SlotKind::Optional { elem } => write!(f, "Optional<{elem:?}>"),
            SlotKind::RawToken => write!(f, "RawToken"),
            SlotKind::RawTokens => write!(f, "RawTokens"),
            SlotKind::Position => write!(f, "Position"),
            SlotKind::Decoded { .. } => write!(f, "Decoded"),
            SlotKind::Custom { .. } => write!(f, "Custom"),
        }
    }
}

/// A resolved destination for a capture node: the qualified display name, the
/// index path from the enclosing struct to the slot, and the slot's kind.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub path: Vec<usize>,
    pub kind: SlotKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, path: Vec<usize>, kind: SlotKind) -> Self {
        Self {
            name: name.into(),
            path,
            kind,
        }
    }
}

/// One declared field of a struct type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: SlotKind,
}

/// A declared struct type: named fields plus the optional slots the engine
/// fills itself (start position, end position, matched token range).
#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub pos_field: Option<usize>,
    pub end_pos_field: Option<usize>,
    pub tokens_field: Option<usize>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            pos_field: None,
            end_pos_field: None,
            tokens_field: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: SlotKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare a field receiving the position of the first matched token.
    pub fn pos_field(mut self, name: impl Into<String>) -> Self {
        self.pos_field = Some(self.fields.len());
        self.field(name, SlotKind::Position)
    }

    /// Declare a field receiving the position just past the last matched token.
    pub fn end_pos_field(mut self, name: impl Into<String>) -> Self {
        self.end_pos_field = Some(self.fields.len());
        self.field(name, SlotKind::Position)
    }

    /// Declare a field receiving the full raw token range of the match.
    pub fn tokens_field(mut self, name: impl Into<String>) -> Self {
        self.tokens_field = Some(self.fields.len());
        self.field(name, SlotKind::RawTokens)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// All declared struct types for one grammar.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<StructType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: StructType) -> TypeId {
        self.types.push(ty);
        self.types.len() - 1
    }

    pub fn try_get(&self, id: TypeId) -> Option<&StructType> {
        self.types.get(id)
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        self.try_get(id).map(|t| t.name.as_str()).unwrap_or("?")
    }

    /// A fresh instance of the given type with every field defaulted.
    pub fn instantiate(&self, id: TypeId) -> StructRef {
        let fields = self
            .try_get(id)
            .map(|ty| ty.fields.iter().map(|f| self.default_value(&f.kind)).collect())
            .unwrap_or_default();
        Rc::new(RefCell::new(StructValue::new(id, fields)))
    }

    /// The zero value a slot of the given kind starts out holding.
    pub fn default_value(&self, kind: &SlotKind) -> Value {
        match kind {
            SlotKind::Bool => Value::Bool(false),
            SlotKind::Int { .. } | SlotKind::Counter => Value::Int(0),
            SlotKind::Uint { .. } => Value::Uint(0),
            SlotKind::Float { .. } => Value::Float(0.0),
            SlotKind::Str => Value::Str(String::new()),
            SlotKind::Collection { .. } => Value::List(Vec::new()),
            SlotKind::RawTokens => Value::Tokens(Vec::new()),
            SlotKind::Struct { .. }
            | SlotKind::Optional { .. }
            | SlotKind::RawToken
            | SlotKind::Position
            | SlotKind::Decoded { .. }
            | SlotKind::Custom { .. } => Value::Unset,
        }
    }
}
