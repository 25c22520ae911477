//! Tests of the capture/assignment system: slot-kind dispatch, coercion,
//! aggregation, user hooks, and error decoration.

mod common;

use std::sync::Arc;

use anvaya::{
    CaptureHook, CustomParser, ErrorCategory, ErrorKind, FieldDescriptor, HookError, Node, ParseError,
    Parser, SlotKind, StructType, TextDecoder, TypeRegistry, Value,
};
use common::{desc, registry_of, tokenize, IDENT, INT};

fn int_slot() -> SlotKind {
    SlotKind::Int { bits: 64 }
}

// ----------------------------------------------------------------------------
// Scalar coercion
// ----------------------------------------------------------------------------

#[test]
fn integers_parse_with_automatic_radix() {
    let (registry, ty) = registry_of(StructType::new("Num").field("n", int_slot()));
    // `0x1F` arrives as two tokens; the captures coalesce before coercion.
    let root = Node::structure(
        ty,
        Node::capture(
            desc("n", 0, int_slot()),
            Node::sequence(vec![
                Node::reference(INT, "Int"),
                Node::reference(IDENT, "Word"),
            ]),
        ),
    );
    let parser = Parser::new(registry, root);

    let value = parser.parse(&tokenize("0x1F")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_int(), Some(31));
}

#[test]
fn narrow_integers_are_range_checked() {
    let kind = SlotKind::Int { bits: 8 };
    let (registry, ty) = registry_of(StructType::new("Num").field("n", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(desc("n", 0, kind), Node::reference(INT, "Int")),
    );
    let parser = Parser::new(registry, root);

    let value = parser.parse(&tokenize("127")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_int(), Some(127));

    let err = parser.parse(&tokenize("128")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidInteger { .. }));
}

#[test]
fn assignment_failures_carry_field_and_position() {
    let (registry, ty) = registry_of(StructType::new("Expr").field("count", int_slot()));
    let root = Node::structure(
        ty,
        Node::capture(desc("count", 0, int_slot()), Node::reference(IDENT, "Word")),
    );
    let err = Parser::new(registry, root)
        .parse(&tokenize("banana"))
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Assignment);
    assert_eq!(err.field.as_deref(), Some("Expr.count"));
    assert_eq!(err.pos.offset, 0);
    assert!(matches!(err.kind, ErrorKind::InvalidInteger { .. }));
}

#[test]
fn unsigned_slots_reject_negative_text() {
    let kind = SlotKind::Uint { bits: 32 };
    let (registry, ty) = registry_of(StructType::new("Num").field("n", kind.clone()));
    // `-` and the digits arrive as separate captures and coalesce first.
    let root = Node::structure(
        ty,
        Node::capture(
            desc("n", 0, kind),
            Node::sequence(vec![Node::literal("-"), Node::reference(INT, "Int")]),
        ),
    );
    let err = Parser::new(registry, root)
        .parse(&tokenize("- 3"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidInteger { .. }));
}

#[test]
fn float_slots_parse_and_reject() {
    let kind = SlotKind::Float { bits: 64 };
    let (registry, ty) = registry_of(StructType::new("Num").field("f", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(desc("f", 0, kind), Node::reference(IDENT, "Word")),
    );
    let parser = Parser::new(registry, root);

    let err = parser.parse(&tokenize("pi")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidFloat { .. }));
}

#[test]
fn float_slots_accept_coalesced_number_text() {
    let kind = SlotKind::Float { bits: 64 };
    let (registry, ty) = registry_of(StructType::new("Num").field("f", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(
            desc("f", 0, kind),
            Node::sequence(vec![
                Node::reference(INT, "Int"),
                Node::literal("."),
                Node::reference(INT, "Int"),
            ]),
        ),
    );
    let value = Parser::new(registry, root).parse(&tokenize("3.25")).unwrap();
    assert_eq!(
        value.as_struct().unwrap().borrow().field(0).as_float(),
        Some(3.25)
    );
}

// ----------------------------------------------------------------------------
// Booleans
// ----------------------------------------------------------------------------

#[test]
fn boolean_slots_encode_presence() {
    let (registry, ty) = registry_of(StructType::new("Flags").field("big", SlotKind::Bool));
    let root = Node::structure(
        ty,
        Node::capture(desc("big", 0, SlotKind::Bool), Node::optional(Node::literal("big"))),
    );
    let parser = Parser::new(registry, root);

    let value = parser.parse(&tokenize("big")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_bool(), Some(true));

    let value = parser.parse(&tokenize("")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_bool(), Some(false));
}

/// Produces an explicit boolean value without consuming input.
struct AlwaysFalse;

impl CustomParser for AlwaysFalse {
    fn parse(&self, _cursor: &mut anvaya::Cursor<'_>) -> Result<Option<Value>, ParseError> {
        Ok(Some(Value::Bool(false)))
    }
}

#[test]
fn captured_booleans_pass_through_unchanged() {
    let (registry, ty) = registry_of(StructType::new("Flags").field("big", SlotKind::Bool));
    let root = Node::structure(
        ty,
        Node::capture(
            desc("big", 0, SlotKind::Bool),
            Node::custom(ty, "AlwaysFalse", Arc::new(AlwaysFalse)),
        ),
    );
    let value = Parser::new(registry, root).parse(&tokenize("")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_bool(), Some(false));
}

// ----------------------------------------------------------------------------
// Strings
// ----------------------------------------------------------------------------

#[test]
fn string_slots_coalesce_a_signed_number() {
    let (registry, ty) = registry_of(StructType::new("Text").field("s", SlotKind::Str));
    let root = Node::structure(
        ty,
        Node::capture(
            desc("s", 0, SlotKind::Str),
            Node::sequence(vec![Node::literal("-"), Node::reference(INT, "Int")]),
        ),
    );
    let value = Parser::new(registry, root).parse(&tokenize("- 10")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_str(), Some("-10"));
}

#[test]
fn string_slots_accumulate_across_captures() {
    let (registry, ty) = registry_of(StructType::new("Text").field("s", SlotKind::Str));
    let root = Node::structure(
        ty,
        Node::sequence(vec![
            Node::capture(desc("s", 0, SlotKind::Str), Node::reference(IDENT, "Word")),
            Node::capture(desc("s", 0, SlotKind::Str), Node::reference(IDENT, "Word")),
        ]),
    );
    let value = Parser::new(registry, root).parse(&tokenize("ab cd")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_str(), Some("abcd"));
}

// ----------------------------------------------------------------------------
// Collections
// ----------------------------------------------------------------------------

#[test]
fn collections_append_each_coerced_value() {
    let kind = SlotKind::Collection {
        elem: Box::new(int_slot()),
    };
    let (registry, ty) = registry_of(StructType::new("Nums").field("items", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(desc("items", 0, kind), Node::repetition(Node::reference(INT, "Int"))),
    );
    let value = Parser::new(registry, root).parse(&tokenize("1 2 3")).unwrap();
    let nums = value.as_struct().unwrap().borrow();
    let items: Vec<_> = nums
        .field(0)
        .as_list()
        .unwrap()
        .iter()
        .filter_map(Value::as_int)
        .collect();
    assert_eq!(items, vec![1, 2, 3]);
}

/// Builds each element by uppercasing its captured text.
struct Upper;

impl CaptureHook for Upper {
    fn capture(&self, slot: &mut Value, values: &[String]) -> Result<(), HookError> {
        let mut text = match slot {
            Value::Str(s) => s.clone(),
            _ => String::new(),
        };
        for value in values {
            text.push_str(&value.to_uppercase());
        }
        *slot = Value::Str(text);
        Ok(())
    }
}

#[test]
fn collection_elements_can_use_a_capture_hook() {
    let kind = SlotKind::Collection {
        elem: Box::new(SlotKind::Custom { hook: Arc::new(Upper) }),
    };
    let (registry, ty) = registry_of(StructType::new("Words").field("items", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(
            desc("items", 0, kind),
            Node::repetition(Node::reference(IDENT, "Word")),
        ),
    );
    let value = Parser::new(registry, root).parse(&tokenize("ab cd")).unwrap();
    let words = value.as_struct().unwrap().borrow();
    let items: Vec<_> = words
        .field(0)
        .as_list()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(items, vec!["AB", "CD"]);
}

// ----------------------------------------------------------------------------
// Hooks on the slot itself
// ----------------------------------------------------------------------------

#[test]
fn capture_hooks_see_all_values_at_once() {
    let kind = SlotKind::Custom { hook: Arc::new(Upper) };
    let (registry, ty) = registry_of(StructType::new("Text").field("s", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(desc("s", 0, kind), Node::repetition(Node::reference(IDENT, "Word"))),
    );
    let value = Parser::new(registry, root).parse(&tokenize("ab cd")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_str(), Some("ABCD"));
}

/// Rejects anything that is not lowercase ascii.
struct Lowercase;

impl TextDecoder for Lowercase {
    fn decode(&self, slot: &mut Value, text: &str) -> Result<(), HookError> {
        if text.chars().all(|c| c.is_ascii_lowercase()) {
            *slot = Value::Str(text.to_string());
            Ok(())
        } else {
            Err(format!("not lowercase: {text}").into())
        }
    }
}

#[test]
fn text_decoders_run_once_per_value() {
    let kind = SlotKind::Decoded {
        decoder: Arc::new(Lowercase),
    };
    let (registry, ty) = registry_of(StructType::new("Text").field("s", kind.clone()));
    let root = Node::structure(
        ty,
        Node::capture(desc("s", 0, kind), Node::reference(IDENT, "Word")),
    );
    let parser = Parser::new(registry, root);

    let value = parser.parse(&tokenize("ok")).unwrap();
    assert_eq!(value.as_struct().unwrap().borrow().field(0).as_str(), Some("ok"));

    let err = parser.parse(&tokenize("BAD")).unwrap_err();
    match &err.kind {
        ErrorKind::CaptureFailed { message } => assert!(message.contains("not lowercase")),
        other => panic!("expected a capture failure, got {other:?}"),
    }
    assert_eq!(err.field.as_deref(), Some("Text.s"));
}

// ----------------------------------------------------------------------------
// Nested structs and index paths
// ----------------------------------------------------------------------------

#[test]
fn nested_struct_values_assign_into_struct_slots() {
    let mut registry = TypeRegistry::new();
    let inner = registry.register(StructType::new("Inner").field("val", SlotKind::Str));
    let outer = registry.register(
        StructType::new("Outer").field("inner", SlotKind::Struct { type_id: inner }),
    );
    let root = Node::structure(
        outer,
        Node::capture(
            desc("inner", 0, SlotKind::Struct { type_id: inner }),
            Node::structure(
                inner,
                Node::capture(desc("val", 0, SlotKind::Str), Node::reference(IDENT, "Word")),
            ),
        ),
    );
    let value = Parser::new(Arc::new(registry), root).parse(&tokenize("hi")).unwrap();
    let outer_value = value.as_struct().unwrap().borrow();
    let inner_value = outer_value.field(0).as_struct().unwrap().borrow();
    assert_eq!(inner_value.field(0).as_str(), Some("hi"));
}

#[test]
fn struct_slots_reject_non_struct_values() {
    let mut registry = TypeRegistry::new();
    let inner = registry.register(StructType::new("Inner").field("val", SlotKind::Str));
    let outer = registry.register(
        StructType::new("Outer").field("inner", SlotKind::Struct { type_id: inner }),
    );
    let root = Node::structure(
        outer,
        Node::capture(
            desc("inner", 0, SlotKind::Struct { type_id: inner }),
            Node::literal("x"),
        ),
    );
    let err = Parser::new(Arc::new(registry), root)
        .parse(&tokenize("x"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    assert_eq!(err.field.as_deref(), Some("Outer.inner"));
}

#[test]
fn index_paths_materialize_intermediate_structs() {
    let mut registry = TypeRegistry::new();
    let inner = registry.register(StructType::new("Inner").field("val", SlotKind::Str));
    let outer = registry.register(
        StructType::new("Outer").field("inner", SlotKind::Struct { type_id: inner }),
    );
    let root = Node::structure(
        outer,
        Node::capture(
            FieldDescriptor::new("inner.val", vec![0, 0], SlotKind::Str),
            Node::reference(IDENT, "Word"),
        ),
    );
    let value = Parser::new(Arc::new(registry), root).parse(&tokenize("deep")).unwrap();
    let outer_value = value.as_struct().unwrap().borrow();
    let inner_value = outer_value.field(0).as_struct().unwrap().borrow();
    assert_eq!(inner_value.field(0).as_str(), Some("deep"));
}

// ----------------------------------------------------------------------------
// Raw token slots
// ----------------------------------------------------------------------------

#[test]
fn raw_token_slots_keep_the_underlying_tokens() {
    let mut ty = StructType::new("Raw");
    ty = ty.field("first", SlotKind::RawToken);
    ty = ty.field("all", SlotKind::RawTokens);
    let (registry, raw) = registry_of(ty);

    let body = Node::sequence(vec![
        Node::capture(
            desc("first", 0, SlotKind::RawToken),
            Node::reference(IDENT, "Word"),
        ),
        Node::capture(
            desc("all", 1, SlotKind::RawTokens),
            Node::sequence(vec![Node::literal("("), Node::reference(INT, "Int"), Node::literal(")")]),
        ),
    ]);
    let root = Node::structure(raw, body);
    let value = Parser::new(registry, root).parse(&tokenize("f ( 7 )")).unwrap();
    let raw_value = value.as_struct().unwrap().borrow();

    match raw_value.field(0) {
        Value::Token(token) => {
            assert_eq!(token.value, "f");
            assert_eq!(token.kind, IDENT);
        }
        other => panic!("expected a token, got {other:?}"),
    }
    match raw_value.field(1) {
        // The raw range includes the elided whitespace between tokens.
        Value::Tokens(tokens) => {
            let values: Vec<_> = tokens.iter().map(|t| t.value.as_str()).collect();
            assert_eq!(values, vec![" ", "(", " ", "7", " ", ")"]);
        }
        other => panic!("expected tokens, got {other:?}"),
    }
}

// ----------------------------------------------------------------------------
// Serialization of the produced tree
// ----------------------------------------------------------------------------

#[test]
fn produced_trees_round_trip_through_serde() {
    let (registry, ty) = registry_of(
        StructType::new("Pair")
            .field("a", SlotKind::Str)
            .field("n", int_slot()),
    );
    let root = Node::structure(
        ty,
        Node::sequence(vec![
            Node::capture(desc("a", 0, SlotKind::Str), Node::reference(IDENT, "Word")),
            Node::capture(desc("n", 1, int_slot()), Node::reference(INT, "Int")),
        ]),
    );
    let value = Parser::new(registry, root).parse(&tokenize("x 5")).unwrap();

    let json = serde_json::to_string(&value).unwrap();
    let back: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}

// ----------------------------------------------------------------------------
// Degenerate destinations
// ----------------------------------------------------------------------------

#[test]
fn captures_without_a_field_path_are_rejected() {
    let (registry, ty) = registry_of(StructType::new("Empty"));
    let root = Node::structure(
        ty,
        Node::capture(
            FieldDescriptor::new("nowhere", vec![], SlotKind::Str),
            Node::literal("x"),
        ),
    );
    let err = Parser::new(registry, root).parse(&tokenize("x")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsupportedFieldType { .. }));
}

fn _assert_traits() {
    fn is_send_sync<T: Send + Sync>() {}
    // The operator tree and registry are shareable across threads; each parse
    // owns its own context and value tree.
    is_send_sync::<Node>();
    is_send_sync::<TypeRegistry>();
    is_send_sync::<Parser>();
}
