//! Deferred-capture application: coercing matched values into struct fields.
//!
//! Runs at struct-commit time against the entries queued by capture nodes.
//! Dispatch is an exhaustive match on the destination's [`SlotKind`]; there
//! is no runtime type inspection anywhere. Failures are decorated with the
//! qualified field name and the position of the nearest captured token.

use std::rc::Rc;

use crate::context::DeferredCapture;
use crate::errors::{ErrorKind, ParseError};
use crate::schema::{SlotKind, TypeRegistry};
use crate::token::{Position, Token};
use crate::value::{StructRef, Value};

/// Apply one deferred capture to its recorded target.
pub(crate) fn assign(registry: &TypeRegistry, entry: &DeferredCapture) -> Result<(), ParseError> {
    assign_to_target(registry, entry).map_err(|error| decorate(registry, entry, error))
}

fn decorate(registry: &TypeRegistry, entry: &DeferredCapture, error: ParseError) -> ParseError {
    let type_name = registry.type_name(entry.target.borrow().type_id);
    let qualified = format!("{type_name}.{}", entry.field.name);
    let error = error.with_field(qualified);
    match entry.tokens.first() {
        Some(token) => error.relocate(token.pos, token.value.len().max(1)),
        None => error,
    }
}

fn assign_to_target(registry: &TypeRegistry, entry: &DeferredCapture) -> Result<(), ParseError> {
    let field = &entry.field;
    let Some((&last, prefix)) = field.path.split_last() else {
        return Err(unsupported(&field.name));
    };

    // Walk the index path to the struct owning the destination slot,
    // materializing unset intermediate structs along the way.
    let mut owner: StructRef = Rc::clone(&entry.target);
    for &index in prefix {
        let next = {
            let mut sv = owner.borrow_mut();
            let type_id = sv.type_id;
            let Some(ty) = registry.try_get(type_id) else {
                return Err(unsupported(&field.name));
            };
            let Some(def) = ty.fields.get(index) else {
                return Err(unsupported(&field.name));
            };
            match &mut sv.fields[index] {
                Value::Struct(inner) => Rc::clone(inner),
                slot @ Value::Unset => {
                    let SlotKind::Struct { type_id } = &def.kind else {
                        return Err(unsupported(&field.name));
                    };
                    let inner = registry.instantiate(*type_id);
                    *slot = Value::Struct(Rc::clone(&inner));
                    inner
                }
                other => {
                    return Err(mismatch("struct", other.type_name()));
                }
            }
        };
        owner = next;
    }

    let mut sv = owner.borrow_mut();
    let Some(slot) = sv.fields.get_mut(last) else {
        return Err(unsupported(&field.name));
    };
    assign_slot(registry, slot, &field.kind, &entry.tokens, &entry.values)
}

fn assign_slot(
    registry: &TypeRegistry,
    slot: &mut Value,
    kind: &SlotKind,
    tokens: &[Token],
    values: &[Value],
) -> Result<(), ParseError> {
    match kind {
        SlotKind::Optional { elem } => {
            if !slot.is_set() {
                *slot = registry.default_value(elem);
            }
            assign_slot(registry, slot, elem, tokens, values)
        }
        SlotKind::RawToken => {
            if let Some(token) = tokens.first() {
                *slot = Value::Token(token.clone());
            }
            Ok(())
        }
        SlotKind::RawTokens => {
            *slot = Value::Tokens(tokens.to_vec());
            Ok(())
        }
        SlotKind::Custom { hook } => {
            let texts = values
                .iter()
                .map(value_text)
                .collect::<Result<Vec<_>, _>>()?;
            hook.capture(slot, &texts).map_err(hook_failure)
        }
        SlotKind::Decoded { decoder } => {
            for value in values {
                decoder.decode(slot, &value_text(value)?).map_err(hook_failure)?;
            }
            Ok(())
        }
        SlotKind::Collection { elem } => {
            if !slot.is_set() {
                *slot = Value::List(Vec::new());
            }
            let Value::List(items) = slot else {
                return Err(mismatch("list", slot.type_name()));
            };
            if let SlotKind::Custom { hook } = &**elem {
                for value in values {
                    let mut fresh = Value::Unset;
                    hook.capture(&mut fresh, &[value_text(value)?])
                        .map_err(hook_failure)?;
                    items.push(fresh);
                }
            } else {
                for value in values {
                    items.push(coerce(registry, elem, value)?);
                }
            }
            Ok(())
        }
        SlotKind::Str => {
            if !slot.is_set() {
                *slot = Value::Str(String::new());
            }
            let Value::Str(text) = slot else {
                return Err(mismatch("string", slot.type_name()));
            };
            for value in values {
                text.push_str(&value_text(value)?);
            }
            Ok(())
        }
        SlotKind::Counter => {
            if !slot.is_set() {
                *slot = Value::Int(0);
            }
            let Value::Int(count) = slot else {
                return Err(mismatch("int", slot.type_name()));
            };
            // Counting grammar positions: each captured value bumps by one,
            // whatever its text.
            *count += values.len() as i64;
            Ok(())
        }
        SlotKind::Position => Err(unsupported("position slot")),
        scalar => {
            if values.is_empty() {
                // A capture that matched zero tokens has nothing to write.
                return Ok(());
            }
            let coalesced;
            let single = if values.len() > 1 {
                // Multiple candidates coalesce into one string, so "-" "10"
                // assigns as "-10".
                let mut joined = String::new();
                for value in values {
                    joined.push_str(&value_text(value)?);
                }
                coalesced = Value::Str(joined);
                &coalesced
            } else {
                &values[0]
            };
            *slot = coerce(registry, scalar, single)?;
            Ok(())
        }
    }
}

/// Coerce one candidate value to a scalar slot kind.
fn coerce(registry: &TypeRegistry, kind: &SlotKind, value: &Value) -> Result<Value, ParseError> {
    match kind {
        SlotKind::Bool => Ok(match value {
            // A captured boolean passes through; anything else encodes
            // presence, so the capture firing at all means true.
            Value::Bool(b) => Value::Bool(*b),
            _ => Value::Bool(true),
        }),
        SlotKind::Int { bits } => match value {
            Value::Int(n) if int_fits(*n, *bits) => Ok(Value::Int(*n)),
            Value::Str(s) => match parse_int_auto(s) {
                Some(n) if int_fits(n, *bits) => Ok(Value::Int(n)),
                _ => Err(invalid_integer(s)),
            },
            other => Err(mismatch("int", other.type_name())),
        },
        SlotKind::Uint { bits } => match value {
            Value::Uint(n) if uint_fits(*n, *bits) => Ok(Value::Uint(*n)),
            Value::Str(s) => match parse_uint_auto(s) {
                Some(n) if uint_fits(n, *bits) => Ok(Value::Uint(n)),
                _ => Err(invalid_integer(s)),
            },
            other => Err(mismatch("uint", other.type_name())),
        },
        SlotKind::Float { bits } => match value {
            Value::Float(f) => Ok(Value::Float(narrow_float(*f, *bits))),
            Value::Int(n) => Ok(Value::Float(narrow_float(*n as f64, *bits))),
            Value::Str(s) => match s.parse::<f64>() {
                Ok(f) => Ok(Value::Float(narrow_float(f, *bits))),
                Err(_) => Err(ParseError::new(
                    ErrorKind::InvalidFloat { value: s.clone() },
                    Position::default(),
                )),
            },
            other => Err(mismatch("float", other.type_name())),
        },
        // A counter inside a collection: each element is one tick.
        SlotKind::Counter => Ok(Value::Int(1)),
        SlotKind::Struct { type_id } => match value {
            // try_borrow: a value cannot be assigned into a field of itself.
            Value::Struct(r)
                if r.try_borrow().map(|s| s.type_id == *type_id).unwrap_or(false) =>
            {
                Ok(value.clone())
            }
            other => Err(mismatch(registry.type_name(*type_id), other.type_name())),
        },
        SlotKind::Str => Ok(Value::Str(value_text(value)?)),
        SlotKind::Optional { .. }
        | SlotKind::Collection { .. }
        | SlotKind::RawToken
        | SlotKind::RawTokens
        | SlotKind::Position
        | SlotKind::Decoded { .. }
        | SlotKind::Custom { .. } => Err(unsupported("nested non-scalar slot")),
    }
}

/// The string form of a captured value, for concatenation and hooks.
fn value_text(value: &Value) -> Result<String, ParseError> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Uint(n) => Ok(n.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Token(t) => Ok(t.value.clone()),
        other => Err(mismatch("text", other.type_name())),
    }
}

fn hook_failure(error: crate::schema::HookError) -> ParseError {
    ParseError::new(
        ErrorKind::CaptureFailed {
            message: error.to_string(),
        },
        Position::default(),
    )
}

fn invalid_integer(text: &str) -> ParseError {
    ParseError::new(
        ErrorKind::InvalidInteger {
            value: text.to_string(),
        },
        Position::default(),
    )
}

fn mismatch(expected: &str, actual: &str) -> ParseError {
    ParseError::new(
        ErrorKind::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        },
        Position::default(),
    )
}

fn unsupported(field: &str) -> ParseError {
    ParseError::new(
        ErrorKind::UnsupportedFieldType {
            field: field.to_string(),
        },
        Position::default(),
    )
}

// ============================================================================
// NUMERIC PARSING
// ============================================================================

/// Parse an integer with automatic radix detection: `0x`/`0o`/`0b` prefixes,
/// a bare leading zero as octal, underscores as digit separators.
fn parse_int_auto(text: &str) -> Option<i64> {
    let (sign, rest) = split_sign(text);
    let (radix, digits) = split_radix(rest)?;
    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(&format!("{sign}{digits}"), radix).ok()
}

fn parse_uint_auto(text: &str) -> Option<u64> {
    let rest = text.strip_prefix('+').unwrap_or(text);
    let (radix, digits) = split_radix(rest)?;
    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(&digits, radix).ok()
}

fn split_sign(text: &str) -> (&'static str, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        ("-", rest)
    } else if let Some(rest) = text.strip_prefix('+') {
        ("", rest)
    } else {
        ("", text)
    }
}

fn split_radix(text: &str) -> Option<(u32, &str)> {
    if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some((16, rest))
    } else if let Some(rest) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        Some((8, rest))
    } else if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        Some((2, rest))
    } else if text.len() > 1 && text.starts_with('0') {
        Some((8, &text[1..]))
    } else if text.is_empty() {
        None
    } else {
        Some((10, text))
    }
}

fn int_fits(n: i64, bits: u8) -> bool {
    match bits {
        8 => i8::try_from(n).is_ok(),
        16 => i16::try_from(n).is_ok(),
        32 => i32::try_from(n).is_ok(),
        _ => true,
    }
}

fn uint_fits(n: u64, bits: u8) -> bool {
    match bits {
        8 => u8::try_from(n).is_ok(),
        16 => u16::try_from(n).is_ok(),
        32 => u32::try_from(n).is_ok(),
        _ => true,
    }
}

fn narrow_float(f: f64, bits: u8) -> f64 {
    if bits == 32 {
        f as f32 as f64
    } else {
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_radix_detection() {
        assert_eq!(parse_int_auto("42"), Some(42));
        assert_eq!(parse_int_auto("-42"), Some(-42));
        assert_eq!(parse_int_auto("+7"), Some(7));
        assert_eq!(parse_int_auto("0x1F"), Some(31));
        assert_eq!(parse_int_auto("0o17"), Some(15));
        assert_eq!(parse_int_auto("017"), Some(15));
        assert_eq!(parse_int_auto("0b101"), Some(5));
        assert_eq!(parse_int_auto("1_000"), Some(1000));
        assert_eq!(parse_int_auto("0"), Some(0));
        assert_eq!(parse_int_auto("08"), None);
        assert_eq!(parse_int_auto("+"), None);
        assert_eq!(parse_int_auto("0x"), None);
    }

    #[test]
    fn unsigned_rejects_sign() {
        assert_eq!(parse_uint_auto("42"), Some(42));
        assert_eq!(parse_uint_auto("-42"), None);
        assert_eq!(parse_uint_auto("0xff"), Some(255));
    }

    #[test]
    fn width_checks() {
        assert!(int_fits(127, 8));
        assert!(!int_fits(128, 8));
        assert!(int_fits(-128, 8));
        assert!(uint_fits(255, 8));
        assert!(!uint_fits(256, 8));
        assert!(int_fits(i64::MAX, 64));
    }

    #[test]
    fn float_narrowing() {
        let narrowed = narrow_float(1.0e40, 32);
        assert!(narrowed.is_infinite());
        assert_eq!(narrow_float(1.5, 64), 1.5);
    }
}
