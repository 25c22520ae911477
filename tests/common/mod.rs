#![allow(dead_code)]

//! Shared helpers for the engine test suite: a minimal tokenizer plus
//! shorthand constructors for schemas and field descriptors.

use std::collections::HashSet;
use std::sync::Arc;

use anvaya::{
    FieldDescriptor, Position, SlotKind, StructType, Token, TokenKind, TokenStream, TypeId,
    TypeRegistry,
};

/// Whitespace; elided from grammar positions, visible to raw cursors.
pub const WS: TokenKind = 0;
pub const IDENT: TokenKind = 1;
pub const INT: TokenKind = 2;
pub const PUNCT: TokenKind = 3;

/// Tokenize into identifiers, integers, punctuation and elided whitespace.
pub fn tokenize(source: &str) -> TokenStream {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1u32;
    let mut column = 1u32;

    while let Some(&(start, c)) = chars.peek() {
        let pos = Position::new(start, line, column);
        if c.is_whitespace() {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !c.is_whitespace() {
                    break;
                }
                chars.next();
                text.push(c);
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            tokens.push(Token::new(WS, text, pos));
        } else if c.is_ascii_digit() {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                chars.next();
                text.push(c);
                column += 1;
            }
            tokens.push(Token::new(INT, text, pos));
        } else if c.is_alphabetic() || c == '_' {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !c.is_alphanumeric() && c != '_' {
                    break;
                }
                chars.next();
                text.push(c);
                column += 1;
            }
            tokens.push(Token::new(IDENT, text, pos));
        } else {
            chars.next();
            tokens.push(Token::new(PUNCT, c.to_string(), pos));
            column += 1;
        }
    }

    let elide: HashSet<TokenKind> = [WS].into_iter().collect();
    TokenStream::new(tokens, elide)
}

/// Register a single type and hand back the registry and its id.
pub fn registry_of(ty: StructType) -> (Arc<TypeRegistry>, TypeId) {
    let mut registry = TypeRegistry::new();
    let id = registry.register(ty);
    (Arc::new(registry), id)
}

/// Shorthand for a single-index field descriptor.
pub fn desc(name: &str, index: usize, kind: SlotKind) -> FieldDescriptor {
    FieldDescriptor::new(name, vec![index], kind)
}
