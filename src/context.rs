//! The speculative execution substrate for one parse.
//!
//! A [`ParseContext`] couples a token cursor with the two pieces of state
//! speculation needs: an append-only deferred-capture log and a shared
//! deepest-error witness. Branching forks the cursor and starts an empty log
//! tail; accepting a branch adopts its cursor and splices its log tail onto
//! the parent's. The deepest-error record is shared by every branch of one
//! parse, so a diagnostic from an abandoned speculation survives to be
//! surfaced if nothing better comes along.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::capture;
use crate::errors::ParseError;
use crate::schema::{FieldDescriptor, TypeRegistry};
use crate::token::{Cursor, Token, TokenKind, TokenStream};
use crate::value::{StructRef, Value};

/// Per-parse knobs. Owned by the parser, shared by reference with every
/// context and branch of one parse.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Ceiling on iterations of any single repeating grammar position.
    pub max_iterations: usize,
    /// How many significant tokens a speculative branch may consume before a
    /// failure in it stops being recoverable. Zero commits on the first
    /// consumed token.
    pub lookahead: usize,
    /// Whether tokens may remain after the root match.
    pub allow_trailing: bool,
    /// Token kinds whose literals compare case-insensitively.
    pub case_insensitive: HashSet<TokenKind>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000_000,
            lookahead: 0,
            allow_trailing: false,
            case_insensitive: HashSet::new(),
        }
    }
}

/// A recorded intent to write captured values into a destination slot,
/// executed when the enclosing struct commits.
#[derive(Debug, Clone)]
pub(crate) struct DeferredCapture {
    pub(crate) tokens: Vec<Token>,
    pub(crate) target: StructRef,
    pub(crate) field: FieldDescriptor,
    pub(crate) values: Vec<Value>,
}

#[derive(Debug, Default)]
struct DeepestError {
    cursor: usize,
    error: Option<ParseError>,
}

/// One speculative view of the parse: a cursor plus a deferred-capture log
/// tail. Cheap to branch; committed with [`ParseContext::accept`].
pub struct ParseContext<'p> {
    cursor: Cursor<'p>,
    config: &'p ParseConfig,
    registry: &'p TypeRegistry,
    deferred: Vec<DeferredCapture>,
    deepest: Rc<RefCell<DeepestError>>,
}

impl<'p> ParseContext<'p> {
    pub fn new(
        stream: &'p TokenStream,
        config: &'p ParseConfig,
        registry: &'p TypeRegistry,
    ) -> Self {
        Self {
            cursor: stream.cursor(),
            config,
            registry,
            deferred: Vec::new(),
            deepest: Rc::new(RefCell::new(DeepestError::default())),
        }
    }

    // ------------------------------------------------------------------
    // Cursor operations
    // ------------------------------------------------------------------

    pub fn peek(&self, k: usize) -> &'p Token {
        self.cursor.peek(k)
    }

    pub fn next(&mut self) -> &'p Token {
        self.cursor.next()
    }

    pub fn raw_peek(&self, k: usize) -> &'p Token {
        self.cursor.raw_peek(k)
    }

    pub fn raw_cursor(&self) -> usize {
        self.cursor.raw_cursor()
    }

    pub fn range(&self, start: usize, end: usize) -> &'p [Token] {
        self.cursor.range(start, end)
    }

    /// Mutable access to the underlying cursor, for custom sub-parsers.
    pub fn cursor_mut(&mut self) -> &mut Cursor<'p> {
        &mut self.cursor
    }

    pub(crate) fn rewind(&mut self, raw: usize) {
        self.cursor.rewind(raw);
    }

    pub(crate) fn case_insensitive(&self, kind: TokenKind) -> bool {
        self.config.case_insensitive.contains(&kind)
    }

    pub(crate) fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    pub(crate) fn registry(&self) -> &'p TypeRegistry {
        self.registry
    }

    // ------------------------------------------------------------------
    // Branching
    // ------------------------------------------------------------------

    /// Fork: same stream and deepest-error witness, independent cursor,
    /// empty deferred-capture tail.
    pub fn branch(&self) -> ParseContext<'p> {
        ParseContext {
            cursor: self.cursor,
            config: self.config,
            registry: self.registry,
            deferred: Vec::new(),
            deepest: Rc::clone(&self.deepest),
        }
    }

    /// Commit a branch: adopt its cursor and splice its capture log tail.
    pub fn accept(&mut self, branch: ParseContext<'p>) {
        self.cursor = branch.cursor;
        self.deferred.extend(branch.deferred);
    }

    /// Decide whether a failure inside `branch` is past the point of
    /// recovery. A branch that has consumed more significant tokens than the
    /// configured lookahead has committed to its path, so its failure is the
    /// real diagnosis; the branch is accepted first so partial captures
    /// survive into a best-effort value tree. Unrecoverable errors always
    /// stop.
    pub fn stop(&mut self, error: &ParseError, branch: ParseContext<'p>) -> bool {
        if error.is_fatal() {
            return true;
        }
        let consumed = self
            .cursor
            .significant_between(self.raw_cursor(), branch.raw_cursor());
        if consumed > self.config.lookahead {
            self.accept(branch);
            self.maybe_update_error(error);
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Deepest-error witness
    // ------------------------------------------------------------------

    /// Record `error` as the parse's best diagnosis if this context has
    /// progressed at least as far as the current record. The witness cursor
    /// never moves backwards.
    pub fn maybe_update_error(&self, error: &ParseError) {
        let mut deepest = self.deepest.borrow_mut();
        if self.raw_cursor() >= deepest.cursor {
            deepest.cursor = self.raw_cursor();
            deepest.error = Some(error.clone());
        }
    }

    /// The recorded deepest error, or `fallback` if none was recorded.
    pub fn deepest_error(&self, fallback: ParseError) -> ParseError {
        self.deepest.borrow().error.clone().unwrap_or(fallback)
    }

    #[cfg(test)]
    pub(crate) fn deepest_cursor(&self) -> usize {
        self.deepest.borrow().cursor
    }

    // ------------------------------------------------------------------
    // Deferred captures
    // ------------------------------------------------------------------

    /// Enqueue a capture to run when the enclosing struct commits.
    pub fn defer(
        &mut self,
        tokens: &[Token],
        target: StructRef,
        field: FieldDescriptor,
        values: Vec<Value>,
    ) {
        self.deferred.push(DeferredCapture {
            tokens: tokens.to_vec(),
            target,
            field,
            values,
        });
    }

    /// Execute the deferred captures in match order. Stops at the first
    /// failure; writes already performed stay in place, which is what lets a
    /// failing parse still surface a partial value tree.
    pub fn apply(&mut self) -> Result<(), ParseError> {
        let pending = std::mem::take(&mut self.deferred);
        for entry in &pending {
            capture::assign(self.registry, entry)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pending_captures(&self) -> usize {
        self.deferred.len()
    }
}
