//! Content hashing of function definitions and test bodies.
//!
//! Produces span-free, structurally-stable 128-bit hashes. Two functions with
//! identical normalized definitions hash identically regardless of source
//! formatting, comments, declaration order, or arena allocation order.
//!
//! A function's hash covers only its own definition, never the definitions
//! of the functions it calls. Dependency propagation is the job of the
//! reverse closure in the test engine.
//!
//! # Strategy
//!
//! Depth-first traversal. For each node:
//! 1. Write a one-byte tag identifying the variant
//! 2. Write non-child data (literals, names, operators, flags)
//! 3. Recurse into children by content
//!
//! `ExprId` values and spans are never hashed. Strings are length-prefixed so
//! adjacent fields cannot alias. Unordered sets in the source language
//! (capabilities, bounds, where-clauses, struct-literal fields) are sorted
//! before hashing.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::ast::{ExprArena, ExprId, ExprKind, MatchArm, Pattern};
use crate::stack::ensure_sufficient_stack;
use crate::{Body, FunctionDecl, Signature, TestDecl, TypeExpr};

/// A 128-bit XXH3 content hash.
///
/// A collision between two different definitions would let a stale test
/// result through, so the width is deliberately larger than a hash-map hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Create a content hash from a raw value.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value.to_le_bytes())
    }

    /// Get the underlying hash value.
    #[must_use]
    pub const fn value(&self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    /// Hash a byte slice directly.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::new(xxhash_rust::xxh3::xxh3_128(data))
    }

    /// Format as a 32-digit hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.value())
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        u128::from_str_radix(s, 16).ok().map(Self::new)
    }

    /// Combine hashes where order is significant.
    #[must_use]
    pub fn combine_ordered(hashes: &[ContentHash]) -> Self {
        let mut state = StableHasher::new();
        state.write_tag(tag::ORDERED);
        state.write_len(hashes.len());
        for hash in hashes {
            state.write_hash(*hash);
        }
        state.finish()
    }

    /// Combine hashes as a set.
    ///
    /// Components are sorted and deduplicated first, so neither their order
    /// nor repetitions affect the result.
    #[must_use]
    pub fn combine_unordered<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = ContentHash>,
    {
        let mut sorted: Vec<ContentHash> = hashes.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut state = StableHasher::new();
        state.write_tag(tag::UNORDERED);
        state.write_len(sorted.len());
        for hash in sorted {
            state.write_hash(hash);
        }
        state.finish()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.value())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:08x}..)", self.value() >> 96)
    }
}

/// Streaming hasher with an explicit, platform-independent encoding.
///
/// Does not implement `std::hash::Hasher`: std `Hash` impls write `usize`
/// in native width and are free to change between releases, which would
/// silently invalidate persisted hashes.
pub struct StableHasher {
    state: Xxh3,
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StableHasher {
    pub fn new() -> Self {
        StableHasher { state: Xxh3::new() }
    }

    #[inline]
    pub fn write_tag(&mut self, tag: u8) {
        self.state.update(&[tag]);
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.state.update(&[u8::from(v)]);
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        self.state.update(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, v: u64) {
        self.state.update(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_i64(&mut self, v: i64) {
        self.state.update(&v.to_le_bytes());
    }

    /// Lengths are written as `u64` on every platform.
    #[inline]
    pub fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.state.update(s.as_bytes());
    }

    #[inline]
    pub fn write_hash(&mut self, hash: ContentHash) {
        self.state.update(&hash.0);
    }

    pub fn finish(&self) -> ContentHash {
        ContentHash::new(self.state.digest128())
    }
}

/// Node tags. Values are part of the persisted format: never reuse or
/// renumber, only append.
mod tag {
    pub const ORDERED: u8 = 0x01;
    pub const UNORDERED: u8 = 0x02;
    pub const FUNCTION: u8 = 0x03;
    pub const TEST: u8 = 0x04;
    pub const NONE: u8 = 0x05;
    pub const SOME: u8 = 0x06;

    // Types
    pub const TY_UNIT: u8 = 0x10;
    pub const TY_NAMED: u8 = 0x11;
    pub const TY_TUPLE: u8 = 0x12;
    pub const TY_FUNCTION: u8 = 0x13;
    pub const TY_GENERIC: u8 = 0x14;

    // Expressions
    pub const INT: u8 = 0x20;
    pub const FLOAT: u8 = 0x21;
    pub const BOOL: u8 = 0x22;
    pub const CHAR: u8 = 0x23;
    pub const STR: u8 = 0x24;
    pub const UNIT: u8 = 0x25;
    pub const IDENT: u8 = 0x26;
    pub const CALL: u8 = 0x27;
    pub const CALL_VALUE: u8 = 0x28;
    pub const METHOD_CALL: u8 = 0x29;
    pub const BINARY: u8 = 0x2a;
    pub const UNARY: u8 = 0x2b;
    pub const IF: u8 = 0x2c;
    pub const MATCH: u8 = 0x2d;
    pub const RETURN: u8 = 0x2e;
    pub const BLOCK: u8 = 0x2f;
    pub const LET: u8 = 0x30;
    pub const LAMBDA: u8 = 0x31;
    pub const LIST: u8 = 0x32;
    pub const MAP: u8 = 0x33;
    pub const STRUCT: u8 = 0x34;
    pub const FIELD: u8 = 0x35;
    pub const INDEX: u8 = 0x36;
    pub const ERROR: u8 = 0x37;

    // Patterns
    pub const PAT_WILDCARD: u8 = 0x40;
    pub const PAT_BINDING: u8 = 0x41;
    pub const PAT_LITERAL: u8 = 0x42;
    pub const PAT_TUPLE: u8 = 0x43;
    pub const PAT_VARIANT: u8 = 0x44;
}

/// Hash a function's normalized definition: signature and body.
pub fn hash_function(function: &FunctionDecl) -> ContentHash {
    let mut state = StableHasher::new();
    state.write_tag(tag::FUNCTION);
    hash_signature(&function.signature, &mut state);
    hash_body(&function.body, &mut state);
    state.finish()
}

/// Hash a test's own definition: body and attributes.
///
/// Targets are not included; they are accounted for by the test's inputs
/// hash.
pub fn hash_test_body(test: &TestDecl) -> ContentHash {
    let mut state = StableHasher::new();
    state.write_tag(tag::TEST);
    hash_optional_str(test.skip_reason.as_deref(), &mut state);
    hash_optional_str(test.fail_expected.as_deref(), &mut state);
    hash_body(&test.body, &mut state);
    state.finish()
}

fn hash_optional_str(s: Option<&str>, state: &mut StableHasher) {
    match s {
        Some(s) => {
            state.write_tag(tag::SOME);
            state.write_str(s);
        }
        None => state.write_tag(tag::NONE),
    }
}

/// Hash the signature with set-like parts in canonical order.
fn hash_signature(sig: &Signature, state: &mut StableHasher) {
    let mut generics: Vec<(&str, Vec<&str>)> = sig
        .generics
        .iter()
        .map(|g| (g.name.as_str(), sorted_unique(&g.bounds)))
        .collect();
    generics.sort();
    state.write_len(generics.len());
    for (name, bounds) in &generics {
        state.write_str(name);
        hash_str_list(bounds, state);
    }

    // Where-clauses are ordered by their own hash so the subject type does
    // not need a total order of its own.
    let mut clauses: Vec<ContentHash> = sig
        .where_clauses
        .iter()
        .map(|clause| {
            let mut clause_state = StableHasher::new();
            hash_type(&clause.subject, &mut clause_state);
            hash_str_list(&sorted_unique(&clause.bounds), &mut clause_state);
            clause_state.finish()
        })
        .collect();
    clauses.sort_unstable();
    clauses.dedup();
    state.write_len(clauses.len());
    for clause in clauses {
        state.write_hash(clause);
    }

    state.write_len(sig.params.len());
    for param in &sig.params {
        state.write_str(&param.name);
        hash_type(&param.ty, state);
    }

    match &sig.ret {
        Some(ret) => {
            state.write_tag(tag::SOME);
            hash_type(ret, state);
        }
        None => state.write_tag(tag::NONE),
    }

    hash_str_list(&sorted_unique(&sig.capabilities), state);
}

fn sorted_unique(items: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = items.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

fn hash_str_list(items: &[&str], state: &mut StableHasher) {
    state.write_len(items.len());
    for item in items {
        state.write_str(item);
    }
}

fn hash_type(ty: &TypeExpr, state: &mut StableHasher) {
    ensure_sufficient_stack(|| hash_type_kind(ty, state));
}

fn hash_type_kind(ty: &TypeExpr, state: &mut StableHasher) {
    match ty {
        TypeExpr::Unit => state.write_tag(tag::TY_UNIT),
        TypeExpr::Named { name, args } => {
            state.write_tag(tag::TY_NAMED);
            state.write_str(name);
            hash_type_list(args, state);
        }
        TypeExpr::Tuple(elems) => {
            state.write_tag(tag::TY_TUPLE);
            hash_type_list(elems, state);
        }
        TypeExpr::Function { params, ret } => {
            state.write_tag(tag::TY_FUNCTION);
            hash_type_list(params, state);
            hash_type(ret, state);
        }
        TypeExpr::Generic(name) => {
            state.write_tag(tag::TY_GENERIC);
            state.write_str(name);
        }
    }
}

fn hash_type_list(types: &[TypeExpr], state: &mut StableHasher) {
    state.write_len(types.len());
    for ty in types {
        hash_type(ty, state);
    }
}

fn hash_body(body: &Body, state: &mut StableHasher) {
    hash_node(&body.arena, body.root, state);
}

fn hash_optional_node(arena: &ExprArena, id: Option<ExprId>, state: &mut StableHasher) {
    match id {
        Some(id) => {
            state.write_tag(tag::SOME);
            hash_node(arena, id, state);
        }
        None => state.write_tag(tag::NONE),
    }
}

fn hash_nodes(arena: &ExprArena, ids: &[ExprId], state: &mut StableHasher) {
    state.write_len(ids.len());
    for &id in ids {
        hash_node(arena, id, state);
    }
}

/// Hash a single node and recurse into its children.
fn hash_node(arena: &ExprArena, id: ExprId, state: &mut StableHasher) {
    ensure_sufficient_stack(|| hash_node_kind(arena, arena.kind(id), state));
}

fn hash_node_kind(arena: &ExprArena, kind: &ExprKind, state: &mut StableHasher) {
    match kind {
        // Literals
        ExprKind::Int(v) => {
            state.write_tag(tag::INT);
            state.write_i64(*v);
        }
        ExprKind::Float(bits) => {
            state.write_tag(tag::FLOAT);
            state.write_u64(*bits);
        }
        ExprKind::Bool(v) => {
            state.write_tag(tag::BOOL);
            state.write_bool(*v);
        }
        ExprKind::Char(c) => {
            state.write_tag(tag::CHAR);
            state.write_u32(u32::from(*c));
        }
        ExprKind::Str(s) => {
            state.write_tag(tag::STR);
            state.write_str(s);
        }
        ExprKind::Unit => state.write_tag(tag::UNIT),
        ExprKind::Error => state.write_tag(tag::ERROR),

        ExprKind::Ident(name) => {
            state.write_tag(tag::IDENT);
            state.write_str(name);
        }

        // Calls
        ExprKind::Call { callee, args } => {
            state.write_tag(tag::CALL);
            state.write_str(callee.as_str());
            hash_nodes(arena, args, state);
        }
        ExprKind::CallValue { func, args } => {
            state.write_tag(tag::CALL_VALUE);
            hash_node(arena, *func, state);
            hash_nodes(arena, args, state);
        }
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => {
            state.write_tag(tag::METHOD_CALL);
            state.write_str(method);
            hash_node(arena, *receiver, state);
            hash_nodes(arena, args, state);
        }

        // Operators
        ExprKind::Binary { op, left, right } => {
            state.write_tag(tag::BINARY);
            state.write_tag(*op as u8);
            hash_node(arena, *left, state);
            hash_node(arena, *right, state);
        }
        ExprKind::Unary { op, operand } => {
            state.write_tag(tag::UNARY);
            state.write_tag(*op as u8);
            hash_node(arena, *operand, state);
        }

        // Control flow
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            state.write_tag(tag::IF);
            hash_node(arena, *cond, state);
            hash_node(arena, *then_branch, state);
            hash_optional_node(arena, *else_branch, state);
        }
        ExprKind::Match { scrutinee, arms } => {
            state.write_tag(tag::MATCH);
            hash_node(arena, *scrutinee, state);
            state.write_len(arms.len());
            for arm in arms {
                hash_arm(arena, arm, state);
            }
        }
        ExprKind::Return(value) => {
            state.write_tag(tag::RETURN);
            hash_optional_node(arena, *value, state);
        }

        // Bindings
        ExprKind::Block { stmts, result } => {
            state.write_tag(tag::BLOCK);
            hash_nodes(arena, stmts, state);
            hash_optional_node(arena, *result, state);
        }
        ExprKind::Let {
            pattern,
            mutable,
            init,
        } => {
            state.write_tag(tag::LET);
            state.write_bool(*mutable);
            hash_pattern(arena, pattern, state);
            hash_node(arena, *init, state);
        }
        ExprKind::Lambda { params, body } => {
            state.write_tag(tag::LAMBDA);
            state.write_len(params.len());
            for param in params {
                state.write_str(param);
            }
            hash_node(arena, *body, state);
        }

        // Collections and access
        ExprKind::List(elems) => {
            state.write_tag(tag::LIST);
            hash_nodes(arena, elems, state);
        }
        ExprKind::Map(entries) => {
            state.write_tag(tag::MAP);
            state.write_len(entries.len());
            for &(key, value) in entries {
                hash_node(arena, key, state);
                hash_node(arena, value, state);
            }
        }
        ExprKind::Struct { name, fields } => {
            state.write_tag(tag::STRUCT);
            state.write_str(name);
            let mut sorted: Vec<&(String, ExprId)> = fields.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            state.write_len(sorted.len());
            for (field, value) in sorted {
                state.write_str(field);
                hash_node(arena, *value, state);
            }
        }
        ExprKind::Field { receiver, field } => {
            state.write_tag(tag::FIELD);
            state.write_str(field);
            hash_node(arena, *receiver, state);
        }
        ExprKind::Index { receiver, index } => {
            state.write_tag(tag::INDEX);
            hash_node(arena, *receiver, state);
            hash_node(arena, *index, state);
        }
    }
}

fn hash_arm(arena: &ExprArena, arm: &MatchArm, state: &mut StableHasher) {
    hash_pattern(arena, &arm.pattern, state);
    hash_optional_node(arena, arm.guard, state);
    hash_node(arena, arm.body, state);
}

fn hash_pattern(arena: &ExprArena, pattern: &Pattern, state: &mut StableHasher) {
    ensure_sufficient_stack(|| hash_pattern_kind(arena, pattern, state));
}

fn hash_pattern_kind(arena: &ExprArena, pattern: &Pattern, state: &mut StableHasher) {
    match pattern {
        Pattern::Wildcard => state.write_tag(tag::PAT_WILDCARD),
        Pattern::Binding(name) => {
            state.write_tag(tag::PAT_BINDING);
            state.write_str(name);
        }
        Pattern::Literal(id) => {
            state.write_tag(tag::PAT_LITERAL);
            hash_node(arena, *id, state);
        }
        Pattern::Tuple(elems) => {
            state.write_tag(tag::PAT_TUPLE);
            state.write_len(elems.len());
            for elem in elems {
                hash_pattern(arena, elem, state);
            }
        }
        Pattern::Variant { name, fields } => {
            state.write_tag(tag::PAT_VARIANT);
            state.write_str(name);
            state.write_len(fields.len());
            for field in fields {
                hash_pattern(arena, field, state);
            }
        }
    }
}
