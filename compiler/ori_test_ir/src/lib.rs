//! Ori Test IR - Declarations and Content Hashing for Test Selection
//!
//! This crate contains the data the incremental test engine consumes:
//! - Stable declaration ids (`FunctionId`, `TestId`)
//! - Spans and source locations
//! - Normalized bodies stored in a per-body expression arena
//! - Signatures with generics, where-clauses and capabilities
//! - The typed module: functions, tests, static call edges
//! - Span-free 128-bit content hashing of functions and test bodies
//!
//! # Design Philosophy
//!
//! - **Stable Ids**: ids are qualified paths, so persisted hashes survive
//!   recompilation of unchanged code
//! - **Flatten Bodies**: no `Box<Expr>`, children are `ExprId(u32)` indices
//! - **Hash Content, Not Layout**: spans and arena order never reach a hash
//!
//! Float literals are stored as u64 bits for `Hash` compatibility.

pub mod ast;
mod decl;
pub mod hash;
mod ids;
mod span;
mod stack;
mod types;

pub use ast::{BinaryOp, Body, Expr, ExprArena, ExprId, ExprKind, MatchArm, Pattern, UnaryOp};
pub use decl::{CallEdge, FunctionDecl, TargetSet, TestDecl, TypedModule};
pub use hash::{hash_function, hash_test_body, ContentHash, StableHasher};
pub use ids::{FunctionId, TestId};
pub use span::{SourceLocation, Span};
pub use types::{GenericParam, Param, Signature, TypeExpr, WhereClause};
