//! Normalized function and test bodies.
//!
//! Bodies arrive from the front end already stripped of comments and
//! formatting. Nodes live in a per-body arena and refer to each other by
//! `ExprId`; ids are allocation order and are never hashed.

use std::fmt;

use crate::{FunctionId, Span};

/// Index of an expression in its body's arena.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// Operator discriminants are hashed: append new operators, never reorder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Pattern in a `let` binding or match arm.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    Wildcard,
    Binding(String),
    Literal(ExprId),
    Tuple(Vec<Pattern>),
    Variant { name: String, fields: Vec<Pattern> },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<ExprId>,
    pub body: ExprId,
}

/// Expression kinds.
///
/// `Call` is a static call of a known function and is what the registry turns
/// into a caller edge. Calls through values (`CallValue`) and methods are
/// dispatched dynamically and produce no edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    // Literals
    Int(i64),
    /// Bit pattern of an `f64`.
    Float(u64),
    Bool(bool),
    Char(char),
    Str(String),
    Unit,

    Ident(String),

    // Calls
    Call {
        callee: FunctionId,
        args: Vec<ExprId>,
    },
    CallValue {
        func: ExprId,
        args: Vec<ExprId>,
    },
    MethodCall {
        receiver: ExprId,
        method: String,
        args: Vec<ExprId>,
    },

    // Operators
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },

    // Control flow
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    Match {
        scrutinee: ExprId,
        arms: Vec<MatchArm>,
    },
    Return(Option<ExprId>),

    // Bindings
    Block {
        stmts: Vec<ExprId>,
        result: Option<ExprId>,
    },
    Let {
        pattern: Pattern,
        mutable: bool,
        init: ExprId,
    },
    Lambda {
        params: Vec<String>,
        body: ExprId,
    },

    // Collections and access
    List(Vec<ExprId>),
    Map(Vec<(ExprId, ExprId)>),
    Struct {
        name: String,
        fields: Vec<(String, ExprId)>,
    },
    Field {
        receiver: ExprId,
        field: String,
    },
    Index {
        receiver: ExprId,
        index: ExprId,
    },

    /// Placeholder left by error recovery.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Flat storage for one body's expressions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression without source position.
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        self.alloc_at(kind, Span::DUMMY)
    }

    /// Allocate an expression at `span`.
    ///
    /// # Panics
    ///
    /// Panics if the arena exceeds `u32::MAX` nodes.
    pub fn alloc_at(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = u32::try_from(self.exprs.len())
            .unwrap_or_else(|_| panic!("expression arena overflow"));
        self.exprs.push(Expr { kind, span });
        ExprId(id)
    }

    /// Get an expression by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was allocated by a different arena and is out of bounds.
    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Kind of an expression.
    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.get(id).kind
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Iterate over all expressions in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.exprs.iter()
    }
}

/// A function or test body: an arena plus its root expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Body {
    pub arena: ExprArena,
    pub root: ExprId,
}

impl Body {
    pub fn new(arena: ExprArena, root: ExprId) -> Self {
        Body { arena, root }
    }

    /// Body consisting of a single expression.
    pub fn single(kind: ExprKind) -> Self {
        let mut arena = ExprArena::new();
        let root = arena.alloc(kind);
        Body { arena, root }
    }

    /// Body that calls each of `callees` in sequence, discarding results.
    ///
    /// Handy for front ends and tests that only care about the call graph.
    pub fn calling(callees: &[FunctionId]) -> Self {
        let mut arena = ExprArena::new();
        let stmts = callees
            .iter()
            .map(|callee| {
                arena.alloc(ExprKind::Call {
                    callee: callee.clone(),
                    args: Vec::new(),
                })
            })
            .collect();
        let root = arena.alloc(ExprKind::Block {
            stmts,
            result: None,
        });
        Body { arena, root }
    }

    /// Functions called statically anywhere in this body, sorted and deduplicated.
    pub fn callees(&self) -> Vec<FunctionId> {
        let mut callees: Vec<FunctionId> = self
            .arena
            .iter()
            .filter_map(|expr| match &expr.kind {
                ExprKind::Call { callee, .. } => Some(callee.clone()),
                _ => None,
            })
            .collect();
        callees.sort();
        callees.dedup();
        callees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_get() {
        let mut arena = ExprArena::new();
        let a = arena.alloc(ExprKind::Int(1));
        let b = arena.alloc_at(ExprKind::Bool(true), Span::new(3, 7));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.kind(a), &ExprKind::Int(1));
        assert_eq!(arena.get(b).span, Span::new(3, 7));
    }

    #[test]
    fn callees_are_sorted_and_unique() {
        let helper = FunctionId::new("app.helper");
        let log = FunctionId::new("app.log");
        let body = Body::calling(&[log.clone(), helper.clone(), log.clone()]);
        assert_eq!(body.callees(), vec![helper, log]);
    }

    #[test]
    fn dynamic_calls_are_not_callees() {
        let mut arena = ExprArena::new();
        let func = arena.alloc(ExprKind::Ident("f".into()));
        let root = arena.alloc(ExprKind::CallValue {
            func,
            args: Vec::new(),
        });
        assert!(Body::new(arena, root).callees().is_empty());
    }
}
