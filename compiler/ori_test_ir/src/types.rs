//! Function signatures as seen by change detection.
//!
//! Types are carried in their resolved, written form. The hasher only needs
//! structural equality, not type identity.

/// A resolved type expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// `void` / `()`.
    Unit,
    /// Named type with optional arguments: `int`, `[T]` as `List<T>`, `Result<T, E>`.
    Named { name: String, args: Vec<TypeExpr> },
    /// `(A, B)`.
    Tuple(Vec<TypeExpr>),
    /// `(A, B) -> C`.
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
    /// Reference to a generic parameter in scope.
    Generic(String),
}

impl TypeExpr {
    /// Shorthand for a named type without arguments.
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Shorthand for a named type applied to arguments.
    pub fn apply(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args,
        }
    }
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Param {
            name: name.into(),
            ty,
        }
    }
}

/// A generic parameter with its trait bounds: `<T: Eq + Clone>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GenericParam {
    pub name: String,
    pub bounds: Vec<String>,
}

/// A `where` clause constraint: `where T.Item: Printable`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WhereClause {
    pub subject: TypeExpr,
    pub bounds: Vec<String>,
}

/// Everything about a function besides its body.
///
/// `capabilities` are the effect requirements (`uses Http, FileSystem`).
/// Bounds, where-clauses and capabilities are unordered sets in the source
/// language; the hasher canonicalizes their order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    pub generics: Vec<GenericParam>,
    pub where_clauses: Vec<WhereClause>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub capabilities: Vec<String>,
}

impl Signature {
    /// Signature with the given parameters and return type.
    pub fn new(params: Vec<Param>, ret: TypeExpr) -> Self {
        Signature {
            params,
            ret: Some(ret),
            ..Signature::default()
        }
    }

    /// Add a capability requirement.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Add a generic parameter.
    #[must_use]
    pub fn with_generic(mut self, name: impl Into<String>, bounds: &[&str]) -> Self {
        self.generics.push(GenericParam {
            name: name.into(),
            bounds: bounds.iter().map(|b| (*b).to_string()).collect(),
        });
        self
    }

    /// Returns `true` if the function declares any capability.
    pub fn is_effectful(&self) -> bool {
        !self.capabilities.is_empty()
    }
}
