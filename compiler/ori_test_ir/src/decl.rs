//! Declarations of a typed module.
//!
//! This is the shape the front end hands to the test engine after type
//! checking: functions with signature and body, tests with their targets,
//! and one edge per static call site.

use std::sync::Arc;

use crate::{Body, FunctionId, Signature, SourceLocation, Span, TestId};

/// A function definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub id: FunctionId,
    pub signature: Signature,
    pub body: Body,
    pub span: Span,
}

impl FunctionDecl {
    pub fn new(id: impl Into<FunctionId>, signature: Signature, body: Body) -> Self {
        FunctionDecl {
            id: id.into(),
            signature,
            body,
            span: Span::DUMMY,
        }
    }
}

/// The functions a test verifies.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetSet {
    /// Non-empty, duplicate-free, in declaration order.
    Explicit(Vec<FunctionId>),
    /// No declared target. Excluded from incremental selection.
    FreeFloating,
}

impl TargetSet {
    /// Build a target set from a declared target list.
    ///
    /// Duplicates collapse to their first occurrence; an empty list yields
    /// `FreeFloating`.
    pub fn from_targets<I>(targets: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FunctionId>,
    {
        let mut explicit: Vec<FunctionId> = Vec::new();
        for target in targets {
            let target = target.into();
            if !explicit.contains(&target) {
                explicit.push(target);
            }
        }
        if explicit.is_empty() {
            TargetSet::FreeFloating
        } else {
            TargetSet::Explicit(explicit)
        }
    }

    pub fn is_free_floating(&self) -> bool {
        matches!(self, TargetSet::FreeFloating)
    }

    /// Declared targets; empty for free-floating tests.
    pub fn targets(&self) -> &[FunctionId] {
        match self {
            TargetSet::Explicit(targets) => targets,
            TargetSet::FreeFloating => &[],
        }
    }
}

/// A test declaration.
///
/// `body` is shared so a test can be handed to a worker thread without
/// copying its tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestDecl {
    pub id: TestId,
    pub targets: TargetSet,
    pub body: Arc<Body>,
    /// `#skip("reason")`: reported as skipped, never executed.
    pub skip_reason: Option<String>,
    /// `#fail("substring")`: the body is expected to fail with a message
    /// containing this substring.
    pub fail_expected: Option<String>,
    pub location: Option<SourceLocation>,
}

impl TestDecl {
    pub fn new(id: impl Into<TestId>, targets: TargetSet, body: Body) -> Self {
        TestDecl {
            id: id.into(),
            targets,
            body: Arc::new(body),
            skip_reason: None,
            fail_expected: None,
            location: None,
        }
    }

    #[must_use]
    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_fail_expected(mut self, substring: impl Into<String>) -> Self {
        self.fail_expected = Some(substring.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// One static call site: `caller` calls `callee`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallEdge {
    pub caller: FunctionId,
    pub callee: FunctionId,
}

impl CallEdge {
    pub fn new(caller: impl Into<FunctionId>, callee: impl Into<FunctionId>) -> Self {
        CallEdge {
            caller: caller.into(),
            callee: callee.into(),
        }
    }
}

/// A type-checked module as consumed by the test engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypedModule {
    pub functions: Vec<FunctionDecl>,
    pub tests: Vec<TestDecl>,
    pub call_edges: Vec<CallEdge>,
}

impl TypedModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a function by id.
    pub fn function(&self, id: &FunctionId) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| &f.id == id)
    }

    /// Look up a test by id.
    pub fn test(&self, id: &TestId) -> Option<&TestDecl> {
        self.tests.iter().find(|t| &t.id == id)
    }

    /// Add an edge for every static `Call` in every function body that is not
    /// already present.
    ///
    /// For front ends that do not report call sites themselves.
    pub fn derive_call_edges(&mut self) {
        let mut edges = std::mem::take(&mut self.call_edges);
        for function in &self.functions {
            for callee in function.body.callees() {
                edges.push(CallEdge {
                    caller: function.id.clone(),
                    callee,
                });
            }
        }
        edges.sort();
        edges.dedup();
        self.call_edges = edges;
    }
}
