//! Test helpers: module construction and a scripted evaluator.

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use ori_test_ir::{
    Body, ExprArena, ExprKind, FunctionDecl, FunctionId, Signature, TargetSet, TestDecl, TestId,
    TypeExpr, TypedModule,
};

use crate::executor::{AssertionFailure, TestEnv, TestEvaluator};
use crate::result::TestResult;

/// Builder for small typed modules.
///
/// Function bodies call their callees in order and then yield a version
/// number, so bumping the version is the smallest possible edit.
#[derive(Default)]
pub struct ModuleBuilder {
    module: TypedModule,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` calling `callees`, at version 0.
    pub fn function(self, id: &str, callees: &[&str]) -> Self {
        self.function_v(id, callees, 0)
    }

    /// Add `id` calling `callees`, yielding `version`.
    pub fn function_v(mut self, id: &str, callees: &[&str], version: i64) -> Self {
        let decl = FunctionDecl::new(id, unit_sig(), body(callees, version));
        self.module.functions.push(decl);
        self
    }

    /// Add a function that declares `capability`.
    pub fn effectful(mut self, id: &str, capability: &str) -> Self {
        let decl = FunctionDecl::new(id, unit_sig().with_capability(capability), body(&[], 0));
        self.module.functions.push(decl);
        self
    }

    /// Add a test targeting `targets`; an empty list makes it free-floating.
    pub fn test(mut self, id: &str, targets: &[&str]) -> Self {
        let decl = TestDecl::new(
            id,
            TargetSet::from_targets(targets.iter().copied()),
            Body::single(ExprKind::Unit),
        );
        self.module.tests.push(decl);
        self
    }

    /// Add a fully built test declaration.
    pub fn test_decl(mut self, decl: TestDecl) -> Self {
        self.module.tests.push(decl);
        self
    }

    /// Finish, deriving call edges from the bodies.
    pub fn build(mut self) -> TypedModule {
        self.module.derive_call_edges();
        self.module
    }
}

fn unit_sig() -> Signature {
    Signature::new(Vec::new(), TypeExpr::Unit)
}

fn body(callees: &[&str], version: i64) -> Body {
    let mut arena = ExprArena::new();
    let stmts = callees
        .iter()
        .map(|callee| {
            arena.alloc(ExprKind::Call {
                callee: FunctionId::new(callee),
                args: Vec::new(),
            })
        })
        .collect();
    let result = arena.alloc(ExprKind::Int(version));
    let root = arena.alloc(ExprKind::Block {
        stmts,
        result: Some(result),
    });
    Body::new(arena, root)
}

/// What a scripted test does when executed.
#[derive(Clone, Debug)]
pub enum Script {
    Pass,
    /// Raise an assertion failure with this message.
    Assert(String),
    /// Panic with a plain string payload.
    Panic(String),
    /// Sleep, then pass.
    Sleep(Duration),
}

/// Evaluator that follows a per-test script and records what it ran.
#[derive(Default)]
pub struct ScriptedEvaluator {
    scripts: FxHashMap<TestId, Script>,
    calls: Mutex<Vec<TestId>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, test: &str, script: Script) -> Self {
        self.scripts.insert(TestId::new(test), script);
        self
    }

    /// Tests executed so far, sorted.
    pub fn calls(&self) -> Vec<TestId> {
        let mut calls = self.call_order();
        calls.sort();
        calls
    }

    /// Tests executed so far, in the order they started.
    pub fn call_order(&self) -> Vec<TestId> {
        self.calls.lock().clone()
    }
}

impl TestEvaluator for ScriptedEvaluator {
    fn execute(&self, test: &TestId, _body: &Body, _env: &TestEnv) -> TestResult {
        self.calls.lock().push(test.clone());
        match self.scripts.get(test).cloned().unwrap_or(Script::Pass) {
            Script::Pass => TestResult::pass(Duration::ZERO),
            Script::Assert(message) => AssertionFailure::new(message).raise(),
            Script::Panic(message) => std::panic::panic_any(message),
            Script::Sleep(duration) => {
                std::thread::sleep(duration);
                TestResult::pass(Duration::ZERO)
            }
        }
    }
}
