//! Shared helpers for the engine-level tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ori_test::{AssertionFailure, TestEnv, TestEvaluator, TestResult};
use ori_test_ir::{
    Body, ExprArena, ExprKind, FunctionDecl, FunctionId, Signature, TargetSet, TestDecl, TestId,
    TypeExpr, TypedModule,
};

/// A small source program: functions with a version and callees, tests with
/// targets. Editing a function means bumping its version.
#[derive(Clone, Default)]
pub struct Program {
    functions: BTreeMap<String, (Vec<String>, i64)>,
    tests: BTreeMap<String, Vec<String>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(mut self, id: &str, callees: &[&str]) -> Self {
        let callees = callees.iter().map(|c| (*c).to_string()).collect();
        self.functions.insert(id.to_string(), (callees, 0));
        self
    }

    pub fn test(mut self, id: &str, targets: &[&str]) -> Self {
        let targets = targets.iter().map(|t| (*t).to_string()).collect();
        self.tests.insert(id.to_string(), targets);
        self
    }

    /// Change the body of `id`.
    pub fn edit(mut self, id: &str) -> Self {
        let (_, version) = self
            .functions
            .get_mut(id)
            .unwrap_or_else(|| panic!("no function {id}"));
        *version += 1;
        self
    }

    pub fn remove_function(mut self, id: &str) -> Self {
        self.functions.remove(id);
        for (callees, _) in self.functions.values_mut() {
            callees.retain(|c| c != id);
        }
        self
    }

    pub fn compile(&self) -> TypedModule {
        let mut module = TypedModule::new();
        for (id, (callees, version)) in &self.functions {
            module.functions.push(FunctionDecl::new(
                id.as_str(),
                Signature::new(Vec::new(), TypeExpr::Unit),
                body(callees, *version),
            ));
        }
        for (id, targets) in &self.tests {
            module.tests.push(TestDecl::new(
                id.as_str(),
                TargetSet::from_targets(targets.iter().map(String::as_str)),
                Body::single(ExprKind::Unit),
            ));
        }
        module.derive_call_edges();
        module
    }
}

fn body(callees: &[String], version: i64) -> Body {
    let mut arena = ExprArena::new();
    let stmts = callees
        .iter()
        .map(|callee| {
            arena.alloc(ExprKind::Call {
                callee: FunctionId::new(callee.as_str()),
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

/// Passes every test except the ones told to fail; records what ran.
#[derive(Default)]
pub struct Recorder {
    failing: Vec<TestId>,
    slow: Option<Duration>,
    ran: Mutex<Vec<TestId>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(tests: &[&str]) -> Arc<Self> {
        Arc::new(Recorder {
            failing: tests.iter().map(|t| TestId::new(*t)).collect(),
            ..Self::default()
        })
    }

    /// Every test sleeps for `duration` before passing.
    pub fn sleeping(duration: Duration) -> Arc<Self> {
        Arc::new(Recorder {
            slow: Some(duration),
            ..Self::default()
        })
    }

    /// Executed tests, sorted.
    pub fn ran(&self) -> Vec<String> {
        let mut ran: Vec<String> = self.ran.lock().iter().map(ToString::to_string).collect();
        ran.sort();
        ran
    }
}

impl TestEvaluator for Recorder {
    fn execute(&self, test: &TestId, _body: &Body, env: &TestEnv) -> TestResult {
        self.ran.lock().push(test.clone());
        if let Some(duration) = self.slow {
            std::thread::sleep(duration);
            if env.is_cancelled() {
                return TestResult::skip("interrupted");
            }
        }
        if self.failing.contains(test) {
            AssertionFailure::new(format!("{test} failed")).raise();
        }
        TestResult::pass(Duration::ZERO)
    }
}

/// The three-function chain used throughout: `handle → process → helper`.
pub fn chain() -> Program {
    Program::new()
        .function("app.helper", &[])
        .function("app.process", &["app.helper"])
        .function("app.handle", &["app.process"])
        .test("app.test_helper", &["app.helper"])
        .test("app.test_process", &["app.process"])
        .test("app.test_handle", &["app.handle"])
}
