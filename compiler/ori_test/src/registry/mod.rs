//! Test registry: which tests target which functions, and who calls whom.
//!
//! Rebuilt from scratch on every run; only hashes and results outlive it.
//!
//! # Architecture
//!
//! ```text
//! TypedModule.functions ─┐
//! TypedModule.call_edges ┼──→ FuncIdx arena (dense u32 per FunctionId)
//! TestDecl.targets ──────┘          │
//!                                   ├──→ callers[callee] = [caller, ...]
//!                                   └──→ tests_for[function] = [test, ...]
//! TypedModule.tests ──→ targeted | free_floating | unresolved
//! ```
//!
//! Every function id that appears anywhere (declared, edge endpoint, or
//! target) gets an index, so the closure can run over a bitset without
//! hashing ids.

use std::fmt;

use rustc_hash::FxHashMap;

use ori_test_ir::{FunctionId, TestDecl, TestId, TypedModule};

use crate::report::Warning;
use crate::result::CoverageReport;

/// Dense index of a function within one registry.
///
/// Only meaningful for the registry that assigned it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FuncIdx(u32);

impl FuncIdx {
    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        FuncIdx(raw)
    }

    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for FuncIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncIdx({})", self.0)
    }
}

/// Per-function data, indexed by `FuncIdx`.
#[derive(Clone, Debug)]
struct FunctionNode {
    id: FunctionId,
    declared: bool,
    effectful: bool,
    /// Deduplicated, sorted.
    callers: Vec<FuncIdx>,
    /// Sorted, since tests are registered in id order.
    tests: Vec<TestId>,
}

/// Dependency graph and test index for one run.
#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    nodes: Vec<FunctionNode>,
    index: FxHashMap<FunctionId, FuncIdx>,
    /// All tests, sorted by id.
    tests: Vec<TestDecl>,
    test_index: FxHashMap<TestId, usize>,
    /// Tests whose every target is declared, sorted.
    targeted: Vec<TestId>,
    free_floating: Vec<TestId>,
    /// Tests naming undeclared targets, with the missing targets.
    unresolved: Vec<(TestId, Vec<FunctionId>)>,
    warnings: Vec<Warning>,
}

impl TestRegistry {
    /// Build the registry in one pass over the module.
    ///
    /// Never fails: a test naming an unknown target is recorded as
    /// unresolved, and a duplicate test id keeps the later declaration.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(functions = module.functions.len(), tests = module.tests.len())
    )]
    pub fn build(module: &TypedModule) -> Self {
        let mut registry = TestRegistry::default();

        for function in &module.functions {
            let idx = registry.intern(&function.id);
            let node = &mut registry.nodes[idx.index()];
            node.declared = true;
            node.effectful |= function.signature.is_effectful();
        }

        for edge in &module.call_edges {
            let Some(caller) = registry.declared_index(&edge.caller) else {
                tracing::debug!(
                    caller = %edge.caller,
                    callee = %edge.callee,
                    "ignoring call edge from undeclared caller"
                );
                continue;
            };
            let callee = registry.intern(&edge.callee);
            registry.nodes[callee.index()].callers.push(caller);
        }
        for node in &mut registry.nodes {
            node.callers.sort_unstable();
            node.callers.dedup();
        }

        registry.register_tests(module);

        tracing::debug!(
            functions = registry.nodes.len(),
            targeted = registry.targeted.len(),
            free_floating = registry.free_floating.len(),
            unresolved = registry.unresolved.len(),
            "registry built"
        );
        registry
    }

    fn register_tests(&mut self, module: &TypedModule) {
        // Later declarations of the same id replace earlier ones.
        let mut by_id: FxHashMap<TestId, TestDecl> = FxHashMap::default();
        for test in &module.tests {
            if by_id.insert(test.id.clone(), test.clone()).is_some() {
                tracing::warn!(test = %test.id, "duplicate test declaration, keeping the later one");
                self.warnings.push(Warning::DuplicateTest {
                    test: test.id.clone(),
                });
            }
        }
        let mut tests: Vec<TestDecl> = by_id.into_values().collect();
        tests.sort_by(|a, b| a.id.cmp(&b.id));

        for test in &tests {
            if test.targets.is_free_floating() {
                self.free_floating.push(test.id.clone());
                continue;
            }

            let missing: Vec<FunctionId> = test
                .targets
                .targets()
                .iter()
                .filter(|target| self.declared_index(target).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                self.unresolved.push((test.id.clone(), missing));
                continue;
            }

            for target in test.targets.targets() {
                let idx = self.intern(target);
                self.nodes[idx.index()].tests.push(test.id.clone());
            }
            self.targeted.push(test.id.clone());
        }

        self.test_index = tests
            .iter()
            .enumerate()
            .map(|(i, test)| (test.id.clone(), i))
            .collect();
        self.tests = tests;
    }

    fn intern(&mut self, id: &FunctionId) -> FuncIdx {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let raw = u32::try_from(self.nodes.len())
            .unwrap_or_else(|_| panic!("function index overflow"));
        let idx = FuncIdx(raw);
        self.nodes.push(FunctionNode {
            id: id.clone(),
            declared: false,
            effectful: false,
            callers: Vec::new(),
            tests: Vec::new(),
        });
        self.index.insert(id.clone(), idx);
        idx
    }

    fn declared_index(&self, id: &FunctionId) -> Option<FuncIdx> {
        self.index
            .get(id)
            .copied()
            .filter(|idx| self.nodes[idx.index()].declared)
    }

    /// Number of indexed functions (declared or referenced).
    pub fn function_count(&self) -> usize {
        self.nodes.len()
    }

    /// Index of a function, if it appears anywhere in the module.
    pub fn index_of(&self, id: &FunctionId) -> Option<FuncIdx> {
        self.index.get(id).copied()
    }

    /// Id of an indexed function.
    ///
    /// # Panics
    ///
    /// Panics if `idx` was assigned by a different registry.
    pub fn function_id(&self, idx: FuncIdx) -> &FunctionId {
        &self.nodes[idx.index()].id
    }

    /// Whether the function has a definition in the module.
    pub fn is_declared(&self, id: &FunctionId) -> bool {
        self.declared_index(id).is_some()
    }

    /// Direct callers of a function.
    pub fn callers(&self, idx: FuncIdx) -> &[FuncIdx] {
        &self.nodes[idx.index()].callers
    }

    /// Tests that declare `id` as a target.
    pub fn tests_for(&self, id: &FunctionId) -> &[TestId] {
        self.index
            .get(id)
            .map_or(&[], |idx| self.nodes[idx.index()].tests.as_slice())
    }

    /// All tests, sorted by id.
    pub fn tests(&self) -> &[TestDecl] {
        &self.tests
    }

    /// Look up a test.
    pub fn test(&self, id: &TestId) -> Option<&TestDecl> {
        self.test_index.get(id).map(|&i| &self.tests[i])
    }

    /// Tests with explicit, fully resolved targets, sorted.
    pub fn targeted(&self) -> &[TestId] {
        &self.targeted
    }

    /// Tests without targets, sorted.
    pub fn free_floating(&self) -> &[TestId] {
        &self.free_floating
    }

    /// Tests naming undeclared targets, with the missing targets, sorted.
    pub fn unresolved(&self) -> &[(TestId, Vec<FunctionId>)] {
        &self.unresolved
    }

    /// Whether any of the test's targets declares a capability.
    pub fn is_effectful(&self, test: &TestId) -> bool {
        self.test(test).is_some_and(|decl| {
            decl.targets.targets().iter().any(|target| {
                self.index
                    .get(target)
                    .is_some_and(|idx| self.nodes[idx.index()].effectful)
            })
        })
    }

    /// Problems found while building.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Which declared functions have at least one targeting test.
    pub fn coverage(&self) -> CoverageReport {
        let mut declared: Vec<&FunctionNode> =
            self.nodes.iter().filter(|node| node.declared).collect();
        declared.sort_by(|a, b| a.id.cmp(&b.id));

        let mut report = CoverageReport::new();
        for node in declared {
            report.add_function(node.id.clone(), node.tests.clone());
        }
        report
    }
}

#[cfg(test)]
mod tests;
