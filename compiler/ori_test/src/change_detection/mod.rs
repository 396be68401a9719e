//! Function-level change detection between runs.
//!
//! # Architecture
//!
//! ```text
//! TypedModule ──→ HashSnapshot::from_module (content hash per function and test)
//!                        │
//! previous HashSnapshot ─┤   (None on a cold start)
//!                        ↓
//!                 ChangeDetector
//!                   ├── changed_functions()  added ∪ removed ∪ modified
//!                   └── changed_tests()      new or body/attribute changed
//! ```
//!
//! A function's hash covers only its own definition. Whether a change
//! reaches a caller is decided by the reverse closure, not here.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use ori_test_ir::{hash_function, hash_test_body, ContentHash, FunctionId, TestId, TypedModule};

/// Content hashes of every function and test in one compilation.
///
/// This is the persisted function-hash table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSnapshot {
    pub functions: FxHashMap<FunctionId, ContentHash>,
    pub tests: FxHashMap<TestId, ContentHash>,
}

impl HashSnapshot {
    /// Hash every function and test in the module.
    ///
    /// Hashing is independent per declaration and runs on rayon's pool. When
    /// an id is declared twice the later declaration wins, matching the
    /// registry.
    pub fn from_module(module: &TypedModule) -> Self {
        let function_hashes: Vec<(FunctionId, ContentHash)> = module
            .functions
            .par_iter()
            .map(|function| (function.id.clone(), hash_function(function)))
            .collect();
        let test_hashes: Vec<(TestId, ContentHash)> = module
            .tests
            .par_iter()
            .map(|test| (test.id.clone(), hash_test_body(test)))
            .collect();

        HashSnapshot {
            functions: function_hashes.into_iter().collect(),
            tests: test_hashes.into_iter().collect(),
        }
    }

    /// Hash of a function, if present.
    pub fn function(&self, id: &FunctionId) -> Option<ContentHash> {
        self.functions.get(id).copied()
    }

    /// Hash of a test's own definition, if present.
    pub fn test(&self, id: &TestId) -> Option<ContentHash> {
        self.tests.get(id).copied()
    }

    /// Number of tracked functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no functions are tracked.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Diff between the previous and current snapshot.
#[derive(Clone, Debug, Default)]
pub struct ChangeDetector {
    changed: FxHashSet<FunctionId>,
    added: Vec<FunctionId>,
    removed: Vec<FunctionId>,
    modified: Vec<FunctionId>,
    changed_tests: FxHashSet<TestId>,
    cold: bool,
}

impl ChangeDetector {
    /// Compare `current` against `previous`.
    ///
    /// Without a previous snapshot every current function and test counts as
    /// new.
    pub fn new(previous: Option<&HashSnapshot>, current: &HashSnapshot) -> Self {
        let empty = HashSnapshot::default();
        let cold = previous.is_none();
        let previous = previous.unwrap_or(&empty);

        let mut added = Vec::new();
        let mut modified = Vec::new();
        for (id, &hash) in &current.functions {
            match previous.functions.get(id) {
                Some(&prev_hash) if prev_hash == hash => {}
                Some(_) => modified.push(id.clone()),
                None => added.push(id.clone()),
            }
        }

        let mut removed: Vec<FunctionId> = previous
            .functions
            .keys()
            .filter(|id| !current.functions.contains_key(*id))
            .cloned()
            .collect();

        added.sort();
        modified.sort();
        removed.sort();

        let changed_tests = current
            .tests
            .iter()
            .filter(|(id, hash)| previous.tests.get(*id) != Some(*hash))
            .map(|(id, _)| id.clone())
            .collect();

        let changed = added
            .iter()
            .chain(&modified)
            .chain(&removed)
            .cloned()
            .collect();

        let detector = ChangeDetector {
            changed,
            added,
            removed,
            modified,
            changed_tests,
            cold,
        };
        tracing::debug!(
            cold,
            added = detector.added.len(),
            modified = detector.modified.len(),
            removed = detector.removed.len(),
            changed_tests = detector.changed_tests.len(),
            "changes detected"
        );
        detector
    }

    /// Whether `f` was added, removed, or has a different hash.
    pub fn is_changed(&self, f: &FunctionId) -> bool {
        self.changed.contains(f)
    }

    /// Every changed function, sorted.
    pub fn changed_functions(&self) -> Vec<FunctionId> {
        let mut changed: Vec<FunctionId> = self.changed.iter().cloned().collect();
        changed.sort();
        changed
    }

    /// Functions present now but not before, sorted.
    pub fn added_functions(&self) -> &[FunctionId] {
        &self.added
    }

    /// Functions present before but not now, sorted.
    pub fn removed_functions(&self) -> &[FunctionId] {
        &self.removed
    }

    /// Functions present in both snapshots with different hashes, sorted.
    pub fn modified_functions(&self) -> &[FunctionId] {
        &self.modified
    }

    /// Whether `f` existed in the previous snapshot and is gone now.
    pub fn is_removed(&self, f: &FunctionId) -> bool {
        self.removed.binary_search(f).is_ok()
    }

    /// Tests that are new or whose own body or attributes changed.
    pub fn changed_tests(&self) -> &FxHashSet<TestId> {
        &self.changed_tests
    }

    pub fn is_test_changed(&self, test: &TestId) -> bool {
        self.changed_tests.contains(test)
    }

    /// `true` when there was no previous snapshot.
    pub fn is_cold(&self) -> bool {
        self.cold
    }
}
