//! Test selection: from affected functions to the tests that must run.
//!
//! A targeted test is selected when any of its targets is affected or its
//! own definition changed. Free-floating tests are never selected; tests
//! naming targets that do not exist are reported as misconfigured.

use std::fmt;

use rustc_hash::FxHashSet;

use ori_test_ir::{FunctionId, TestId};

use crate::change_detection::ChangeDetector;
use crate::closure::AffectedSet;
use crate::registry::TestRegistry;

/// Selection settings taken from the run configuration.
#[derive(Clone, Debug, Default)]
pub struct SelectOptions {
    /// Select every targeted test regardless of changes.
    pub force_full_rerun: bool,
    /// Keep only tests whose id contains this substring.
    pub filter: Option<String>,
}

/// Why a test cannot be resolved against the current module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Misconfiguration {
    /// Targets that are not declared in the module.
    UnknownTargets(Vec<FunctionId>),
    /// Every target existed in the previous run and has since been removed.
    Orphaned(Vec<FunctionId>),
}

impl fmt::Display for Misconfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, functions) = match self {
            Misconfiguration::UnknownTargets(functions) => ("unknown target", functions),
            Misconfiguration::Orphaned(functions) => ("all targets were removed", functions),
        };
        write!(f, "{prefix}: ")?;
        for (i, function) in functions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

/// Outcome of selection. Every list is sorted by test id and disjoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Targeted tests that must execute.
    pub selected: Vec<TestId>,
    /// Targeted tests unaffected by the changes; candidates for cache hits.
    pub unselected: Vec<TestId>,
    /// Tests that cannot run.
    pub misconfigured: Vec<(TestId, Misconfiguration)>,
    /// Free-floating tests. Never part of `selected`.
    pub free_floating: Vec<TestId>,
    /// Tests that would have been selected but the name filter excluded.
    pub filtered_out: Vec<TestId>,
}

impl Selection {
    /// Whether a test is in the selected set.
    pub fn is_selected(&self, test: &TestId) -> bool {
        self.selected.binary_search(test).is_ok()
    }
}

/// Select the tests affected by a change.
pub fn select(
    registry: &TestRegistry,
    affected: &AffectedSet,
    detector: &ChangeDetector,
    options: &SelectOptions,
) -> Selection {
    let passes_filter = |test: &TestId| {
        options
            .filter
            .as_deref()
            .map_or(true, |filter| test.as_str().contains(filter))
    };

    let mut selected: FxHashSet<TestId> = FxHashSet::default();
    if options.force_full_rerun {
        selected.extend(registry.targeted().iter().cloned());
    } else {
        for function in affected.iter() {
            selected.extend(registry.tests_for(function).iter().cloned());
        }
        selected.extend(
            registry
                .targeted()
                .iter()
                .filter(|test| detector.is_test_changed(test))
                .cloned(),
        );
    }

    let mut selection = Selection::default();
    for test in registry.targeted() {
        let chosen = selected.contains(test);
        match (chosen, passes_filter(test)) {
            (true, true) => selection.selected.push(test.clone()),
            (true, false) => selection.filtered_out.push(test.clone()),
            (false, true) => selection.unselected.push(test.clone()),
            (false, false) => {}
        }
    }

    for (test, missing) in registry.unresolved() {
        if !passes_filter(test) {
            continue;
        }
        let orphaned = registry.test(test).is_some_and(|decl| {
            decl.targets
                .targets()
                .iter()
                .all(|target| detector.is_removed(target))
        });
        let problem = if orphaned {
            Misconfiguration::Orphaned(missing.clone())
        } else {
            Misconfiguration::UnknownTargets(missing.clone())
        };
        selection.misconfigured.push((test.clone(), problem));
    }

    selection.free_floating = registry
        .free_floating()
        .iter()
        .filter(|test| passes_filter(*test))
        .cloned()
        .collect();

    tracing::debug!(
        selected = selection.selected.len(),
        unselected = selection.unselected.len(),
        misconfigured = selection.misconfigured.len(),
        filtered_out = selection.filtered_out.len(),
        "tests selected"
    );
    selection
}
