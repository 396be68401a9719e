//! One incremental test pass over a compiled module.
//!
//! # Phases
//!
//! ```text
//! Idle → RegistryBuilt → ChangesDetected → ClosureComputed → TestsSelected
//!      → TestsExecuted → ResultsReported → CachePersisted → Done
//! ```
//!
//! Every run walks all nine phases in order, whatever the tests did. A
//! failing test changes the outcome, never the control flow.
//!
//! # Cache discipline
//!
//! - Selected tests always execute: their cache key does not cover the
//!   callees whose change selected them.
//! - Unselected tests are served from the cache when their live key hits,
//!   and executed otherwise.
//! - Only cacheable executions (complete, not timed out, not cancelled) are
//!   stored. A selected test without a fresh result loses its entry under
//!   the live key, so advancing the function-hash table can never expose a
//!   stale result on the next run.
//! - Pruning to live keys happens only when the outcome is not `Failed` and
//!   the run was not cancelled.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use ori_test_ir::{TestDecl, TestId, TypedModule};

use crate::cache::store::CacheStore;
use crate::cache::{live_key, InputsHash, TestCache};
use crate::change_detection::{ChangeDetector, HashSnapshot};
use crate::closure::reverse_closure;
use crate::config::TestRunnerConfig;
use crate::error::CacheError;
use crate::executor::{CancelToken, TestEvaluator, TestExecutor, CANCELLED_REASON};
use crate::pool::{ExecutionRequest, WorkerPool};
use crate::registry::TestRegistry;
use crate::report::{ReportEntry, TestReport, Warning};
use crate::result::{RunOutcome, TestResult};
use crate::selection::{select, Misconfiguration, SelectOptions};

/// Orchestrator state. Strictly sequential within a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Idle,
    RegistryBuilt,
    ChangesDetected,
    ClosureComputed,
    TestsSelected,
    TestsExecuted,
    ResultsReported,
    CachePersisted,
    Done,
}

impl Phase {
    /// The phase that follows this one; `None` after `Done`.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::RegistryBuilt),
            Phase::RegistryBuilt => Some(Phase::ChangesDetected),
            Phase::ChangesDetected => Some(Phase::ClosureComputed),
            Phase::ClosureComputed => Some(Phase::TestsSelected),
            Phase::TestsSelected => Some(Phase::TestsExecuted),
            Phase::TestsExecuted => Some(Phase::ResultsReported),
            Phase::ResultsReported => Some(Phase::CachePersisted),
            Phase::CachePersisted => Some(Phase::Done),
            Phase::Done => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::RegistryBuilt => "registry built",
            Phase::ChangesDetected => "changes detected",
            Phase::ClosureComputed => "closure computed",
            Phase::TestsSelected => "tests selected",
            Phase::TestsExecuted => "tests executed",
            Phase::ResultsReported => "results reported",
            Phase::CachePersisted => "cache persisted",
            Phase::Done => "done",
        }
    }
}

/// Owns the loaded cache and sequences one run at a time.
///
/// Construct one per compilation session and pass it explicitly; it holds
/// all cross-run state (the previous function hashes and the result table).
pub struct Orchestrator {
    config: TestRunnerConfig,
    store: Option<CacheStore>,
    /// Function hashes of the last run that executed tests.
    snapshot: Option<HashSnapshot>,
    cache: TestCache,
    /// Load problems, reported with the next run.
    pending_warnings: Vec<Warning>,
    cancel: CancelToken,
    phase: Phase,
}

impl Orchestrator {
    /// Create an orchestrator, loading the persisted cache if configured.
    pub fn new(config: TestRunnerConfig) -> Self {
        let store = config
            .cache_dir
            .as_ref()
            .map(|dir| CacheStore::new(dir.clone(), config.tool_version.clone()));
        let loaded = store.as_ref().map(CacheStore::load).unwrap_or_default();

        Orchestrator {
            config,
            store,
            snapshot: loaded.snapshot,
            cache: loaded.results,
            pending_warnings: loaded.warnings,
            cancel: CancelToken::new(),
            phase: Phase::Idle,
        }
    }

    pub fn config(&self) -> &TestRunnerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Token for interrupting the current run from another thread.
    ///
    /// A cancellation requested between runs applies to the next one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &TestCache {
        &self.cache
    }

    /// Function hashes the next run will diff against.
    pub fn snapshot(&self) -> Option<&HashSnapshot> {
        self.snapshot.as_ref()
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            tracing::debug!(from = self.phase.name(), to = next.name(), "phase");
            self.phase = next;
        }
    }

    /// Run one incremental test pass over `module`.
    ///
    /// Never fails: test failures shape the outcome, cache problems become
    /// warnings.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(functions = module.functions.len(), tests = module.tests.len())
    )]
    pub fn run(&mut self, module: &TypedModule, evaluator: Arc<dyn TestEvaluator>) -> TestReport {
        self.phase = Phase::Idle;
        let mut report = TestReport::new();
        for warning in std::mem::take(&mut self.pending_warnings) {
            report.add_warning(warning);
        }

        let registry = TestRegistry::build(module);
        for warning in registry.warnings() {
            report.add_warning(warning.clone());
        }
        self.advance();

        let current = HashSnapshot::from_module(module);
        let detector = ChangeDetector::new(self.snapshot.as_ref(), &current);
        self.advance();

        let affected = reverse_closure(&registry, &detector.changed_functions());
        report.summary.affected_functions = affected.len();
        self.advance();

        let options = SelectOptions {
            force_full_rerun: self.config.force_full_rerun,
            filter: self.config.filter.clone(),
        };
        let selection = select(&registry, &affected, &detector, &options);
        report.summary.selected = selection.selected.len();
        for (test, problem) in &selection.misconfigured {
            report_misconfigured(&mut report, test, problem);
        }
        self.advance();

        // Live keys cover every targeted test, filtered or not, so pruning
        // never drops a result only because of the name filter.
        let live: FxHashMap<TestId, InputsHash> = registry
            .tests()
            .iter()
            .filter_map(|decl| live_key(decl, &current).map(|key| (decl.id.clone(), key)))
            .collect();

        let mut to_run: Vec<&TestDecl> = selection
            .selected
            .iter()
            .filter_map(|id| registry.test(id))
            .collect();
        for id in &selection.unselected {
            let hit = live.get(id).and_then(|key| self.cache.get(id, *key));
            match (hit, registry.test(id)) {
                (Some(result), _) => report.add_entry(ReportEntry {
                    test: id.clone(),
                    result: result.clone(),
                    from_cache: true,
                }),
                (None, Some(decl)) => to_run.push(decl),
                (None, None) => {}
            }
        }
        if self.config.include_free_floating {
            to_run.extend(selection.free_floating.iter().filter_map(|id| registry.test(id)));
        }

        let mut fresh: FxHashMap<TestId, bool> = FxHashMap::default();
        if self.config.skip_tests {
            tracing::info!(pending = to_run.len(), "skipping test execution");
        } else {
            let executor = TestExecutor::new(evaluator, self.cancel.clone())
                .with_timeout(self.config.timeout);
            let requests: Vec<ExecutionRequest<'_>> = to_run
                .iter()
                .map(|decl| ExecutionRequest {
                    test: decl,
                    effectful: registry.is_effectful(&decl.id),
                })
                .collect();
            let executions = WorkerPool::from_config(&self.config).run(&executor, requests);
            report.summary.executed = executions.len();

            let mut not_run = 0;
            for execution in executions {
                if execution.cacheable {
                    if let Some(key) = live.get(&execution.test) {
                        self.cache
                            .insert(execution.test.clone(), *key, execution.result.clone());
                    }
                }
                if !execution.cacheable && execution.result == TestResult::skip(CANCELLED_REASON) {
                    not_run += 1;
                }
                report.check_slow(
                    &execution.test,
                    execution.duration,
                    self.config.slow_threshold,
                );
                fresh.insert(execution.test.clone(), execution.cacheable);
                report.add_entry(ReportEntry {
                    test: execution.test,
                    result: execution.result,
                    from_cache: false,
                });
            }

            for test in executor.detached() {
                report.add_warning(Warning::TimedOut {
                    test,
                    timeout: self.config.timeout.unwrap_or_default(),
                });
            }
            if not_run > 0 || self.cancel.is_cancelled() {
                report.add_warning(Warning::Cancelled { not_run });
            }
        }
        self.advance();

        if self.config.coverage {
            report.coverage = Some(registry.coverage());
        }
        report.finish(self.config.strict);
        self.advance();

        if !self.config.skip_tests {
            // Selected tests that did not produce a fresh, cacheable result
            // must not be served from an older entry under the same key.
            for id in selection.selected.iter().chain(&selection.filtered_out) {
                if fresh.get(id) != Some(&true) {
                    if let Some(key) = live.get(id) {
                        self.cache.remove(id, *key);
                    }
                }
            }

            let cancelled = report.was_cancelled() || self.cancel.is_cancelled();
            if report.outcome != RunOutcome::Failed && !cancelled {
                self.cache.prune(&live);
            }
            self.snapshot = Some(current);
            self.persist(&mut report);
        }
        self.advance();
        self.advance();
        // A cancellation is consumed by the run it interrupted.
        self.cancel.reset();

        let s = &report.summary;
        tracing::info!(
            affected = s.affected_functions,
            selected = s.selected,
            cached = s.cached,
            executed = s.executed,
            passed = s.passed,
            failed = s.failed,
            errored = s.errored,
            skipped = s.skipped,
            outcome = ?report.outcome,
            "test run complete"
        );
        report
    }

    /// Write both tables back, turning failures into warnings.
    ///
    /// The function-hash table is written only after the results. If the
    /// results cannot be written, the old table is removed instead: a new
    /// table next to old results would hide changes behind stale passes,
    /// while a missing one only costs a cold start.
    fn persist(&self, report: &mut TestReport) {
        let (Some(store), Some(snapshot)) = (&self.store, &self.snapshot) else {
            return;
        };
        let functions = match store.save_results(&self.cache) {
            Ok(()) => store.save_functions(snapshot),
            Err(error) => {
                persist_failed(report, &error);
                store.discard_functions()
            }
        };
        if let Err(error) = functions {
            persist_failed(report, &error);
        }
    }
}

fn persist_failed(report: &mut TestReport, error: &CacheError) {
    tracing::warn!(%error, "failed to persist test cache");
    report.add_warning(Warning::CachePersistFailed {
        path: error.path().clone(),
        reason: error.to_string(),
    });
}

fn report_misconfigured(report: &mut TestReport, test: &TestId, problem: &Misconfiguration) {
    let warning = match problem {
        Misconfiguration::UnknownTargets(missing) => Warning::UnknownTargets {
            test: test.clone(),
            missing: missing.clone(),
        },
        Misconfiguration::Orphaned(removed) => Warning::OrphanedTest {
            test: test.clone(),
            removed: removed.clone(),
        },
    };
    tracing::warn!(test = %test, %problem, "misconfigured test");
    report.add_warning(warning);
    report.add_entry(ReportEntry {
        test: test.clone(),
        result: TestResult::error(problem.to_string()),
        from_cache: false,
    });
}
