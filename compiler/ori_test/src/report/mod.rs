//! Run report: ordered results, counts, warnings, and the final outcome.
//!
//! Entries are collected in completion order and sorted by `TestId` in
//! [`TestReport::finish`], so the rendered report is identical however the
//! worker pool interleaved.

use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use ori_test_ir::{FunctionId, TestId};

use crate::result::{CoverageReport, RunOutcome, TestResult};

/// A build-level diagnostic. Never fails the run on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// A persisted cache file was unreadable and a cold cache was used.
    CacheDiscarded { path: PathBuf, reason: String },
    /// Writing the cache back failed; the next run starts colder.
    CachePersistFailed { path: PathBuf, reason: String },
    /// Two tests share an id; the later declaration was kept.
    DuplicateTest { test: TestId },
    /// A test names targets that do not exist.
    UnknownTargets {
        test: TestId,
        missing: Vec<FunctionId>,
    },
    /// Every target of a test was deleted since the previous run.
    OrphanedTest {
        test: TestId,
        removed: Vec<FunctionId>,
    },
    /// A test exceeded the per-test timeout and its thread was abandoned.
    TimedOut { test: TestId, timeout: Duration },
    /// The run was interrupted; `not_run` tests never started.
    Cancelled { not_run: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::CacheDiscarded { path, reason } => {
                write!(f, "discarded test cache {}: {reason}", path.display())
            }
            Warning::CachePersistFailed { path, reason } => {
                write!(f, "failed to write test cache {}: {reason}", path.display())
            }
            Warning::DuplicateTest { test } => {
                write!(f, "duplicate test {test}, keeping the later declaration")
            }
            Warning::UnknownTargets { test, missing } => {
                write!(f, "test {test} targets unknown function")?;
                if missing.len() > 1 {
                    f.write_char('s')?;
                }
                write_list(f, missing)
            }
            Warning::OrphanedTest { test, removed } => {
                write!(f, "test {test} is orphaned, all targets removed:")?;
                write_list(f, removed)
            }
            Warning::TimedOut { test, timeout } => {
                write!(f, "test {test} timed out after {timeout:.2?}")
            }
            Warning::Cancelled { not_run } => {
                write!(f, "run cancelled, {not_run} test(s) did not start")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, functions: &[FunctionId]) -> fmt::Result {
    for (i, function) in functions.iter().enumerate() {
        f.write_str(if i == 0 { " " } else { ", " })?;
        write!(f, "{function}")?;
    }
    Ok(())
}

/// One reported test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub test: TestId,
    pub result: TestResult,
    /// Served from the result cache without executing.
    pub from_cache: bool,
}

/// Counts shown in the summary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Size of the reverse closure over changed functions.
    pub affected_functions: usize,
    /// Tests selected by dependency analysis.
    pub selected: usize,
    /// Tests reported from the cache.
    pub cached: usize,
    /// Tests handed to the executor.
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Number of reported tests.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }

    fn record(&mut self, result: &TestResult) {
        match result {
            TestResult::Pass { .. } => self.passed += 1,
            TestResult::Fail { .. } => self.failed += 1,
            TestResult::Error { .. } => self.errored += 1,
            TestResult::Skip { .. } => self.skipped += 1,
        }
    }
}

/// An executed test slower than the configured threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlowTest {
    pub test: TestId,
    pub duration: Duration,
    pub threshold: Duration,
}

impl fmt::Display for SlowTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slow test {} took {:.2?} (threshold {:.2?})",
            self.test, self.duration, self.threshold
        )
    }
}

/// Everything one run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TestReport {
    /// Sorted by test id once finished.
    pub entries: Vec<ReportEntry>,
    pub summary: RunSummary,
    pub slow_tests: Vec<SlowTest>,
    pub warnings: Vec<Warning>,
    pub outcome: RunOutcome,
    pub coverage: Option<CoverageReport>,
}

impl Default for TestReport {
    fn default() -> Self {
        TestReport::new()
    }
}

impl TestReport {
    pub fn new() -> Self {
        TestReport {
            entries: Vec::new(),
            summary: RunSummary::default(),
            slow_tests: Vec::new(),
            warnings: Vec::new(),
            outcome: RunOutcome::Success,
            coverage: None,
        }
    }

    /// Record a result, updating the counts.
    pub fn add_entry(&mut self, entry: ReportEntry) {
        self.summary.record(&entry.result);
        if entry.from_cache {
            self.summary.cached += 1;
        }
        self.entries.push(entry);
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Flag an executed test if it ran longer than `threshold`.
    pub fn check_slow(&mut self, test: &TestId, duration: Duration, threshold: Duration) {
        if duration > threshold {
            tracing::warn!(test = %test, ?duration, ?threshold, "slow test");
            self.slow_tests.push(SlowTest {
                test: test.clone(),
                duration,
                threshold,
            });
        }
    }

    /// Sort for output and decide the outcome.
    ///
    /// An interrupted run counts as failing: tests it never started are
    /// reported as skipped, which alone would read as success.
    pub fn finish(&mut self, strict: bool) {
        self.entries.sort_by(|a, b| a.test.cmp(&b.test));
        self.slow_tests.sort_by(|a, b| a.test.cmp(&b.test));
        let any_failure = self.summary.has_failures() || self.was_cancelled();
        self.outcome = RunOutcome::decide(strict, any_failure);
    }

    /// Whether the run was interrupted.
    pub fn was_cancelled(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| matches!(warning, Warning::Cancelled { .. }))
    }

    /// Look up the reported result of a test.
    pub fn entry(&self, test: &TestId) -> Option<&ReportEntry> {
        self.entries
            .binary_search_by(|entry| entry.test.cmp(test))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Process exit code for the calling layer.
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// Render the report as text.
    ///
    /// Failures, errors and warnings are always shown; passes, skips and
    /// cache hits only when `verbose`.
    pub fn render(&self, verbose: bool) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.render_into(&mut out, verbose);
        out
    }

    fn render_into(&self, out: &mut String, verbose: bool) -> fmt::Result {
        for entry in &self.entries {
            match &entry.result {
                TestResult::Fail { .. } | TestResult::Error { .. } => {
                    writeln!(out, "  {}: {} - {}", entry.result.label(), entry.test, entry.result)?;
                }
                TestResult::Pass { duration } if verbose => {
                    if entry.from_cache {
                        writeln!(out, "  PASS: {} (cached)", entry.test)?;
                    } else {
                        writeln!(out, "  PASS: {} ({duration:.2?})", entry.test)?;
                    }
                }
                TestResult::Skip { reason } if verbose => {
                    writeln!(out, "  SKIP: {} - {reason}", entry.test)?;
                }
                TestResult::Pass { .. } | TestResult::Skip { .. } => {}
            }
        }

        for slow in &self.slow_tests {
            writeln!(out, "  WARN: {slow}")?;
        }
        for warning in &self.warnings {
            writeln!(out, "  WARN: {warning}")?;
        }

        if let Some(coverage) = &self.coverage {
            writeln!(out)?;
            writeln!(
                out,
                "Coverage: {}/{} functions covered ({:.1}%)",
                coverage.covered,
                coverage.total,
                coverage.percentage()
            )?;
            for function in coverage.untested() {
                writeln!(out, "  @{function}")?;
            }
        }

        let s = &self.summary;
        writeln!(out)?;
        writeln!(out, "Test Summary:")?;
        writeln!(
            out,
            "  {} affected, {} cached, {} executed",
            s.affected_functions, s.cached, s.executed
        )?;
        writeln!(
            out,
            "  {} passed, {} failed, {} errors, {} skipped ({} total)",
            s.passed,
            s.failed,
            s.errored,
            s.skipped,
            s.total()
        )?;
        writeln!(out)?;
        match self.outcome {
            RunOutcome::Success => writeln!(out, "OK"),
            RunOutcome::SuccessWithFailures => writeln!(out, "FAILED (non-blocking)"),
            RunOutcome::Failed => writeln!(out, "FAILED"),
        }
    }
}
