//! Test result types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ori_test_ir::{FunctionId, SourceLocation, TestId};

/// Outcome of a single test.
///
/// Cached as-is: a cache hit reports exactly what the original execution
/// produced, including its duration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestResult {
    /// Test passed.
    Pass { duration: Duration },
    /// An assertion in the test did not hold.
    Fail {
        message: String,
        location: Option<SourceLocation>,
    },
    /// Test was not run.
    Skip { reason: String },
    /// Test could not complete: unexpected panic, timeout, or a target that
    /// does not exist.
    Error { message: String },
}

impl TestResult {
    /// Create a passed test result.
    pub fn pass(duration: Duration) -> Self {
        TestResult::Pass { duration }
    }

    /// Create a failed test result without a location.
    #[cold]
    pub fn fail(message: impl Into<String>) -> Self {
        TestResult::Fail {
            message: message.into(),
            location: None,
        }
    }

    /// Create a skipped test result.
    #[cold]
    pub fn skip(reason: impl Into<String>) -> Self {
        TestResult::Skip {
            reason: reason.into(),
        }
    }

    /// Create an error result.
    #[cold]
    pub fn error(message: impl Into<String>) -> Self {
        TestResult::Error {
            message: message.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, TestResult::Pass { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, TestResult::Fail { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TestResult::Skip { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TestResult::Error { .. })
    }

    /// `Fail` or `Error`: the results that make a strict run fail.
    pub fn is_failure(&self) -> bool {
        self.is_fail() || self.is_error()
    }

    /// Short status label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            TestResult::Pass { .. } => "PASS",
            TestResult::Fail { .. } => "FAIL",
            TestResult::Skip { .. } => "SKIP",
            TestResult::Error { .. } => "ERROR",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResult::Pass { duration } => write!(f, "passed in {duration:.2?}"),
            TestResult::Fail {
                message,
                location: Some(location),
            } => write!(f, "{message} (at {location})"),
            TestResult::Fail {
                message,
                location: None,
            }
            | TestResult::Error { message } => f.write_str(message),
            TestResult::Skip { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Overall outcome of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// Every reported test passed or was skipped.
    Success,
    /// Some tests failed, but the build is not blocked.
    SuccessWithFailures,
    /// Strict mode only: at least one test failed or errored.
    Failed,
}

impl RunOutcome {
    /// Decide the outcome from the failure flag and the mode.
    ///
    /// Only strict mode can produce `Failed`.
    pub fn decide(strict: bool, any_failure: bool) -> Self {
        match (strict, any_failure) {
            (_, false) => RunOutcome::Success,
            (false, true) => RunOutcome::SuccessWithFailures,
            (true, true) => RunOutcome::Failed,
        }
    }

    /// Process exit code: 0 unless the run failed in strict mode.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Success | RunOutcome::SuccessWithFailures => 0,
            RunOutcome::Failed => 1,
        }
    }

    /// Whether the build may proceed.
    pub fn is_success(self) -> bool {
        !matches!(self, RunOutcome::Failed)
    }
}

/// Coverage information for a single function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCoverage {
    pub function: FunctionId,
    /// Tests that declare this function as a target.
    pub tests: Vec<TestId>,
}

impl FunctionCoverage {
    /// Returns whether this function has tests.
    pub fn has_tests(&self) -> bool {
        !self.tests.is_empty()
    }
}

/// Which declared functions are targeted by at least one test.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Coverage for each function.
    pub functions: Vec<FunctionCoverage>,
    /// Number of functions with tests.
    pub covered: usize,
    /// Total number of functions.
    pub total: usize,
}

impl CoverageReport {
    pub fn new() -> Self {
        CoverageReport::default()
    }

    /// Add a function's coverage information.
    pub fn add_function(&mut self, function: FunctionId, tests: Vec<TestId>) {
        if !tests.is_empty() {
            self.covered += 1;
        }
        self.total += 1;
        self.functions.push(FunctionCoverage { function, tests });
    }

    /// Get coverage percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        // u32 converts to f64 losslessly; clamping preserves the ratio.
        let covered = u32::try_from(self.covered).unwrap_or(u32::MAX);
        let total = u32::try_from(self.total).unwrap_or(u32::MAX);
        (f64::from(covered) / f64::from(total)) * 100.0
    }

    /// Check if all functions have tests.
    pub fn is_complete(&self) -> bool {
        self.covered == self.total
    }

    /// Iterate over untested functions.
    pub fn untested(&self) -> impl Iterator<Item = &FunctionId> + '_ {
        self.functions
            .iter()
            .filter(|f| !f.has_tests())
            .map(|f| &f.function)
    }
}

#[cfg(test)]
mod tests;
