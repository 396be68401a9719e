//! Single-test execution behind a hard isolation boundary.
//!
//! The executor hands a test body to the external [`TestEvaluator`] and
//! turns whatever happens into exactly one [`TestResult`]:
//!
//! - a returned result is kept (a `Pass` gets the measured duration);
//! - an [`AssertionFailure`] panic becomes `Fail`;
//! - any other panic becomes `Error`;
//! - exceeding the timeout becomes `Error` and abandons the worker thread.
//!
//! Nothing raised by a test body propagates past [`TestExecutor::run`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;

use ori_test_ir::{Body, FunctionId, SourceLocation, TestDecl, TestId};

use crate::result::TestResult;

/// Skip reason of tests that never started because the run was cancelled.
pub const CANCELLED_REASON: &str = "run cancelled";

/// Shared flag for interrupting a run.
///
/// Checked before each test starts; evaluators can poll it through
/// [`TestEnv`] to stop early. The orchestrator resets it when a run ends,
/// so one interruption never carries over into the next run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a pending cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the evaluator gets to know about the running test.
#[derive(Clone, Debug)]
pub struct TestEnv {
    /// Declared targets; empty for free-floating tests.
    pub targets: Vec<FunctionId>,
    pub cancel: CancelToken,
    /// When the executor stops waiting for this test.
    pub deadline: Option<Instant>,
}

impl TestEnv {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// The execution hook supplied by the evaluator.
///
/// Implementations may block or suspend; the executor only waits for the
/// returned result. To report an assertion mismatch, either return
/// `TestResult::Fail` or raise an [`AssertionFailure`].
pub trait TestEvaluator: Send + Sync {
    fn execute(&self, test: &TestId, body: &Body, env: &TestEnv) -> TestResult;
}

impl<F> TestEvaluator for F
where
    F: Fn(&TestId, &Body, &TestEnv) -> TestResult + Send + Sync,
{
    fn execute(&self, test: &TestId, body: &Body, env: &TestEnv) -> TestResult {
        self(test, body, env)
    }
}

/// Panic payload recognized as an assertion mismatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionFailure {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        AssertionFailure {
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Unwind out of the test body with this failure.
    pub fn raise(self) -> ! {
        panic::panic_any(self)
    }
}

/// One finished (or abandoned) test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub test: TestId,
    pub result: TestResult,
    /// Wall-clock time spent in the executor.
    pub duration: Duration,
    /// The result reflects a complete run and may be stored in the cache.
    pub cacheable: bool,
}

/// Runs tests one at a time; shared by all workers of a pool.
pub struct TestExecutor {
    evaluator: Arc<dyn TestEvaluator>,
    timeout: Option<Duration>,
    cancel: CancelToken,
    /// Tests whose thread was abandoned on timeout.
    detached: Mutex<Vec<TestId>>,
}

impl TestExecutor {
    pub fn new(evaluator: Arc<dyn TestEvaluator>, cancel: CancelToken) -> Self {
        TestExecutor {
            evaluator,
            timeout: None,
            cancel,
            detached: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run one test to a single result.
    pub fn run(&self, test: &TestDecl) -> Execution {
        if let Some(reason) = &test.skip_reason {
            return Execution {
                test: test.id.clone(),
                result: TestResult::skip(reason.clone()),
                duration: Duration::ZERO,
                cacheable: true,
            };
        }
        if self.cancel.is_cancelled() {
            return Execution {
                test: test.id.clone(),
                result: TestResult::skip(CANCELLED_REASON),
                duration: Duration::ZERO,
                cacheable: false,
            };
        }

        let start = Instant::now();
        let env = TestEnv {
            targets: test.targets.targets().to_vec(),
            cancel: self.cancel.clone(),
            deadline: self.timeout.map(|timeout| start + timeout),
        };

        let outcome = match self.timeout {
            None => Some(run_isolated(&*self.evaluator, &test.id, &test.body, &env)),
            Some(timeout) => self.run_with_timeout(test, env, timeout),
        };
        let duration = start.elapsed();

        let (result, cacheable) = match outcome {
            Some(mut result) => {
                if let TestResult::Pass { duration: d } = &mut result {
                    *d = duration;
                }
                if let Some(expected) = &test.fail_expected {
                    result = apply_fail_wrapper(result, expected, duration);
                }
                // A result that lands after cancellation may have been cut
                // short by an evaluator honouring the token.
                (result, !self.cancel.is_cancelled())
            }
            None => {
                let timeout = self.timeout.unwrap_or_default();
                tracing::warn!(test = %test.id, ?timeout, "test timed out, abandoning its thread");
                self.detached.lock().push(test.id.clone());
                (
                    TestResult::error(format!("timed out after {timeout:.2?}")),
                    false,
                )
            }
        };

        tracing::debug!(
            test = %test.id,
            status = result.label(),
            ?duration,
            cacheable,
            "test finished"
        );
        Execution {
            test: test.id.clone(),
            result,
            duration,
            cacheable,
        }
    }

    /// Run on a dedicated thread and wait at most `timeout`.
    ///
    /// `None` if the deadline passed; the thread is left to finish on its own
    /// and its result is dropped.
    fn run_with_timeout(
        &self,
        test: &TestDecl,
        env: TestEnv,
        timeout: Duration,
    ) -> Option<TestResult> {
        let (tx, rx) = channel::bounded(1);
        let evaluator = Arc::clone(&self.evaluator);
        let id = test.id.clone();
        let body = Arc::clone(&test.body);

        let spawned = thread::Builder::new()
            .name(format!("ori-test:{}", test.id))
            .spawn(move || {
                let result = run_isolated(&*evaluator, &id, &body, &env);
                // The receiver is gone if we already timed out.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return Some(TestResult::error(format!("failed to spawn test thread: {e}")));
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(TestResult::error("test thread exited without a result"))
            }
        }
    }

    /// Tests abandoned after a timeout, sorted.
    pub fn detached(&self) -> Vec<TestId> {
        let mut detached = self.detached.lock().clone();
        detached.sort();
        detached
    }
}

/// Call the evaluator, converting panics into results.
fn run_isolated(
    evaluator: &dyn TestEvaluator,
    test: &TestId,
    body: &Body,
    env: &TestEnv,
) -> TestResult {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.execute(test, body, env))) {
        Ok(result) => result,
        Err(payload) => panic_to_result(payload),
    }
}

fn panic_to_result(payload: Box<dyn Any + Send>) -> TestResult {
    let payload = match payload.downcast::<AssertionFailure>() {
        Ok(failure) => {
            return TestResult::Fail {
                message: failure.message,
                location: failure.location,
            }
        }
        Err(payload) => payload,
    };
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    TestResult::error(format!("test panicked: {message}"))
}

/// Apply the expected-failure attribute to a test result.
///
/// - inner test failed with the expected substring: pass
/// - inner test failed with a different message: fail
/// - inner test passed: fail (expected failure didn't happen)
/// - inner test was skipped: remains skipped
fn apply_fail_wrapper(inner: TestResult, expected: &str, duration: Duration) -> TestResult {
    match inner {
        TestResult::Skip { .. } => inner,
        TestResult::Pass { .. } => TestResult::fail(format!(
            "expected test to fail with '{expected}', but test passed"
        )),
        TestResult::Fail { ref message, .. } | TestResult::Error { ref message } => {
            if message.contains(expected) {
                TestResult::pass(duration)
            } else {
                TestResult::fail(format!(
                    "expected failure containing '{expected}', but got: {message}"
                ))
            }
        }
    }
}
