//! Worker pool for executed (non-cached) tests.
//!
//! Uses a scoped rayon pool so every worker thread is joined before
//! [`WorkerPool::run`] returns. Workers share one [`TestExecutor`] and send
//! each [`Execution`] back over a channel; completion order is arbitrary
//! and the report sorts afterwards.

use crossbeam::channel;
use rayon::prelude::*;

use ori_test_ir::TestDecl;

use crate::config::TestRunnerConfig;
use crate::executor::{Execution, TestExecutor};

/// A test handed to the pool.
#[derive(Copy, Clone, Debug)]
pub struct ExecutionRequest<'a> {
    pub test: &'a TestDecl,
    /// Some target declares a capability.
    pub effectful: bool,
}

/// How executed tests are scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorkerPool {
    parallel: bool,
    jobs: Option<usize>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool {
            parallel: true,
            jobs: None,
        }
    }
}

impl WorkerPool {
    pub fn new(parallel: bool, jobs: Option<usize>) -> Self {
        WorkerPool { parallel, jobs }
    }

    pub fn from_config(config: &TestRunnerConfig) -> Self {
        WorkerPool::new(config.parallel, config.jobs)
    }

    /// Execute every request and collect the executions.
    ///
    /// Effectful tests are started first. Every request yields exactly one
    /// execution; panics never leave the executor.
    pub fn run(
        &self,
        executor: &TestExecutor,
        mut requests: Vec<ExecutionRequest<'_>>,
    ) -> Vec<Execution> {
        prioritize(&mut requests);

        if !self.parallel || requests.len() < 2 {
            return run_sequential(executor, &requests);
        }

        let (tx, rx) = channel::unbounded();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("ori-test-{i}"));
        if let Some(jobs) = self.jobs {
            builder = builder.num_threads(jobs);
        }

        // Scoped so the pool is torn down before returning.
        let pooled = builder.build_scoped(rayon::ThreadBuilder::run, |pool| {
            pool.install(|| {
                requests.par_iter().for_each_with(tx.clone(), |tx, request| {
                    // The receiver outlives the pool.
                    let _ = tx.send(executor.run(request.test));
                });
            });
        });
        drop(tx);

        match pooled {
            Ok(()) => rx.iter().collect(),
            Err(e) => {
                tracing::warn!("failed to create thread pool ({e}), running sequentially");
                run_sequential(executor, &requests)
            }
        }
    }
}

fn run_sequential(executor: &TestExecutor, requests: &[ExecutionRequest<'_>]) -> Vec<Execution> {
    requests
        .iter()
        .map(|request| executor.run(request.test))
        .collect()
}

/// Sort by effect class: effectful first, pure last, stable within a class.
///
/// Effectful tests exercise I/O paths and are the likeliest to catch real
/// regressions, so their failures surface sooner.
fn prioritize(requests: &mut [ExecutionRequest<'_>]) {
    requests.sort_by_key(|request| !request.effectful);
}

#[cfg(test)]
mod tests;
