use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use ori_test_ir::{Body, ExprKind, TargetSet, TestId};

use super::*;
use crate::executor::CancelToken;
use crate::result::TestResult;
use crate::test_helpers::{Script, ScriptedEvaluator};

fn decls(ids: &[&str]) -> Vec<TestDecl> {
    ids.iter()
        .map(|id| {
            TestDecl::new(
                *id,
                TargetSet::from_targets(["app.a"]),
                Body::single(ExprKind::Unit),
            )
        })
        .collect()
}

fn requests<'a>(decls: &'a [TestDecl], effectful: &[&str]) -> Vec<ExecutionRequest<'a>> {
    decls
        .iter()
        .map(|test| ExecutionRequest {
            test,
            effectful: effectful.contains(&test.id.as_str()),
        })
        .collect()
}

fn sorted_ids(executions: &[Execution]) -> Vec<TestId> {
    let mut ids: Vec<TestId> = executions.iter().map(|e| e.test.clone()).collect();
    ids.sort();
    ids
}

#[test]
fn parallel_runs_every_request_once() {
    let tests = decls(&["app.t1", "app.t2", "app.t3", "app.t4", "app.t5"]);
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let executor = TestExecutor::new(evaluator.clone(), CancelToken::new());

    let executions = WorkerPool::new(true, Some(3)).run(&executor, requests(&tests, &[]));

    assert_eq!(executions.len(), 5);
    assert_eq!(sorted_ids(&executions), evaluator.calls());
    assert!(executions.iter().all(|e| e.result.is_pass()));
}

#[test]
fn parallel_isolates_panics() {
    let tests = decls(&["app.t1", "app.t2", "app.t3"]);
    let evaluator = ScriptedEvaluator::new()
        .with("app.t1", Script::Panic("boom".into()))
        .with("app.t2", Script::Assert("wrong".into()));
    let executor = TestExecutor::new(Arc::new(evaluator), CancelToken::new());

    let mut executions = WorkerPool::new(true, None).run(&executor, requests(&tests, &[]));
    executions.sort_by(|a, b| a.test.cmp(&b.test));

    assert!(executions[0].result.is_error());
    assert_eq!(executions[1].result, TestResult::fail("wrong"));
    assert!(executions[2].result.is_pass());
}

#[test]
fn sequential_runs_effectful_first() {
    let tests = decls(&["app.pure_a", "app.io_b", "app.pure_c", "app.io_d"]);
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let executor = TestExecutor::new(evaluator.clone(), CancelToken::new());

    let executions = WorkerPool::new(false, None).run(
        &executor,
        requests(&tests, &["app.io_b", "app.io_d"]),
    );

    let order: Vec<&str> = executions.iter().map(|e| e.test.as_str()).collect();
    assert_eq!(order, vec!["app.io_b", "app.io_d", "app.pure_a", "app.pure_c"]);
    assert_eq!(
        evaluator.call_order(),
        vec![
            TestId::new("app.io_b"),
            TestId::new("app.io_d"),
            TestId::new("app.pure_a"),
            TestId::new("app.pure_c"),
        ]
    );
}

#[test]
fn parallel_is_faster_than_serial_sleep() {
    let tests = decls(&["app.t1", "app.t2", "app.t3", "app.t4"]);
    let mut evaluator = ScriptedEvaluator::new();
    for test in &tests {
        evaluator = evaluator.with(test.id.as_str(), Script::Sleep(Duration::from_millis(100)));
    }
    let executor = TestExecutor::new(Arc::new(evaluator), CancelToken::new());

    let start = std::time::Instant::now();
    let executions = WorkerPool::new(true, Some(4)).run(&executor, requests(&tests, &[]));
    assert_eq!(executions.len(), 4);
    assert!(start.elapsed() < Duration::from_millis(390));
}

#[test]
fn cancelled_pool_skips_everything() {
    let tests = decls(&["app.t1", "app.t2", "app.t3"]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let executor = TestExecutor::new(Arc::new(ScriptedEvaluator::new()), cancel);

    let executions = WorkerPool::default().run(&executor, requests(&tests, &[]));
    assert_eq!(executions.len(), 3);
    assert!(executions
        .iter()
        .all(|e| e.result == TestResult::skip("run cancelled") && !e.cacheable));
}

#[test]
fn empty_request_list() {
    let executor = TestExecutor::new(Arc::new(ScriptedEvaluator::new()), CancelToken::new());
    assert!(WorkerPool::default().run(&executor, Vec::new()).is_empty());
}

#[test]
fn from_config() {
    let config = TestRunnerConfig::default().with_parallel(false).with_jobs(2);
    assert_eq!(WorkerPool::from_config(&config), WorkerPool::new(false, Some(2)));
}
