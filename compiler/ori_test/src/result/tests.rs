use super::*;

#[test]
fn test_result_predicates() {
    assert!(TestResult::pass(Duration::ZERO).is_pass());
    assert!(!TestResult::pass(Duration::ZERO).is_failure());
    assert!(TestResult::fail("expected 3, got 4").is_fail());
    assert!(TestResult::fail("expected 3, got 4").is_failure());
    assert!(TestResult::error("stack overflow").is_error());
    assert!(TestResult::error("stack overflow").is_failure());
    assert!(TestResult::skip("flaky").is_skip());
    assert!(!TestResult::skip("flaky").is_failure());
}

#[test]
fn test_result_labels() {
    assert_eq!(TestResult::pass(Duration::ZERO).label(), "PASS");
    assert_eq!(TestResult::fail("x").label(), "FAIL");
    assert_eq!(TestResult::skip("x").label(), "SKIP");
    assert_eq!(TestResult::error("x").label(), "ERROR");
}

#[test]
fn fail_display_includes_location() {
    let result = TestResult::Fail {
        message: "assertion failed: a == b".into(),
        location: Some(SourceLocation::new("src/math.ori", 14, 9)),
    };
    assert_eq!(
        result.to_string(),
        "assertion failed: a == b (at src/math.ori:14:9)"
    );
}

#[test]
fn outcome_only_fails_in_strict_mode() {
    assert_eq!(RunOutcome::decide(false, false), RunOutcome::Success);
    assert_eq!(
        RunOutcome::decide(false, true),
        RunOutcome::SuccessWithFailures
    );
    assert_eq!(RunOutcome::decide(true, false), RunOutcome::Success);
    assert_eq!(RunOutcome::decide(true, true), RunOutcome::Failed);
}

#[test]
fn outcome_exit_codes() {
    assert_eq!(RunOutcome::Success.exit_code(), 0);
    assert_eq!(RunOutcome::SuccessWithFailures.exit_code(), 0);
    assert_eq!(RunOutcome::Failed.exit_code(), 1);
    assert!(!RunOutcome::Failed.is_success());
}

#[test]
fn coverage_report_counts() {
    let mut report = CoverageReport::new();
    report.add_function(
        FunctionId::new("math.add"),
        vec![TestId::new("math.test_add")],
    );
    report.add_function(FunctionId::new("math.sub"), vec![]);

    assert_eq!(report.covered, 1);
    assert_eq!(report.total, 2);
    assert!(!report.is_complete());
    assert!((report.percentage() - 50.0).abs() < f64::EPSILON);
    assert_eq!(
        report.untested().collect::<Vec<_>>(),
        vec![&FunctionId::new("math.sub")]
    );
}

#[test]
fn empty_coverage_is_complete() {
    let report = CoverageReport::new();
    assert!(report.is_complete());
    assert!((report.percentage() - 100.0).abs() < f64::EPSILON);
}

#[test]
fn result_survives_bincode() {
    let result = TestResult::Fail {
        message: "boom".into(),
        location: Some(SourceLocation::new("a.ori", 1, 2)),
    };
    let bytes = bincode::serialize(&result).unwrap_or_else(|e| panic!("serialize failed: {e}"));
    let back: TestResult =
        bincode::deserialize(&bytes).unwrap_or_else(|e| panic!("deserialize failed: {e}"));
    assert_eq!(back, result);
}
