use pretty_assertions::assert_eq;

use ori_test_ir::CallEdge;

use super::*;
use crate::test_helpers::ModuleBuilder;

fn f(id: &str) -> FunctionId {
    FunctionId::new(id)
}

fn t(id: &str) -> TestId {
    TestId::new(id)
}

fn caller_ids(registry: &TestRegistry, callee: &str) -> Vec<FunctionId> {
    let Some(idx) = registry.index_of(&f(callee)) else {
        return Vec::new();
    };
    registry
        .callers(idx)
        .iter()
        .map(|&caller| registry.function_id(caller).clone())
        .collect()
}

// ── Call graph ───────────────────────────────────────────────

#[test]
fn reverse_edges_from_call_sites() {
    let module = ModuleBuilder::new()
        .function("app.helper", &[])
        .function("app.process", &["app.helper"])
        .function("app.handle", &["app.process", "app.helper"])
        .build();
    let registry = TestRegistry::build(&module);

    assert_eq!(
        caller_ids(&registry, "app.helper"),
        vec![f("app.process"), f("app.handle")]
    );
    assert_eq!(caller_ids(&registry, "app.process"), vec![f("app.handle")]);
    assert!(caller_ids(&registry, "app.handle").is_empty());
}

#[test]
fn duplicate_call_sites_collapse() {
    let mut module = ModuleBuilder::new()
        .function("app.a", &[])
        .function("app.b", &["app.a", "app.a"])
        .build();
    module.call_edges.push(CallEdge::new("app.b", "app.a"));
    let registry = TestRegistry::build(&module);

    assert_eq!(caller_ids(&registry, "app.a"), vec![f("app.b")]);
}

#[test]
fn recursion_is_recorded() {
    let module = ModuleBuilder::new()
        .function("app.even", &["app.odd"])
        .function("app.odd", &["app.even"])
        .function("app.loop", &["app.loop"])
        .build();
    let registry = TestRegistry::build(&module);

    assert_eq!(caller_ids(&registry, "app.even"), vec![f("app.odd")]);
    assert_eq!(caller_ids(&registry, "app.odd"), vec![f("app.even")]);
    assert_eq!(caller_ids(&registry, "app.loop"), vec![f("app.loop")]);
}

#[test]
fn edges_from_undeclared_callers_are_ignored() {
    let mut module = ModuleBuilder::new().function("app.a", &[]).build();
    module.call_edges.push(CallEdge::new("ghost.caller", "app.a"));
    let registry = TestRegistry::build(&module);

    assert!(caller_ids(&registry, "app.a").is_empty());
    assert!(registry.index_of(&f("ghost.caller")).is_none());
}

#[test]
fn undeclared_callees_are_indexed_but_not_declared() {
    let module = ModuleBuilder::new()
        .function("app.a", &["std.print"])
        .build();
    let registry = TestRegistry::build(&module);

    assert!(registry.index_of(&f("std.print")).is_some());
    assert!(!registry.is_declared(&f("std.print")));
    assert!(registry.is_declared(&f("app.a")));
    assert_eq!(registry.function_count(), 2);
}

// ── Tests ────────────────────────────────────────────────────

#[test]
fn tests_are_classified() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .test("app.test_a", &["app.a"])
        .test("app.test_floating", &[])
        .test("app.test_missing", &["app.a", "app.gone"])
        .build();
    let registry = TestRegistry::build(&module);

    assert_eq!(registry.targeted(), &[t("app.test_a")]);
    assert_eq!(registry.free_floating(), &[t("app.test_floating")]);
    assert_eq!(
        registry.unresolved(),
        &[(t("app.test_missing"), vec![f("app.gone")])]
    );
    assert_eq!(registry.tests().len(), 3);
}

#[test]
fn free_floating_tests_never_appear_in_tests_for() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .test("app.test_floating", &[])
        .build();
    let registry = TestRegistry::build(&module);

    assert!(registry.tests_for(&f("app.a")).is_empty());
}

#[test]
fn unresolved_tests_never_appear_in_tests_for() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .test("app.test_missing", &["app.a", "app.gone"])
        .build();
    let registry = TestRegistry::build(&module);

    assert!(registry.tests_for(&f("app.a")).is_empty());
}

#[test]
fn tests_for_multi_target() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .function("app.b", &[])
        .test("app.test_z", &["app.b", "app.a"])
        .test("app.test_y", &["app.b"])
        .build();
    let registry = TestRegistry::build(&module);

    assert_eq!(registry.tests_for(&f("app.a")), &[t("app.test_z")]);
    assert_eq!(
        registry.tests_for(&f("app.b")),
        &[t("app.test_y"), t("app.test_z")]
    );
    assert!(registry.tests_for(&f("app.unknown")).is_empty());
}

#[test]
fn duplicate_test_keeps_later_declaration() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .function("app.b", &[])
        .test("app.test", &["app.a"])
        .test("app.test", &["app.b"])
        .build();
    let registry = TestRegistry::build(&module);

    assert_eq!(registry.tests().len(), 1);
    assert_eq!(registry.tests_for(&f("app.b")), &[t("app.test")]);
    assert!(registry.tests_for(&f("app.a")).is_empty());
    assert!(matches!(
        registry.warnings(),
        [Warning::DuplicateTest { test }] if test == &t("app.test")
    ));
}

#[test]
fn effectful_tests_follow_target_capabilities() {
    let module = ModuleBuilder::new()
        .function("app.pure", &[])
        .effectful("app.fetch", "Http")
        .test("app.test_pure", &["app.pure"])
        .test("app.test_fetch", &["app.fetch", "app.pure"])
        .build();
    let registry = TestRegistry::build(&module);

    assert!(registry.is_effectful(&t("app.test_fetch")));
    assert!(!registry.is_effectful(&t("app.test_pure")));
    assert!(!registry.is_effectful(&t("app.unknown")));
}

// ── Coverage ─────────────────────────────────────────────────

#[test]
fn coverage_lists_declared_functions() {
    let module = ModuleBuilder::new()
        .function("app.b", &["std.print"])
        .function("app.a", &[])
        .test("app.test_a", &["app.a"])
        .build();
    let coverage = TestRegistry::build(&module).coverage();

    assert_eq!(coverage.total, 2);
    assert_eq!(coverage.covered, 1);
    assert_eq!(coverage.functions[0].function, f("app.a"));
    assert_eq!(coverage.functions[0].tests, vec![t("app.test_a")]);
    assert_eq!(coverage.untested().collect::<Vec<_>>(), vec![&f("app.b")]);
}
