use std::time::Duration;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use ori_test_ir::{Body, ExprKind, TargetSet};

use super::*;
use crate::test_helpers::ModuleBuilder;

fn h(value: u128) -> ContentHash {
    ContentHash::new(value)
}

fn t(id: &str) -> TestId {
    TestId::new(id)
}

#[test]
fn key_ignores_target_order() {
    let body = h(9);
    assert_eq!(inputs_hash([h(1), h(2)], body), inputs_hash([h(2), h(1)], body));
}

#[test]
fn key_depends_on_targets_and_body() {
    let base = inputs_hash([h(1), h(2)], h(9));
    assert_ne!(base, inputs_hash([h(1), h(3)], h(9)));
    assert_ne!(base, inputs_hash([h(1)], h(9)));
    assert_ne!(base, inputs_hash([h(1), h(2)], h(8)));
}

#[test]
fn round_trip() {
    let mut cache = TestCache::new();
    let key = inputs_hash([h(1)], h(2));
    let result = TestResult::fail("expected 1, got 2");
    cache.insert(t("app.test_a"), key, result.clone());

    assert_eq!(cache.get(&t("app.test_a"), key), Some(&result));
    assert_eq!(cache.get(&t("app.test_a"), inputs_hash([h(1)], h(3))), None);
    assert_eq!(cache.get(&t("app.test_b"), key), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn insert_replaces_same_key() {
    let mut cache = TestCache::new();
    let key = inputs_hash([h(1)], h(2));
    cache.insert(t("app.test_a"), key, TestResult::fail("first"));
    cache.insert(t("app.test_a"), key, TestResult::pass(Duration::ZERO));
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&t("app.test_a"), key).is_some_and(TestResult::is_pass));
    assert!(cache.remove(&t("app.test_a"), key).is_some());
    assert!(cache.is_empty());
}

#[test]
fn prune_keeps_only_live_keys() {
    let old = inputs_hash([h(1)], h(2));
    let new = inputs_hash([h(1)], h(3));
    let mut cache = TestCache::new();
    cache.insert(t("app.test_a"), old, TestResult::pass(Duration::ZERO));
    cache.insert(t("app.test_a"), new, TestResult::pass(Duration::ZERO));
    cache.insert(t("app.test_gone"), old, TestResult::pass(Duration::ZERO));

    let mut live = FxHashMap::default();
    live.insert(t("app.test_a"), new);

    assert_eq!(cache.prune(&live), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&t("app.test_a"), new).is_some());
}

#[test]
fn live_key_follows_snapshot() {
    let module = ModuleBuilder::new()
        .function("app.a", &[])
        .function("app.b", &[])
        .test("app.test_ab", &["app.a", "app.b"])
        .test("app.test_ba", &["app.b", "app.a"])
        .test("app.test_free", &[])
        .build();
    let snapshot = HashSnapshot::from_module(&module);
    let key = |id: &str| module.test(&t(id)).and_then(|decl| live_key(decl, &snapshot));

    assert!(key("app.test_ab").is_some());
    // Same targets, same (default) body: same key.
    assert_eq!(key("app.test_ab"), key("app.test_ba"));
    assert_eq!(key("app.test_free"), None);
}

#[test]
fn live_key_none_for_unknown_target() {
    let decl = ori_test_ir::TestDecl::new(
        "app.test_x",
        TargetSet::from_targets(["app.missing"]),
        Body::single(ExprKind::Unit),
    );
    let module = ModuleBuilder::new().test_decl(decl.clone()).build();
    let snapshot = HashSnapshot::from_module(&module);
    assert_eq!(live_key(&decl, &snapshot), None);
}

#[test]
fn cache_survives_bincode() {
    let mut cache = TestCache::new();
    cache.insert(
        t("app.test_a"),
        inputs_hash([h(1)], h(2)),
        TestResult::pass(Duration::from_millis(3)),
    );
    let bytes = bincode::serialize(&cache).unwrap_or_else(|e| panic!("serialize: {e}"));
    let back: TestCache = bincode::deserialize(&bytes).unwrap_or_else(|e| panic!("deserialize: {e}"));
    assert_eq!(back, cache);
}

proptest! {
    #[test]
    fn key_commutative(a in any::<u128>(), b in any::<u128>(), body in any::<u128>()) {
        prop_assert_eq!(
            inputs_hash([h(a), h(b)], h(body)),
            inputs_hash([h(b), h(a)], h(body))
        );
    }
}
