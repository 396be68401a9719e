//! Result cache keyed by the content of what each test verifies.
//!
//! A cache key is `(TestId, InputsHash)`. The inputs hash combines the
//! content hashes of the test's targets as a set, then mixes in the hash of
//! the test's own body and attributes. Entries are never invalidated
//! explicitly: once no live key matches them they are unreachable, and
//! [`TestCache::prune`] drops them after a successful run.
//!
//! The key does not cover functions a target calls. A cached result is
//! therefore only consulted for tests the dependency analysis did NOT
//! select; selected tests always execute.

pub mod store;

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use ori_test_ir::{ContentHash, StableHasher, TestDecl, TestId};

use crate::change_detection::HashSnapshot;
use crate::result::TestResult;

/// Separates the target set from the test body in the key encoding.
const INPUTS_TAG: u8 = 0x70;

/// The content half of a cache key.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputsHash(ContentHash);

impl InputsHash {
    pub fn hash(self) -> ContentHash {
        self.0
    }
}

impl fmt::Debug for InputsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputsHash({:?})", self.0)
    }
}

impl fmt::Display for InputsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Combine the targets' content hashes (order-independent) with the hash of
/// the test's own definition.
pub fn inputs_hash<I>(targets: I, test_body: ContentHash) -> InputsHash
where
    I: IntoIterator<Item = ContentHash>,
{
    let mut state = StableHasher::new();
    state.write_tag(INPUTS_TAG);
    state.write_hash(ContentHash::combine_unordered(targets));
    state.write_hash(test_body);
    InputsHash(state.finish())
}

/// The key a test would be cached under in `snapshot`.
///
/// `None` for free-floating tests and for tests with a target or body that
/// the snapshot does not know; such tests are never cached.
pub fn live_key(test: &TestDecl, snapshot: &HashSnapshot) -> Option<InputsHash> {
    if test.targets.is_free_floating() {
        return None;
    }
    let targets: Option<Vec<ContentHash>> = test
        .targets
        .targets()
        .iter()
        .map(|target| snapshot.function(target))
        .collect();
    Some(inputs_hash(targets?, snapshot.test(&test.id)?))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct CacheKey {
    test: TestId,
    inputs: InputsHash,
}

/// In-memory result table: `(TestId, InputsHash) -> TestResult`.
///
/// This is the persisted test-result table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCache {
    entries: FxHashMap<CacheKey, TestResult>,
}

impl TestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `test` under `inputs`.
    pub fn get(&self, test: &TestId, inputs: InputsHash) -> Option<&TestResult> {
        self.entries.get(&CacheKey {
            test: test.clone(),
            inputs,
        })
    }

    /// Store a result, replacing any previous one under the same key.
    pub fn insert(&mut self, test: TestId, inputs: InputsHash, result: TestResult) {
        self.entries.insert(CacheKey { test, inputs }, result);
    }

    pub fn remove(&mut self, test: &TestId, inputs: InputsHash) -> Option<TestResult> {
        self.entries.remove(&CacheKey {
            test: test.clone(),
            inputs,
        })
    }

    /// Keep only entries whose key is the live key of a current test.
    ///
    /// Drops results for deleted tests, for tests whose targets were deleted
    /// or changed, and for superseded versions. Returns the number removed.
    pub fn prune(&mut self, live: &FxHashMap<TestId, InputsHash>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| live.get(&key.test) == Some(&key.inputs));
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, kept = self.entries.len(), "pruned test cache");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests;
