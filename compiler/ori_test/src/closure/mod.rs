//! Reverse closure over the caller graph.
//!
//! Starting from the changed functions, walks `callers` edges outward until
//! no new function is reached. The walk is an iterative BFS with a visited
//! bitset over `FuncIdx`, so recursion and mutual recursion terminate and
//! every function is enqueued at most once: O(V + E).

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use ori_test_ir::FunctionId;

use crate::registry::{FuncIdx, TestRegistry};

/// Functions affected by a set of changes: the roots plus every transitive
/// caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffectedSet {
    /// Sorted, deduplicated.
    functions: Vec<FunctionId>,
    members: FxHashSet<FunctionId>,
}

impl AffectedSet {
    fn from_unsorted(mut functions: Vec<FunctionId>) -> Self {
        functions.sort();
        functions.dedup();
        let members = functions.iter().cloned().collect();
        AffectedSet { functions, members }
    }

    pub fn contains(&self, f: &FunctionId) -> bool {
        self.members.contains(f)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Affected functions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionId> + '_ {
        self.functions.iter()
    }

    /// Whether every function in `self` is also in `other`.
    pub fn is_subset(&self, other: &AffectedSet) -> bool {
        self.functions.iter().all(|f| other.contains(f))
    }
}

/// Fixed-size bitset indexed by `FuncIdx`.
struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    fn new(len: usize) -> Self {
        VisitedSet {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Mark `idx` visited; returns `true` if it was not visited before.
    #[inline]
    fn insert(&mut self, idx: FuncIdx) -> bool {
        let (word, bit) = (idx.index() / 64, idx.index() % 64);
        let mask = 1u64 << bit;
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| w * 64 + bit)
        })
    }
}

/// Every function that is a root or transitively calls a root.
///
/// Roots unknown to the registry (removed functions nothing references any
/// more) are kept in the result by id; they have no callers to follow.
#[tracing::instrument(level = "debug", skip_all, fields(affected = tracing::field::Empty))]
pub fn reverse_closure<'a, I>(registry: &TestRegistry, roots: I) -> AffectedSet
where
    I: IntoIterator<Item = &'a FunctionId>,
{
    let mut visited = VisitedSet::new(registry.function_count());
    let mut queue: VecDeque<FuncIdx> = VecDeque::new();
    let mut unindexed: Vec<FunctionId> = Vec::new();

    for root in roots {
        match registry.index_of(root) {
            Some(idx) => {
                if visited.insert(idx) {
                    queue.push_back(idx);
                }
            }
            None => unindexed.push(root.clone()),
        }
    }

    while let Some(current) = queue.pop_front() {
        for &caller in registry.callers(current) {
            if visited.insert(caller) {
                queue.push_back(caller);
            }
        }
    }

    let mut functions = unindexed;
    functions.extend(visited.iter().map(|i| {
        let raw = u32::try_from(i).unwrap_or(u32::MAX);
        registry.function_id(FuncIdx::from_raw(raw)).clone()
    }));
    let affected = AffectedSet::from_unsorted(functions);
    tracing::Span::current().record("affected", affected.len());
    affected
}
