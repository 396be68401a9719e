//! Ori Test - Incremental, Dependency-Aware Test Execution
//!
//! Decides on every compilation which tests must run, runs only those, and
//! caches results keyed by the content of what each test verifies.
//!
//! # Architecture
//!
//! ```text
//! TypedModule ──→ TestRegistry (callers graph, tests_for, free-floating)
//!      │                │
//!      └──→ HashSnapshot ──→ ChangeDetector ←── previous HashSnapshot (cache)
//!                                 │
//!                       changed_functions()
//!                                 ↓
//!                  reverse_closure() → AffectedSet
//!                                 ↓
//!                  select() → Selection { selected, unselected, misconfigured }
//!                                 ↓
//!        unselected ──→ TestCache lookup ──hit──→ ReportEntry { from_cache }
//!        selected + misses ──→ WorkerPool ──→ TestExecutor ──→ TestEvaluator
//!                                 ↓
//!                  TestReport ──→ CacheStore (persist, prune)
//! ```
//!
//! The [`Orchestrator`] sequences these steps as a strict state machine and
//! owns the loaded cache for the duration of a run. Nothing here is a
//! process-wide singleton except the tracing subscriber.

pub mod cache;
pub mod change_detection;
pub mod closure;
mod config;
mod error;
pub mod executor;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod report;
mod result;
pub mod selection;
mod tracing_setup;

pub use cache::store::{CacheStore, LoadedCache};
pub use cache::{inputs_hash, live_key, InputsHash, TestCache};
pub use change_detection::{ChangeDetector, HashSnapshot};
pub use closure::{reverse_closure, AffectedSet};
pub use config::TestRunnerConfig;
pub use error::CacheError;
pub use executor::{
    AssertionFailure, CancelToken, Execution, TestEnv, TestEvaluator, TestExecutor,
    CANCELLED_REASON,
};
pub use orchestrator::{Orchestrator, Phase};
pub use pool::{ExecutionRequest, WorkerPool};
pub use registry::{FuncIdx, TestRegistry};
pub use report::{ReportEntry, RunSummary, SlowTest, TestReport, Warning};
pub use result::{CoverageReport, FunctionCoverage, RunOutcome, TestResult};
pub use selection::{select, Misconfiguration, SelectOptions, Selection};
pub use tracing_setup::init_tracing;

#[cfg(test)]
mod test_helpers;
