//! Test runner configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default threshold above which an executed test is reported as slow.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(1);

/// Configuration for one test engine instance.
///
/// Filled by the calling layer (CLI flags, build settings). Every field has a
/// usable default, so `TestRunnerConfig::default()` runs incrementally,
/// in parallel, without persistence.
#[derive(Clone, Debug)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "Config struct: each bool controls an independent flag"
)]
pub struct TestRunnerConfig {
    /// Filter tests by name pattern (substring match).
    pub filter: Option<String>,
    /// Run executed tests on a worker pool.
    pub parallel: bool,
    /// Worker count; `None` lets the pool pick one per core.
    pub jobs: Option<usize>,
    /// Any `Fail` or `Error` makes the run `Failed`.
    pub strict: bool,
    /// Select but do not execute; nothing is persisted.
    pub skip_tests: bool,
    /// Treat every targeted test as affected.
    pub force_full_rerun: bool,
    /// Also execute free-floating tests (the run-everything command).
    pub include_free_floating: bool,
    /// Attach a coverage report to the run report.
    pub coverage: bool,
    /// Executed tests slower than this are reported.
    pub slow_threshold: Duration,
    /// Per-test wall-clock limit.
    pub timeout: Option<Duration>,
    /// Directory for the persisted cache; `None` keeps it in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Written into the cache header; a mismatch discards the cache.
    pub tool_version: String,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        TestRunnerConfig {
            filter: None,
            parallel: true,
            jobs: None,
            strict: false,
            skip_tests: false,
            force_full_rerun: false,
            include_free_floating: false,
            coverage: false,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            timeout: None,
            cache_dir: None,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl TestRunnerConfig {
    /// Defaults overlaid with `ORI_TEST_JOBS`, `ORI_TEST_SLOW_MS` and
    /// `ORI_TEST_TIMEOUT_MS`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Overlay settings read through `lookup` (the environment, in practice).
    #[must_use]
    pub fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(jobs) = parse_var::<usize>(&lookup, "ORI_TEST_JOBS") {
            if jobs == 0 {
                tracing::warn!("ignoring ORI_TEST_JOBS=0");
            } else {
                self.jobs = Some(jobs);
            }
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ORI_TEST_SLOW_MS") {
            self.slow_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ORI_TEST_TIMEOUT_MS") {
            self.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        self
    }

    /// Set the name filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable or disable parallel execution.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_skip_tests(mut self, skip_tests: bool) -> Self {
        self.skip_tests = skip_tests;
        self
    }

    #[must_use]
    pub fn with_force_full_rerun(mut self, force: bool) -> Self {
        self.force_full_rerun = force;
        self
    }

    #[must_use]
    pub fn with_free_floating(mut self, include: bool) -> Self {
        self.include_free_floating = include;
        self
    }

    #[must_use]
    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    #[must_use]
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Persist the cache under `dir`.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = TestRunnerConfig::default();
        assert!(config.parallel);
        assert!(!config.strict);
        assert!(!config.include_free_floating);
        assert_eq!(config.slow_threshold, Duration::from_secs(1));
        assert!(config.cache_dir.is_none());
        assert_eq!(config.tool_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn env_overlay_applies_valid_values() {
        let config = TestRunnerConfig::default().overlay_env(lookup(&[
            ("ORI_TEST_JOBS", "4"),
            ("ORI_TEST_SLOW_MS", "250"),
            ("ORI_TEST_TIMEOUT_MS", "5000"),
        ]));
        assert_eq!(config.jobs, Some(4));
        assert_eq!(config.slow_threshold, Duration::from_millis(250));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn env_overlay_ignores_invalid_values() {
        let config = TestRunnerConfig::default().overlay_env(lookup(&[
            ("ORI_TEST_JOBS", "many"),
            ("ORI_TEST_SLOW_MS", "-3"),
            ("ORI_TEST_TIMEOUT_MS", "0"),
        ]));
        assert_eq!(config.jobs, None);
        assert_eq!(config.slow_threshold, DEFAULT_SLOW_THRESHOLD);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn builder_methods() {
        let config = TestRunnerConfig::default()
            .with_filter("parse")
            .with_strict(true)
            .with_jobs(2)
            .with_cache_dir("/tmp/ori-cache");
        assert_eq!(config.filter.as_deref(), Some("parse"));
        assert!(config.strict);
        assert_eq!(config.jobs, Some(2));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/ori-cache")));
    }
}
