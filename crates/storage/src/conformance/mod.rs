//! Conformance test suite for `BundleStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `BundleStore`
//! implementation can run to verify it is interchangeable with the others.
//! The suite covers:
//!
//! - **Commit**: insert/update/delete rules, all-or-nothing changesets
//! - **Snapshot**: platform + channel scoping, ordering, immutability
//! - **Query**: admin reads (get, filtered and paginated listing, channels)
//! - **Concurrent**: no torn reads while changesets are being committed
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use ota_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         SqliteStore::in_memory().unwrap()
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod query;
mod snapshot;

use std::fmt;
use std::future::Future;

use ota_core::{Bundle, BundleId, Platform};
use uuid::Uuid;

use crate::BundleStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "commit", "snapshot", "concurrent").
    pub category: String,
    /// Test name (e.g. "failed_changeset_applies_nothing").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation. The concurrent tests spawn tasks, so the
/// suite must run inside a multi-threaded tokio runtime.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: BundleStore + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// A deterministic id: `n` in the low bits of a UUIDv7-shaped value.
fn id(n: u64) -> BundleId {
    BundleId::from_uuid(uuid_from(n))
}

fn uuid_from(n: u64) -> Uuid {
    Uuid::from_u128(0x0195_a408_8f13_7000_8000_0000_0000_0000 | u128::from(n))
}

fn make_bundle(n: u64, platform: Platform, channel: &str) -> Bundle {
    Bundle::for_app_version(id(n), platform, "*", format!("conformance://bundle/{n}"))
        .with_channel(channel)
}

fn ios(n: u64) -> Bundle {
    make_bundle(n, Platform::Ios, "production")
}

fn check(condition: bool, msg: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(msg())
    }
}

fn ids(bundles: &[Bundle]) -> Vec<String> {
    bundles.iter().map(|b| b.id.to_string()).collect()
}
