//! Every backend runs the same conformance suite.

use std::sync::atomic::{AtomicUsize, Ordering};

use ota_storage::conformance::run_conformance_suite;
use ota_storage::{CachingStore, JsonFileStore, MemoryStore, SqliteStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_conformance() {
    let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn json_file_store_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let path = dir.path().join(format!("bundles-{n}.json"));
        async move { JsonFileStore::new(path) }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_in_memory_conformance() {
    let report = run_conformance_suite(|| async { SqliteStore::in_memory().unwrap() }).await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_file_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let path = dir.path().join(format!("ota-{n}.db"));
        async move { SqliteStore::open(path).unwrap() }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caching_store_conformance() {
    let report = run_conformance_suite(|| async { CachingStore::new(MemoryStore::new()) }).await;
    assert!(report.failed == 0, "{report}");
}
