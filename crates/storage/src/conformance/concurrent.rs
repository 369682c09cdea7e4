use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ota_core::{ChangeSet, Platform};

use super::{ios, TestResult};
use crate::{BundleScope, BundleStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

/// Bundles inserted per changeset in the torn-read test.
const BATCH: u64 = 5;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BundleStore + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "readers_never_observe_partial_changeset",
        readers_never_observe_partial_changeset(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_disjoint_commits_all_land",
        concurrent_disjoint_commits_all_land(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_duplicate_insert_exactly_one_wins",
        concurrent_duplicate_insert_exactly_one_wins(factory).await,
    ));

    results
}

fn scope() -> BundleScope {
    BundleScope::new(Platform::Ios, "production")
}

// ── No torn reads ────────────────────────────────────────────────────────────

/// One writer commits N changesets of BATCH inserts each while N readers
/// snapshot continuously. Every observed snapshot must hold a whole number
/// of batches.
async fn readers_never_observe_partial_changeset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let snapshot = s.snapshot(&scope()).await?;
                if snapshot.len() as u64 % BATCH != 0 {
                    return Ok::<_, StorageError>(Err(format!(
                        "observed {} bundles, not a multiple of {BATCH}",
                        snapshot.len()
                    )));
                }
                observed += 1;
                if finished {
                    return Ok(Ok(observed));
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer = {
        let s = store.clone();
        tokio::spawn(async move {
            for round in 0..N as u64 {
                let changes = (0..BATCH)
                    .map(|i| ios(round * BATCH + i + 1))
                    .fold(ChangeSet::new(), ChangeSet::insert);
                s.commit(changes).await?;
            }
            Ok::<_, StorageError>(())
        })
    };

    let write_result = writer.await.map_err(|e| format!("writer panic: {e}"))?;
    done.store(true, Ordering::SeqCst);
    write_result.map_err(|e| format!("writer: {e}"))?;

    for reader in readers {
        reader
            .await
            .map_err(|e| format!("reader panic: {e}"))?
            .map_err(|e| format!("reader storage error: {e}"))??;
    }

    let total = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("final snapshot: {e}"))?
        .len();
    if total as u64 != N as u64 * BATCH {
        return Err(format!("expected {} bundles, found {total}", N as u64 * BATCH));
    }
    Ok(())
}

// ── Disjoint writers ─────────────────────────────────────────────────────────

/// N tasks each insert a different bundle; every insert must be visible.
async fn concurrent_disjoint_commits_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N as u64 {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            s.commit(ChangeSet::new().insert(ios(i + 1))).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("commit: {e}"))?;
    }

    let found = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("snapshot: {e}"))?
        .len();
    if found != N {
        return Err(format!("expected {N} bundles, found {found}"));
    }
    Ok(())
}

// ── Racing duplicate inserts ─────────────────────────────────────────────────

/// N tasks insert the same id; exactly one succeeds and the rest get
/// DuplicateBundle.
async fn concurrent_duplicate_insert_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: BundleStore + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let bundle = ios(1).with_message(format!("writer-{i}"));
            s.commit(ChangeSet::new().insert(bundle)).await
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        match handle.await.map_err(|e| format!("task panic: {e}"))? {
            Ok(()) => winners += 1,
            Err(StorageError::DuplicateBundle { .. }) => losers += 1,
            Err(e) => return Err(format!("unexpected error: {e}")),
        }
    }

    if winners != 1 || losers != N - 1 {
        return Err(format!(
            "expected 1 winner and {} losers, got {winners} winners and {losers} losers",
            N - 1
        ));
    }
    Ok(())
}
