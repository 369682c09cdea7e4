use std::future::Future;

use ota_core::{ChangeSet, Platform};

use super::{check, ids, ios, TestResult};
use crate::{BundleScope, BundleStore, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "insert_is_visible_after_commit",
        insert_is_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "update_replaces_bundle",
        update_replaces_bundle(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "delete_removes_bundle",
        delete_removes_bundle(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "duplicate_insert_rejected",
        duplicate_insert_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "update_of_missing_bundle_rejected",
        update_of_missing_bundle_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "delete_of_missing_bundle_rejected",
        delete_of_missing_bundle_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "invalid_bundle_rejected",
        invalid_bundle_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "failed_changeset_applies_nothing",
        failed_changeset_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "entries_apply_in_order",
        entries_apply_in_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "empty_changeset_is_noop",
        empty_changeset_is_noop(factory).await,
    ));

    results
}

fn scope() -> BundleScope {
    BundleScope::new(Platform::Ios, "production")
}

async fn insert_is_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let bundle = ios(1).with_message("first");
    store
        .commit(ChangeSet::new().insert(bundle.clone()))
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let got = store
        .get_bundle(bundle.id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    check(got.as_ref() == Some(&bundle), || {
        format!("expected inserted bundle, got {got:?}")
    })
}

async fn update_replaces_bundle<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new().insert(ios(1)))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let updated = ios(1)
        .with_enabled(false)
        .with_rollout(25)
        .with_target_devices(["device-a"])
        .with_message("paused");
    store
        .commit(ChangeSet::new().update(updated.clone()))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let got = store
        .get_bundle(updated.id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    check(got.as_ref() == Some(&updated), || {
        format!("expected updated bundle, got {got:?}")
    })
}

async fn delete_removes_bundle<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new().insert(ios(1)).insert(ios(2)))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    store
        .commit(ChangeSet::new().delete(ios(1)))
        .await
        .map_err(|e| format!("delete: {e}"))?;

    let snapshot = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(
        snapshot.len() == 1 && snapshot[0].id == ios(2).id,
        || format!("expected only bundle 2, got {:?}", ids(&snapshot)),
    )
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new().insert(ios(1)))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    match store.commit(ChangeSet::new().insert(ios(1))).await {
        Err(StorageError::DuplicateBundle { id }) if id == ios(1).id => Ok(()),
        other => Err(format!("expected DuplicateBundle, got {other:?}")),
    }
}

async fn update_of_missing_bundle_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.commit(ChangeSet::new().update(ios(9))).await {
        Err(StorageError::BundleNotFound { id }) if id == ios(9).id => Ok(()),
        other => Err(format!("expected BundleNotFound, got {other:?}")),
    }
}

async fn delete_of_missing_bundle_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.commit(ChangeSet::new().delete(ios(9))).await {
        Err(StorageError::BundleNotFound { .. }) => Ok(()),
        other => Err(format!("expected BundleNotFound, got {other:?}")),
    }
}

async fn invalid_bundle_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut both_targets = ios(1);
    both_targets.fingerprint_hash = Some("8b47da71b3b7cf7fa7fd0ad4938207d01d584430".into());

    match store.commit(ChangeSet::new().insert(both_targets)).await {
        Err(StorageError::InvalidBundle(_)) => {}
        other => return Err(format!("expected InvalidBundle, got {other:?}")),
    }

    match store.commit(ChangeSet::new().insert(ios(2).with_rollout(150))).await {
        Err(StorageError::InvalidBundle(_)) => Ok(()),
        other => Err(format!("expected InvalidBundle for rollout 150, got {other:?}")),
    }
}

/// A changeset whose last entry fails must leave no trace of its earlier entries.
async fn failed_changeset_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new().insert(ios(1)))
        .await
        .map_err(|e| format!("seed: {e}"))?;

    let doomed = ChangeSet::new()
        .insert(ios(2))
        .update(ios(1).with_enabled(false))
        .delete(ios(3));
    if store.commit(doomed).await.is_ok() {
        return Err("changeset deleting a missing bundle was accepted".into());
    }

    let snapshot = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(
        snapshot.len() == 1 && snapshot[0].id == ios(1).id && snapshot[0].enabled,
        || format!("expected untouched bundle 1 only, got {:?}", ids(&snapshot)),
    )
}

async fn entries_apply_in_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let changes = ChangeSet::new()
        .insert(ios(1))
        .update(ios(1).with_message("edited"))
        .insert(ios(2))
        .delete(ios(2));
    store
        .commit(changes)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let snapshot = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(
        snapshot.len() == 1 && snapshot[0].message.as_deref() == Some("edited"),
        || format!("expected edited bundle 1 only, got {:?}", ids(&snapshot)),
    )
}

async fn empty_changeset_is_noop<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new())
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let snapshot = store
        .snapshot(&scope())
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(snapshot.is_empty(), || "expected empty store".into())
}
