use std::future::Future;

use ota_core::{ChangeSet, Platform};

use super::{check, ids, ios, make_bundle, TestResult};
use crate::{BundleScope, BundleStore};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "scoped_by_platform_and_channel",
        scoped_by_platform_and_channel(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "includes_disabled_bundles",
        includes_disabled_bundles(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "ordered_by_id_descending",
        ordered_by_id_descending(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "taken_snapshot_unaffected_by_later_commit",
        taken_snapshot_unaffected_by_later_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "round_trips_every_field",
        round_trips_every_field(factory).await,
    ));

    results
}

async fn scoped_by_platform_and_channel<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let changes = ChangeSet::new()
        .insert(make_bundle(1, Platform::Ios, "production"))
        .insert(make_bundle(2, Platform::Android, "production"))
        .insert(make_bundle(3, Platform::Ios, "beta"))
        .insert(make_bundle(4, Platform::Ios, "production"));
    store
        .commit(changes)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let ios_prod = store
        .snapshot(&BundleScope::new(Platform::Ios, "production"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(ids(&ios_prod) == ids(&[ios(4), ios(1)]), || {
        format!("ios/production: got {:?}", ids(&ios_prod))
    })?;

    let ios_beta = store
        .snapshot(&BundleScope::new(Platform::Ios, "beta"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(ios_beta.len() == 1 && ios_beta[0].channel == "beta", || {
        format!("ios/beta: got {:?}", ids(&ios_beta))
    })?;

    let android_beta = store
        .snapshot(&BundleScope::new(Platform::Android, "beta"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(android_beta.is_empty(), || {
        format!("android/beta: got {:?}", ids(&android_beta))
    })
}

async fn includes_disabled_bundles<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .commit(ChangeSet::new().insert(ios(1).with_enabled(false)))
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let snapshot = store
        .snapshot(&BundleScope::new(Platform::Ios, "production"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(snapshot.len() == 1 && !snapshot[0].enabled, || {
        format!("expected the disabled bundle, got {:?}", ids(&snapshot))
    })
}

async fn ordered_by_id_descending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    // Committed out of order on purpose.
    for n in [3, 1, 5, 2, 4] {
        store
            .commit(ChangeSet::new().insert(ios(n)))
            .await
            .map_err(|e| format!("commit {n}: {e}"))?;
    }

    let snapshot = store
        .snapshot(&BundleScope::new(Platform::Ios, "production"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    let expected = ids(&[ios(5), ios(4), ios(3), ios(2), ios(1)]);
    check(ids(&snapshot) == expected, || {
        format!("expected {expected:?}, got {:?}", ids(&snapshot))
    })
}

async fn taken_snapshot_unaffected_by_later_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let scope = BundleScope::new(Platform::Ios, "production");
    store
        .commit(ChangeSet::new().insert(ios(1)))
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let before = store
        .snapshot(&scope)
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    store
        .commit(ChangeSet::new().insert(ios(2)).update(ios(1).with_enabled(false)))
        .await
        .map_err(|e| format!("commit: {e}"))?;

    check(before.len() == 1 && before[0].enabled, || {
        format!("earlier snapshot changed: {:?}", ids(&before))
    })?;

    let after = store
        .snapshot(&scope)
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(after.len() == 2, || {
        format!("expected 2 bundles after commit, got {:?}", ids(&after))
    })
}

async fn round_trips_every_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut bundle = ios(1)
        .with_force_update(true)
        .with_rollout(0)
        .with_target_devices(["device-a", "device-b"])
        .with_message("hotfix")
        .with_file_hash("sha256:abc");
    bundle.metadata = Some(serde_json::json!({"app_version": "1.2.3"}));
    bundle.git_commit_hash = Some("deadbeef".into());

    let fingerprinted = ota_core::Bundle::for_fingerprint(
        super::id(2),
        Platform::Ios,
        "8b47da71b3b7cf7fa7fd0ad4938207d01d584430",
        "conformance://bundle/2",
    );

    store
        .commit(ChangeSet::new().insert(bundle.clone()).insert(fingerprinted.clone()))
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let snapshot = store
        .snapshot(&BundleScope::new(Platform::Ios, "production"))
        .await
        .map_err(|e| format!("snapshot: {e}"))?;
    check(snapshot.bundles() == [fingerprinted, bundle], || {
        format!("fields did not round-trip: {snapshot:?}")
    })
}
