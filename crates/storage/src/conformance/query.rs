use std::future::Future;

use ota_core::{ChangeSet, Platform};

use super::{check, id, ids, ios, make_bundle, TestResult};
use crate::{BundleFilter, BundleStore};

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "get_missing_bundle_is_none",
        get_missing_bundle_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_filters_and_counts",
        list_filters_and_counts(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_paginates_newest_first",
        list_paginates_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "channels_are_distinct_and_sorted",
        channels_are_distinct_and_sorted(factory).await,
    ));

    results
}

async fn get_missing_bundle_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let got = store
        .get_bundle(id(42))
        .await
        .map_err(|e| format!("get: {e}"))?;
    check(got.is_none(), || format!("expected None, got {got:?}"))
}

async fn list_filters_and_counts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let changes = ChangeSet::new()
        .insert(ios(1))
        .insert(ios(2).with_enabled(false))
        .insert(make_bundle(3, Platform::Android, "production"))
        .insert(make_bundle(4, Platform::Ios, "beta"));
    store
        .commit(changes)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let all = store
        .list_bundles(&BundleFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    check(all.total == 4 && all.data.len() == 4, || {
        format!("unfiltered: total {} data {:?}", all.total, ids(&all.data))
    })?;

    let filter = BundleFilter {
        platform: Some(Platform::Ios),
        channel: Some("production".into()),
        ..Default::default()
    };
    let ios_prod = store
        .list_bundles(&filter)
        .await
        .map_err(|e| format!("list: {e}"))?;
    check(ios_prod.data.len() == 2 && ios_prod.total == 2, || {
        format!("ios/production: {:?}", ids(&ios_prod.data))
    })?;

    let filter = BundleFilter {
        enabled: Some(false),
        ..Default::default()
    };
    let disabled = store
        .list_bundles(&filter)
        .await
        .map_err(|e| format!("list: {e}"))?;
    check(ids(&disabled.data) == ids(&[ios(2)]), || {
        format!("disabled: {:?}", ids(&disabled.data))
    })
}

async fn list_paginates_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let changes = (1..=5).map(ios).fold(ChangeSet::new(), ChangeSet::insert);
    store
        .commit(changes)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let filter = BundleFilter {
        limit: Some(2),
        offset: 1,
        ..Default::default()
    };
    let page = store
        .list_bundles(&filter)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let expected = ids(&[ios(4), ios(3)]);
    check(page.total == 5 && ids(&page.data) == expected, || {
        format!(
            "expected total 5 and {expected:?}, got total {} and {:?}",
            page.total,
            ids(&page.data)
        )
    })?;

    let filter = BundleFilter {
        limit: Some(10),
        offset: 10,
        ..Default::default()
    };
    let past_end = store
        .list_bundles(&filter)
        .await
        .map_err(|e| format!("list: {e}"))?;
    check(past_end.data.is_empty() && past_end.total == 5, || {
        format!("past end: {:?}", ids(&past_end.data))
    })
}

async fn channels_are_distinct_and_sorted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BundleStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let changes = ChangeSet::new()
        .insert(make_bundle(1, Platform::Ios, "staging"))
        .insert(make_bundle(2, Platform::Android, "beta"))
        .insert(make_bundle(3, Platform::Ios, "production"))
        .insert(make_bundle(4, Platform::Android, "staging"));
    store
        .commit(changes)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let channels = store.channels().await.map_err(|e| format!("channels: {e}"))?;
    check(channels == ["beta", "production", "staging"], || {
        format!("got {channels:?}")
    })
}
