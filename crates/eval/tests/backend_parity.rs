//! Every store backend must give the same decision for the same bundles
//! and query.

use std::path::Path;
use std::sync::Arc;

use ota_core::{Bundle, BundleId, ChangeSet, Platform, UpdateInfo, UpdateQuery, UpdateStatus};
use ota_eval::{rollout, ResolutionEngine};
use ota_storage::{BundleStore, CachingStore, JsonFileStore, MemoryStore, SqliteStore};

const STORAGE_URI: &str = "storage://my-app/bundle.zip";
const FP: &str = "8b47da71b3b7cf7fa7fd0ad4938207d01d584430";

// ── Fixtures ────────────────────────────────────────────────────────

fn id(s: &str) -> BundleId {
    s.parse().unwrap()
}

fn seq(n: u8) -> BundleId {
    id(&format!("00000000-0000-0000-0000-0000000000{n:02}"))
}

fn versioned(bundle_id: BundleId, range: &str) -> Bundle {
    Bundle::for_app_version(bundle_id, Platform::Ios, range, STORAGE_URI)
        .with_message("hello")
        .with_file_hash("hash")
}

fn fingerprinted(bundle_id: BundleId, hash: &str) -> Bundle {
    Bundle::for_fingerprint(bundle_id, Platform::Ios, hash, STORAGE_URI)
        .with_message("hello")
        .with_file_hash("hash")
}

fn by_version(version: &str, current: BundleId) -> UpdateQuery {
    UpdateQuery::app_version(Platform::Ios, version, current)
}

fn update(bundle_id: BundleId, force: bool) -> Option<UpdateInfo> {
    Some(UpdateInfo {
        id: bundle_id,
        should_force_update: force,
        message: Some("hello".into()),
        status: UpdateStatus::Update,
        storage_uri: Some(STORAGE_URI.into()),
        file_hash: Some("hash".into()),
    })
}

fn rollback(bundle_id: BundleId) -> Option<UpdateInfo> {
    Some(UpdateInfo {
        status: UpdateStatus::Rollback,
        ..update(bundle_id, true)?
    })
}

fn baseline() -> Option<UpdateInfo> {
    Some(UpdateInfo::rollback_to_baseline())
}

struct Scenario {
    name: &'static str,
    bundles: Vec<Bundle>,
    query: UpdateQuery,
    expected: Option<UpdateInfo>,
}

fn scenario(
    name: &'static str,
    bundles: Vec<Bundle>,
    query: UpdateQuery,
    expected: Option<UpdateInfo>,
) -> Scenario {
    Scenario {
        name,
        bundles,
        query,
        expected,
    }
}

fn scenarios() -> Vec<Scenario> {
    let min = id("0195715b-9591-7000-8000-000000000000");
    let before_min = id("0195715a-ce29-7c55-97d3-53af4fe369b7");
    let after_min = id("0195715d-42db-7475-9204-31819efc2f1d");

    vec![
        scenario(
            "wildcard bundle is offered",
            vec![versioned(seq(1), "*")],
            by_version("1.0", BundleId::NIL),
            update(seq(1), false),
        ),
        scenario(
            "no bundles, no update",
            vec![],
            by_version("1.0", BundleId::NIL),
            None,
        ),
        scenario(
            "range above device version",
            vec![versioned(seq(1), "1.1")],
            by_version("1.0", BundleId::NIL),
            None,
        ),
        scenario(
            "only the installed bundle matches",
            vec![
                versioned(id("01963024-c131-7971-8725-ab47e232df41"), "1.0.0"),
                versioned(id("01963024-c131-7971-8725-ab47e232df42"), "1.0.1"),
            ],
            by_version("1.0.0", id("01963024-c131-7971-8725-ab47e232df41")),
            None,
        ),
        scenario(
            "disabled latest falls back to older enabled",
            vec![
                versioned(seq(2), "1.0").with_force_update(true).with_enabled(false),
                versioned(seq(1), "1.0"),
            ],
            by_version("1.0", BundleId::NIL),
            update(seq(1), false),
        ),
        scenario(
            "all disabled from baseline",
            vec![
                versioned(seq(2), "1.0").with_enabled(false),
                versioned(seq(1), "1.0").with_enabled(false),
            ],
            by_version("1.0", BundleId::NIL),
            None,
        ),
        scenario(
            "installed bundle vanished with nothing left",
            vec![],
            by_version("1.0", seq(2)),
            baseline(),
        ),
        scenario(
            "already on latest",
            vec![versioned(seq(2), "1.0"), versioned(seq(1), "1.0")],
            by_version("1.0", seq(2)),
            None,
        ),
        scenario(
            "installed bundle vanished, older one remains",
            vec![versioned(seq(1), "1.0")],
            by_version("1.0", seq(2)),
            rollback(seq(1)),
        ),
        scenario(
            "force flag carries through on update",
            vec![versioned(seq(1), "1.0.0").with_force_update(true)],
            by_version("1.0", BundleId::NIL),
            update(seq(1), true),
        ),
        scenario(
            "bundle below floor is ignored",
            vec![versioned(before_min, "1.0")],
            by_version("1.0", min).with_min_bundle_id(min),
            None,
        ),
        scenario(
            "bundle above floor is offered",
            vec![versioned(after_min, "1.0"), versioned(before_min, "1.0")],
            by_version("1.0", min).with_min_bundle_id(min),
            update(after_min, false),
        ),
        scenario(
            "disabled current with only sub-floor bundles goes to baseline",
            vec![
                versioned(after_min, "1.0").with_enabled(false),
                versioned(before_min, "1.0"),
            ],
            by_version("1.0", after_min).with_min_bundle_id(min),
            baseline(),
        ),
        scenario(
            "installed equals floor",
            vec![versioned(id("01957179-d99d-7fbb-bc1e-feff6b3236f0"), "1.0")],
            by_version("1.0", id("01957179-d99d-7fbb-bc1e-feff6b3236f0"))
                .with_min_bundle_id(min),
            None,
        ),
        scenario(
            "floor above installed bundle",
            vec![versioned(id("01957b63-7d11-7281-b8e7-1120ccfdb8ab"), "1.0")],
            by_version("1.0", id("01957b63-7d11-7281-b8e7-1120ccfdb8ab"))
                .with_min_bundle_id(id("01957bb4-b13c-7000-8000-000000000000")),
            None,
        ),
        scenario(
            "empty store with installed equal to floor",
            vec![],
            by_version("1.0", min).with_min_bundle_id(min),
            None,
        ),
        scenario(
            "rolls back to newest bundle between floor and installed",
            vec![
                versioned(id("0195716c-82f5-7e5e-ac8c-d4fbf5bc7555"), "1.0"),
                versioned(id("01957167-0389-7064-8d86-f8af7950daed"), "1.0"),
                versioned(id("01957165-bee7-7df3-a25d-6686f01b02ba"), "1.0"),
            ],
            by_version("1.0", id("0195716c-d426-7308-9924-c3f8cb2eaaad"))
                .with_min_bundle_id(id("01957166-6e63-7000-8000-000000000000")),
            rollback(id("0195716c-82f5-7e5e-ac8c-d4fbf5bc7555")),
        ),
        scenario(
            "other channel is invisible",
            vec![versioned(seq(1), "1.0").with_channel("beta")],
            by_version("1.0", BundleId::NIL),
            None,
        ),
        scenario(
            "same channel is visible",
            vec![versioned(seq(1), "1.0").with_channel("beta")],
            by_version("1.0", BundleId::NIL).with_channel("beta"),
            update(seq(1), false),
        ),
        scenario(
            "other platform is invisible",
            vec![Bundle::for_app_version(seq(1), Platform::Android, "*", STORAGE_URI)],
            by_version("1.0", BundleId::NIL),
            None,
        ),
        scenario(
            "newest id wins over more specific range",
            vec![versioned(seq(2), "*"), versioned(seq(1), "1.2.3")],
            by_version("1.2.3", BundleId::NIL),
            update(seq(2), false),
        ),
        scenario(
            "fingerprint match",
            vec![fingerprinted(seq(1), FP)],
            UpdateQuery::fingerprint(Platform::Ios, FP, BundleId::NIL),
            update(seq(1), false),
        ),
        scenario(
            "fingerprint mismatch",
            vec![fingerprinted(seq(1), "1111111111111111111111111111111111111111")],
            UpdateQuery::fingerprint(Platform::Ios, FP, BundleId::NIL),
            None,
        ),
        scenario(
            "fingerprint bundle vanished",
            vec![fingerprinted(seq(1), FP)],
            UpdateQuery::fingerprint(Platform::Ios, FP, seq(3)),
            rollback(seq(1)),
        ),
        scenario(
            "zero rollout hides update from a device",
            vec![versioned(seq(1), "*").with_rollout(0)],
            by_version("1.0", BundleId::NIL).with_device_id("device-1"),
            None,
        ),
        scenario(
            "zero rollout never blocks rollback",
            vec![versioned(seq(1), "*").with_rollout(0)],
            by_version("1.0", seq(2)).with_device_id("device-1"),
            rollback(seq(1)),
        ),
        scenario(
            "allowlisted device gets update despite zero rollout",
            vec![versioned(seq(1), "*")
                .with_rollout(0)
                .with_target_devices(["device-1"])],
            by_version("1.0", BundleId::NIL).with_device_id("device-1"),
            update(seq(1), false),
        ),
        scenario(
            "device missing from allowlist is refused",
            vec![versioned(seq(1), "*").with_target_devices(["device-1"])],
            by_version("1.0", BundleId::NIL).with_device_id("device-2"),
            None,
        ),
    ]
}

// ── Backends ────────────────────────────────────────────────────────

fn backends(dir: &Path, case: usize) -> Vec<(&'static str, Arc<dyn BundleStore>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new())),
        (
            "json",
            Arc::new(JsonFileStore::new(dir.join(format!("bundles-{case}.json")))),
        ),
        ("sqlite", Arc::new(SqliteStore::in_memory().unwrap())),
        ("caching", Arc::new(CachingStore::new(MemoryStore::new()))),
    ]
}

async fn seeded(store: Arc<dyn BundleStore>, bundles: &[Bundle]) -> ResolutionEngine<Arc<dyn BundleStore>> {
    if !bundles.is_empty() {
        let changes = bundles
            .iter()
            .cloned()
            .fold(ChangeSet::new(), ChangeSet::insert);
        store.commit(changes).await.unwrap();
    }
    ResolutionEngine::new(store)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn backends_agree_on_every_scenario() {
    let dir = tempfile::tempdir().unwrap();

    for (case, scenario) in scenarios().into_iter().enumerate() {
        for (backend, store) in backends(dir.path(), case) {
            let engine = seeded(store, &scenario.bundles).await;
            let decision = engine.resolve(&scenario.query).await.unwrap();
            assert_eq!(
                decision, scenario.expected,
                "scenario '{}' on {backend}",
                scenario.name
            );
        }
    }
}

#[tokio::test]
async fn repeated_queries_give_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let bundles = vec![
        versioned(seq(3), "2.x").with_rollout(40),
        versioned(seq(2), "*").with_rollout(60),
        versioned(seq(1), "1.x"),
    ];

    for (backend, store) in backends(dir.path(), 0) {
        let engine = seeded(store, &bundles).await;
        for device in ["a", "b", "c", "d"] {
            let query = by_version("1.4.0", BundleId::NIL).with_device_id(device);
            let first = serde_json::to_vec(&engine.resolve(&query).await.unwrap()).unwrap();
            let second = serde_json::to_vec(&engine.resolve(&query).await.unwrap()).unwrap();
            assert_eq!(first, second, "device {device} on {backend}");
        }
    }
}

#[tokio::test]
async fn partial_rollout_follows_device_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = versioned(seq(1), "*").with_rollout(50);
    let devices: Vec<String> = (0..40).map(|n| format!("device-{n}")).collect();

    for (backend, store) in backends(dir.path(), 0) {
        let engine = seeded(store, std::slice::from_ref(&bundle)).await;
        for device in &devices {
            let query = by_version("1.0", BundleId::NIL).with_device_id(device.as_str());
            let offered = engine.resolve(&query).await.unwrap().is_some();
            assert_eq!(
                offered,
                rollout::bucket(device, bundle.id) < 50,
                "{device} on {backend}"
            );
        }
    }
}

#[tokio::test]
async fn disabling_a_bundle_is_seen_by_the_next_query() {
    let dir = tempfile::tempdir().unwrap();

    for (backend, store) in backends(dir.path(), 0) {
        let engine = seeded(store, &[versioned(seq(1), "*"), versioned(seq(2), "*")]).await;
        let query = by_version("1.0", seq(2));
        assert_eq!(engine.resolve(&query).await.unwrap(), None, "{backend}");

        engine
            .store()
            .commit(ChangeSet::new().update(versioned(seq(2), "*").with_enabled(false)))
            .await
            .unwrap();
        assert_eq!(engine.resolve(&query).await.unwrap(), rollback(seq(1)), "{backend}");
    }
}
