use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use ota_core::{Bundle, BundleId, ChangeSet, Platform};
use ota_eval::{PassthroughResolver, SignedUrlResolver};
use ota_storage::{BundleStore, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{router, AppState};

const V1: &str = "0195a408-8f13-7d9b-8df4-000000000001";
const V2: &str = "0195a408-8f13-7d9b-8df4-000000000002";
const A1: &str = "0195a408-8f13-7d9b-8df4-0000000000a1";
const FP: &str = "8b47da71b3b7cf7fa7fd0ad4938207d01d584430";
const NIL: &str = "00000000-0000-0000-0000-000000000000";

fn id(s: &str) -> BundleId {
    s.parse().unwrap()
}

async fn store_with(bundles: Vec<Bundle>) -> Arc<dyn BundleStore> {
    let store = Arc::new(MemoryStore::new());
    let changes = bundles.into_iter().fold(ChangeSet::new(), ChangeSet::insert);
    if !changes.is_empty() {
        store.commit(changes).await.unwrap();
    }
    store
}

async fn app(bundles: Vec<Bundle>) -> Router {
    let state = AppState::new(store_with(bundles).await, Arc::new(PassthroughResolver));
    router(Arc::new(state))
}

fn fixture() -> Vec<Bundle> {
    vec![
        Bundle::for_app_version(id(V1), Platform::Ios, "1.x", "s3://bundles/v1.zip")
            .with_message("first"),
        Bundle::for_app_version(id(V2), Platform::Ios, "1.x", "s3://bundles/v2.zip")
            .with_force_update(true),
        Bundle::for_fingerprint(id(A1), Platform::Android, FP, "s3://bundles/a1.zip")
            .with_channel("beta"),
    ]
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

// ── Health and fallback ─────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(app(vec![]).await, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (status, body) = send(app(vec![]).await, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");
}

// ── Update checks ───────────────────────────────────────────────────

#[tokio::test]
async fn app_version_path_offers_newest_bundle() {
    let uri = format!("/app-version/ios/1.4.0/production/{NIL}/{NIL}");
    let (status, body) = send(app(fixture()).await, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], V2);
    assert_eq!(body["status"], "UPDATE");
    assert_eq!(body["shouldForceUpdate"], true);
    assert_eq!(body["fileUrl"], "s3://bundles/v2.zip");
}

#[tokio::test]
async fn up_to_date_device_gets_null() {
    let uri = format!("/app-version/ios/1.4.0/production/{NIL}/{V2}");
    let (status, body) = send(app(fixture()).await, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn vanished_bundle_rolls_back_to_baseline() {
    let uri = format!("/app-version/ios/2.0.0/production/{NIL}/{V2}");
    let (status, body) = send(app(fixture()).await, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "id": NIL,
            "shouldForceUpdate": true,
            "message": null,
            "status": "ROLLBACK",
            "fileUrl": null,
            "fileHash": null,
        })
    );
}

#[tokio::test]
async fn fingerprint_path_with_device_id() {
    let uri = format!("/fingerprint/android/{FP}/beta/{NIL}/{NIL}/device-42");
    let (status, body) = send(app(fixture()).await, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], A1);
    assert_eq!(body["fileUrl"], "s3://bundles/a1.zip");
}

#[tokio::test]
async fn header_transport_matches_path_transport() {
    let request = Request::get("/check-update")
        .header("x-app-platform", "ios")
        .header("x-app-version", "1.4.0")
        .header("x-bundle-id", V1)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(fixture()).await, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], V2);
}

#[tokio::test]
async fn header_device_id_feeds_rollout_gate() {
    let bundles = vec![
        Bundle::for_app_version(id(V1), Platform::Ios, "*", "s3://b/1.zip")
            .with_target_devices(["tester"]),
    ];
    let request = |device: &str| {
        Request::get("/check-update")
            .header("x-app-platform", "ios")
            .header("x-app-version", "1.0.0")
            .header("x-bundle-id", NIL)
            .header("x-device-id", device)
            .body(Body::empty())
            .unwrap()
    };
    let router = app(bundles).await;

    let (_, body) = send(router.clone(), request("tester")).await;
    assert_eq!(body["id"], V1);
    let (_, body) = send(router, request("someone-else")).await;
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn malformed_queries_are_400() {
    let missing = Request::get("/check-update")
        .header("x-app-platform", "ios")
        .header("x-bundle-id", NIL)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(vec![]).await, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let uri = format!("/app-version/windows/1.0.0/production/{NIL}/{NIL}");
    let (status, _) = send(app(vec![]).await, get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/app-version/ios/1.0.0/production/{NIL}/not-a-uuid");
    let (status, _) = send(app(vec![]).await, get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_urls_replace_storage_uris() {
    let signer = SignedUrlResolver::new(
        ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]),
        "https://cdn.example.com",
    );
    let state = AppState::new(store_with(fixture()).await, Arc::new(signer));
    let uri = format!("/app-version/ios/1.4.0/production/{NIL}/{NIL}");
    let (_, body) = send(router(Arc::new(state)), get(&uri)).await;

    let url = body["fileUrl"].as_str().unwrap();
    assert!(url.starts_with("https://cdn.example.com/bundles/v2.zip?expires="));
    assert!(url.contains("&signature="));
}

#[tokio::test]
async fn rate_limit_applies_to_update_checks_only() {
    let state = AppState::new(store_with(fixture()).await, Arc::new(PassthroughResolver))
        .with_rate_limit(1);
    let app = router(Arc::new(state))
        .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))));
    let uri = format!("/app-version/ios/1.4.0/production/{NIL}/{NIL}");

    let (status, _) = send(app.clone(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    let (status, _) = send(app, get("/api/bundles")).await;
    assert_eq!(status, StatusCode::OK);
}

// ── Bundle admin ────────────────────────────────────────────────────

#[tokio::test]
async fn list_bundles_paginates_newest_first() {
    let (status, body) = send(
        app(fixture()).await,
        get("/api/bundles?platform=ios&limit=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], V2);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["hasNextPage"], true);
    assert_eq!(body["pagination"]["hasPreviousPage"], false);
}

#[tokio::test]
async fn list_rejects_unknown_platform() {
    let (status, _) = send(app(vec![]).await, get("/api/bundles?platform=web")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn channels_are_listed() {
    let (status, body) = send(app(fixture()).await, get("/api/bundles/channels")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channels"], json!(["beta", "production"]));
}

#[tokio::test]
async fn get_bundle_by_id() {
    let router = app(fixture()).await;
    let (status, body) = send(router.clone(), get(&format!("/api/bundles/{V2}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targetAppVersion"], "1.x");

    let missing = "0195a408-8f13-7d9b-8df4-0000000000ff";
    let (status, _) = send(router.clone(), get(&format!("/api/bundles/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(router, get("/api/bundles/xyz")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_upserts_in_one_changeset() {
    let store = store_with(fixture()).await;
    let state = AppState::new(store.clone(), Arc::new(PassthroughResolver));
    let router = router(Arc::new(state));

    let v3 = "0195a408-8f13-7d9b-8df4-000000000003";
    let body = json!([
        {
            "id": V2,
            "platform": "ios",
            "targetAppVersion": "1.x",
            "storageUri": "s3://bundles/v2.zip",
            "enabled": false,
        },
        {
            "id": v3,
            "platform": "ios",
            "targetAppVersion": "*",
            "storageUri": "s3://bundles/v3.zip",
        },
    ]);
    let request = Request::post("/api/bundles")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, response) = send(router, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["count"], 2);

    assert!(!store.get_bundle(id(V2)).await.unwrap().unwrap().enabled);
    assert!(store.get_bundle(id(v3)).await.unwrap().is_some());
}

#[tokio::test]
async fn post_rejects_invalid_bundle_without_partial_apply() {
    let store = store_with(vec![]).await;
    let state = AppState::new(store.clone(), Arc::new(PassthroughResolver));
    let router = router(Arc::new(state));

    let body = json!([
        { "id": V1, "platform": "ios", "targetAppVersion": "*", "storageUri": "u" },
        { "id": V2, "platform": "ios", "storageUri": "u" },
    ]);
    let request = Request::post("/api/bundles")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = send(router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.get_bundle(id(V1)).await.unwrap().is_none());
}

#[tokio::test]
async fn post_with_repeated_id_keeps_last_entry() {
    let store = store_with(vec![]).await;
    let state = AppState::new(store.clone(), Arc::new(PassthroughResolver));
    let router = router(Arc::new(state));

    let body = json!([
        { "id": V1, "platform": "ios", "targetAppVersion": "1.x", "storageUri": "s3://b/old.zip" },
        { "id": V1, "platform": "ios", "targetAppVersion": "1.x", "storageUri": "s3://b/new.zip" },
    ]);
    let request = Request::post("/api/bundles")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, response) = send(router, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["count"], 1);

    let stored = store.get_bundle(id(V1)).await.unwrap().unwrap();
    assert_eq!(stored.storage_uri, "s3://b/new.zip");
}

#[tokio::test]
async fn delete_removes_bundle() {
    let store = store_with(fixture()).await;
    let state = AppState::new(store.clone(), Arc::new(PassthroughResolver));
    let router = router(Arc::new(state));

    let delete = |uri: String| Request::delete(uri).body(Body::empty()).unwrap();
    let (status, _) = send(router.clone(), delete(format!("/api/bundles/{V2}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.get_bundle(id(V2)).await.unwrap().is_none());

    let (status, _) = send(router, delete(format!("/api/bundles/{V2}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Shutdown ────────────────────────────────────────────────────────

#[cfg(feature = "tls")]
#[tokio::test]
async fn shutdown_handle_stops_server_when_signalled() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = super::shutdown_handle(async move {
        let _ = rx.await;
    });

    let server = axum_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .handle(handle.clone())
        .serve(app(vec![]).await.into_make_service_with_connect_info::<SocketAddr>());
    let server = tokio::spawn(server);

    assert!(handle.listening().await.is_some());
    tx.send(()).unwrap();

    let finished = tokio::time::timeout(std::time::Duration::from_secs(15), server).await;
    assert!(matches!(finished, Ok(Ok(Ok(())))));
}
