//! HTTP route handlers: health, update checks, bundle admin.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ota_core::{Bundle, BundleId, ChangeSet, Platform, RawUpdateQuery};
use ota_storage::{BundleFilter, StorageError};
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

/// Page size when `limit` is not given.
const DEFAULT_PAGE_SIZE: usize = 50;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

// ── Update checks ──────────────────────────────────────────────────

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// GET /check-update
pub(crate) async fn handle_check_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let raw = RawUpdateQuery {
        platform: header(&headers, "x-app-platform"),
        app_version: header(&headers, "x-app-version"),
        fingerprint_hash: header(&headers, "x-fingerprint-hash"),
        bundle_id: header(&headers, "x-bundle-id"),
        min_bundle_id: header(&headers, "x-min-bundle-id"),
        channel: header(&headers, "x-channel"),
        device_id: header(&headers, "x-device-id"),
    };
    check_update(&state, raw).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppVersionPath {
    platform: String,
    app_version: String,
    channel: String,
    min_bundle_id: String,
    bundle_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

/// GET /app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
pub(crate) async fn handle_app_version_update(
    State(state): State<Arc<AppState>>,
    Path(path): Path<AppVersionPath>,
) -> Response {
    let raw = RawUpdateQuery {
        platform: Some(path.platform),
        app_version: Some(path.app_version),
        fingerprint_hash: None,
        bundle_id: Some(path.bundle_id),
        min_bundle_id: Some(path.min_bundle_id),
        channel: Some(path.channel),
        device_id: path.device_id,
    };
    check_update(&state, raw).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FingerprintPath {
    platform: String,
    fingerprint_hash: String,
    channel: String,
    min_bundle_id: String,
    bundle_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

/// GET /fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
pub(crate) async fn handle_fingerprint_update(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FingerprintPath>,
) -> Response {
    let raw = RawUpdateQuery {
        platform: Some(path.platform),
        app_version: None,
        fingerprint_hash: Some(path.fingerprint_hash),
        bundle_id: Some(path.bundle_id),
        min_bundle_id: Some(path.min_bundle_id),
        channel: Some(path.channel),
        device_id: path.device_id,
    };
    check_update(&state, raw).await
}

/// Validate, resolve, attach a file URL. No update is `200 null`.
async fn check_update(state: &AppState, raw: RawUpdateQuery) -> Response {
    let query = match raw.into_query() {
        Ok(q) => q,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    };

    match state.engine.check_update(&query, state.file_urls.as_ref()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "update check failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response()
        }
    }
}

// ── Bundle admin ───────────────────────────────────────────────────

fn storage_error(e: StorageError) -> Response {
    let status = match &e {
        StorageError::BundleNotFound { .. } => StatusCode::NOT_FOUND,
        StorageError::DuplicateBundle { .. } => StatusCode::CONFLICT,
        StorageError::InvalidBundle(_) => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!(error = %e, "bundle store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &e.to_string()).into_response()
}

fn parse_bundle_id(id: &str) -> Result<BundleId, Response> {
    id.parse().map_err(|_| {
        json_error(StatusCode::BAD_REQUEST, &format!("invalid bundle id '{}'", id)).into_response()
    })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    platform: Option<String>,
    channel: Option<String>,
    enabled: Option<bool>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// GET /api/bundles
pub(crate) async fn handle_list_bundles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let platform = match params.platform.as_deref().map(str::parse::<Platform>).transpose() {
        Ok(p) => p,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let filter = BundleFilter {
        platform,
        channel: params.channel,
        enabled: params.enabled,
        limit: Some(limit),
        offset,
    };

    match state.store().list_bundles(&filter).await {
        Ok(page) => {
            let response = serde_json::json!({
                "data": page.data,
                "pagination": {
                    "total": page.total,
                    "limit": limit,
                    "offset": offset,
                    "hasNextPage": offset.saturating_add(limit) < page.total,
                    "hasPreviousPage": offset > 0,
                },
            });
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/bundles/channels
pub(crate) async fn handle_list_channels(State(state): State<Arc<AppState>>) -> Response {
    match state.store().channels().await {
        Ok(channels) => {
            (StatusCode::OK, Json(serde_json::json!({ "channels": channels }))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/bundles/{id}
pub(crate) async fn handle_get_bundle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_bundle_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.store().get_bundle(id).await {
        Ok(Some(bundle)) => (StatusCode::OK, Json(bundle)).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "bundle not found").into_response(),
        Err(e) => storage_error(e),
    }
}

/// POST /api/bundles
///
/// Upserts an array of bundles (or a single bundle) as one changeset:
/// known ids are updated, unknown ids inserted. An id repeated in the body
/// is written once, with its last entry.
pub(crate) async fn handle_upsert_bundles(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneOrMany>,
) -> Response {
    let bundles: BTreeMap<BundleId, Bundle> = body
        .into_vec()
        .into_iter()
        .map(|bundle| (bundle.id, bundle))
        .collect();
    if bundles.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "no bundles given").into_response();
    }

    let mut changes = ChangeSet::new();
    for bundle in bundles.into_values() {
        match state.store().get_bundle(bundle.id).await {
            Ok(Some(_)) => changes = changes.update(bundle),
            Ok(None) => changes = changes.insert(bundle),
            Err(e) => return storage_error(e),
        }
    }

    let count = changes.len();
    match state.store().commit(changes).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "success": true, "count": count })),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    Many(Vec<Bundle>),
    One(Box<Bundle>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<Bundle> {
        match self {
            Self::Many(bundles) => bundles,
            Self::One(bundle) => vec![*bundle],
        }
    }
}

/// DELETE /api/bundles/{id}
pub(crate) async fn handle_delete_bundle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_bundle_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let bundle = match state.store().get_bundle(id).await {
        Ok(Some(bundle)) => bundle,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "bundle not found").into_response(),
        Err(e) => return storage_error(e),
    };
    match state.store().commit(ChangeSet::new().delete(bundle)).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response(),
        Err(e) => storage_error(e),
    }
}
