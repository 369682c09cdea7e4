//! `ota serve` -- HTTP server answering device update checks and bundle
//! admin requests.
//!
//! Endpoints:
//! - GET    /health
//! - GET    /check-update                 - query in `x-*` headers
//! - GET    /app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
//! - GET    /fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
//! - GET    /api/bundles                  - paginated listing
//! - GET    /api/bundles/channels
//! - GET    /api/bundles/{id}
//! - POST   /api/bundles                  - upsert, one changeset
//! - DELETE /api/bundles/{id}
//!
//! Update checks answer `null` when there is nothing to install.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_app_version_update, handle_check_update, handle_delete_bundle,
    handle_fingerprint_update, handle_get_bundle, handle_health, handle_list_bundles,
    handle_list_channels, handle_not_found, handle_upsert_bundles,
};
use self::middleware::rate_limit_middleware;
pub(crate) use self::state::AppState;
use crate::config::ServeConfig;
use crate::trust::keygen::{key_fingerprint, read_secret_key};

/// Maximum request body size: 2 MB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// How long in-flight TLS connections get to finish after Ctrl+C.
#[cfg(feature = "tls")]
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Build the router over `state`.
///
/// Rate limiting, when configured, covers the update-check routes only and
/// needs the router served with `ConnectInfo<SocketAddr>`.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    let mut updates = Router::new()
        .route("/check-update", get(handle_check_update))
        .route(
            "/app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}",
            get(handle_app_version_update),
        )
        .route(
            "/app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}/{deviceId}",
            get(handle_app_version_update),
        )
        .route(
            "/fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}",
            get(handle_fingerprint_update),
        )
        .route(
            "/fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}/{deviceId}",
            get(handle_fingerprint_update),
        );
    if state.rate_limiter.is_some() {
        updates = updates.route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));
    }

    let admin = Router::new()
        .route(
            "/api/bundles",
            get(handle_list_bundles).post(handle_upsert_bundles),
        )
        .route("/api/bundles/channels", get(handle_list_channels))
        .route(
            "/api/bundles/{id}",
            get(handle_get_bundle).delete(handle_delete_bundle),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .merge(updates)
        .merge(admin)
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the configured store and serve until Ctrl+C.
///
/// When TLS cert/key paths are configured, the server listens over HTTPS
/// using `axum-server` with rustls (requires the `tls` feature).
pub async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = config.store.open(config.cache)?;
    let file_urls = config.file_urls()?;
    if let Some(path) = &config.signing_key {
        let key = read_secret_key(path)?;
        tracing::info!(key = %key_fingerprint(&key.verifying_key()), ttl_secs = config.url_ttl_secs, "signing download urls");
    }

    let mut state = AppState::new(store, file_urls);
    if let Some(limit) = config.rate_limit {
        tracing::info!(per_minute = limit, "rate limiting update checks");
        state = state.with_rate_limit(limit);
    }
    let app = router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(store = %config.store, cache = config.cache, "bundle store ready");

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&config.tls_cert, &config.tls_key) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("ota server listening on https://{}", addr);
        axum_server::bind_rustls(socket_addr, tls)
            .handle(shutdown_handle(shutdown_signal()))
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        tracing::info!("server shut down");
        return Ok(());
    }
    #[cfg(not(feature = "tls"))]
    if config.tls_cert.is_some() {
        return Err("TLS requires building with the `tls` feature".into());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("ota server listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// A server handle that starts a graceful shutdown once `signal` resolves.
#[cfg(feature = "tls")]
fn shutdown_handle<F>(signal: F) -> axum_server::Handle
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        signal.await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });
    handle
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

#[cfg(test)]
mod tests;
