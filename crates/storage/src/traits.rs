use std::sync::Arc;

use async_trait::async_trait;
use ota_core::{Bundle, BundleId, ChangeSet};

use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};

/// The storage trait for published bundles.
///
/// A `BundleStore` only moves data. Every backend answers the same reads
/// and applies the same writes; the decision logic that consumes the reads
/// lives in the resolver, so backends cannot drift apart in behavior.
///
/// ## Commit contract
///
/// `commit` applies a [`ChangeSet`] atomically as observed by readers:
///
/// - every entry is applied or none is; any failing entry rejects the set
/// - a concurrent `snapshot` returns either the state before the set or
///   the state after it, never a mix
/// - `insert` requires a new id, `update` and `delete` an existing one
/// - inserted and updated bundles must pass [`Bundle::validate`]
///
/// Concurrent writers may race (a document-backed store is last-writer-wins
/// across processes). The guarantee is "no torn reads", not "no lost writes".
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` to be shared as `Arc<dyn BundleStore>`
/// in axum application state and across async task boundaries.
#[async_trait]
pub trait BundleStore: Send + Sync {
    // ── Resolution read path ─────────────────────────────────────────────────

    /// Every bundle (enabled or not) in one platform + channel scope.
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError>;

    // ── Write path ───────────────────────────────────────────────────────────

    /// Apply a changeset as one atomic unit.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError>;

    // ── Admin reads ──────────────────────────────────────────────────────────

    /// Read one bundle by id.
    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError>;

    /// List bundles matching `filter`, id descending, with pagination.
    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError>;

    /// Distinct channel names, sorted.
    async fn channels(&self) -> Result<Vec<String>, StorageError>;
}

#[async_trait]
impl<S: BundleStore + ?Sized> BundleStore for Arc<S> {
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError> {
        (**self).snapshot(scope).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        (**self).commit(changes).await
    }

    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError> {
        (**self).get_bundle(id).await
    }

    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError> {
        (**self).list_bundles(filter).await
    }

    async fn channels(&self) -> Result<Vec<String>, StorageError> {
        (**self).channels().await
    }
}
