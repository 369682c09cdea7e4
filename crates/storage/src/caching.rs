use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ota_core::{Bundle, BundleId, ChangeSet};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};
use crate::traits::BundleStore;

/// Memoizes scope snapshots of an inner store.
///
/// Every commit made through the decorator drops all memoized snapshots.
/// Commits made to the inner store by anyone else are not observed until
/// [`CachingStore::invalidate`] is called. Admin reads always go to the
/// inner store.
#[derive(Debug)]
pub struct CachingStore<S> {
    inner: S,
    snapshots: RwLock<HashMap<BundleScope, BundleSnapshot>>,
    generation: AtomicU64,
}

impl<S: BundleStore> CachingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            snapshots: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drop every memoized snapshot.
    pub async fn invalidate(&self) {
        let mut snapshots = self.snapshots.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        snapshots.clear();
    }
}

#[async_trait]
impl<S: BundleStore> BundleStore for CachingStore<S> {
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError> {
        if let Some(hit) = self.snapshots.read().await.get(scope) {
            return Ok(hit.clone());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let snapshot = self.inner.snapshot(scope).await?;

        // A commit that landed during the fetch makes the result stale.
        let mut snapshots = self.snapshots.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            snapshots.insert(scope.clone(), snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let result = self.inner.commit(changes).await;
        self.invalidate().await;
        tracing::debug!("invalidated snapshot cache after commit");
        result
    }

    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError> {
        self.inner.get_bundle(id).await
    }

    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError> {
        self.inner.list_bundles(filter).await
    }

    async fn channels(&self) -> Result<Vec<String>, StorageError> {
        self.inner.channels().await
    }
}
