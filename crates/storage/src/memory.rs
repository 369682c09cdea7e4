use std::sync::Arc;

use async_trait::async_trait;
use ota_core::{Bundle, BundleId, ChangeSet};
use tokio::sync::RwLock;

use crate::apply::{self, BundleMap};
use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};
use crate::traits::BundleStore;

/// In-process store.
///
/// State is an immutable map behind an `Arc`; a commit builds the next map
/// off to the side and swaps the pointer, so readers see whole states only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Arc<BundleMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `bundles`, validated like one insert changeset.
    pub fn with_bundles(bundles: impl IntoIterator<Item = Bundle>) -> Result<Self, StorageError> {
        let changes = bundles.into_iter().fold(ChangeSet::new(), ChangeSet::insert);
        let state = apply::apply(&BundleMap::new(), changes)?;
        Ok(Self {
            state: RwLock::new(Arc::new(state)),
        })
    }

    async fn current(&self) -> Arc<BundleMap> {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl BundleStore for MemoryStore {
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError> {
        let state = self.current().await;
        Ok(apply::snapshot(&*state, scope))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let count = changes.len();
        let mut state = self.state.write().await;
        let next = apply::apply(&**state, changes)?;
        *state = Arc::new(next);
        tracing::info!(changes = count, "committed changeset to memory store");
        Ok(())
    }

    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError> {
        Ok(self.current().await.get(&id).cloned())
    }

    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError> {
        let state = self.current().await;
        Ok(apply::page(&*state, filter))
    }

    async fn channels(&self) -> Result<Vec<String>, StorageError> {
        let state = self.current().await;
        Ok(apply::channels(&*state))
    }
}
