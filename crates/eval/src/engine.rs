//! Resolution: one query in, one decision out.

use ota_core::{Bundle, BundleId, UpdateInfo, UpdateQuery, UpdateStatus};
use ota_storage::{BundleScope, BundleStore, StorageError};
use serde::{Deserialize, Serialize};

use crate::file_url::{FileUrlError, FileUrlResolver};
use crate::narrow::narrow;
use crate::rollout;
use crate::selector::{order_candidates, select, Selection};

/// A failure to answer a query. "No update" is never an error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("bundle store unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot issue file url: {0}")]
    FileUrl(#[from] FileUrlError),
}

/// Resolve `query` against the bundles of one snapshot.
///
/// Pure and deterministic: the same snapshot and query always give the
/// same answer. `None` means NO_UPDATE.
pub fn resolve(query: &UpdateQuery, bundles: &[Bundle]) -> Option<UpdateInfo> {
    let ordered = order_candidates(narrow(query, bundles));
    let selection = select(&ordered, query.bundle_id, query.min_bundle_id);

    let info = match selection {
        Selection::Update(bundle) => {
            let eligible = query
                .device_id
                .as_deref()
                .map_or(true, |device| rollout::is_eligible(bundle, device));
            eligible.then(|| UpdateInfo::from_bundle(bundle, UpdateStatus::Update))
        }
        Selection::Rollback(bundle) => Some(UpdateInfo::from_bundle(bundle, UpdateStatus::Rollback)),
        Selection::RollbackToBaseline => Some(UpdateInfo::rollback_to_baseline()),
        Selection::NoUpdate => None,
    };

    tracing::debug!(
        platform = %query.platform,
        channel = %query.channel,
        strategy = query.strategy.kind(),
        bundle_id = %query.bundle_id,
        candidates = ordered.len(),
        outcome = outcome(&selection, info.as_ref()),
        "resolved update query"
    );
    info
}

fn outcome(selection: &Selection<'_>, info: Option<&UpdateInfo>) -> &'static str {
    match (selection, info) {
        (Selection::Update(_), None) => "gated",
        (_, None) => "no_update",
        (Selection::RollbackToBaseline, Some(_)) => "rollback_to_baseline",
        (_, Some(info)) => match info.status {
            UpdateStatus::Update => "update",
            UpdateStatus::Rollback => "rollback",
        },
    }
}

/// The body returned to a device for a positive decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub id: BundleId,
    pub should_force_update: bool,
    pub message: Option<String>,
    pub status: UpdateStatus,
    pub file_url: Option<String>,
    pub file_hash: Option<String>,
}

impl UpdateResponse {
    /// Attach a download URL. A decision without a payload gets `fileUrl: null`.
    pub fn from_info(info: UpdateInfo, urls: &dyn FileUrlResolver) -> Result<Self, FileUrlError> {
        let file_url = info
            .storage_uri
            .as_deref()
            .map(|uri| urls.file_url(uri))
            .transpose()?;
        Ok(Self {
            id: info.id,
            should_force_update: info.should_force_update,
            message: info.message,
            status: info.status,
            file_url,
            file_hash: info.file_hash,
        })
    }
}

/// Answers update queries from a [`BundleStore`].
///
/// Holds no state beyond the store handle: each call fetches one scope
/// snapshot and resolves over it, so calls can run concurrently.
#[derive(Debug, Clone)]
pub struct ResolutionEngine<S> {
    store: S,
}

impl<S: BundleStore> ResolutionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn resolve(&self, query: &UpdateQuery) -> Result<Option<UpdateInfo>, ResolveError> {
        let scope = BundleScope::new(query.platform, query.channel.clone());
        let snapshot = self.store.snapshot(&scope).await?;
        Ok(resolve(query, &snapshot))
    }

    /// Resolve and attach a file URL.
    pub async fn check_update(
        &self,
        query: &UpdateQuery,
        urls: &dyn FileUrlResolver,
    ) -> Result<Option<UpdateResponse>, ResolveError> {
        match self.resolve(query).await? {
            Some(info) => Ok(Some(UpdateResponse::from_info(info, urls)?)),
            None => Ok(None),
        }
    }
}
