//! Changeset application over an in-process bundle map.
//!
//! Shared by the memory and JSON document backends. The SQLite backend
//! enforces the same rules inside a transaction.

use std::collections::{BTreeMap, BTreeSet};

use ota_core::{Bundle, BundleId, ChangeOperation, ChangeSet};

use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};

pub(crate) type BundleMap = BTreeMap<BundleId, Bundle>;

/// Apply `changes` to a copy of `current`, returning the new map.
///
/// `current` is untouched when any entry fails.
pub(crate) fn apply(current: &BundleMap, changes: ChangeSet) -> Result<BundleMap, StorageError> {
    let mut next = current.clone();
    for change in changes {
        let id = change.bundle.id;
        match change.operation {
            ChangeOperation::Insert => {
                change.bundle.validate()?;
                if next.contains_key(&id) {
                    return Err(StorageError::DuplicateBundle { id });
                }
                next.insert(id, change.bundle);
            }
            ChangeOperation::Update => {
                change.bundle.validate()?;
                match next.get_mut(&id) {
                    Some(slot) => *slot = change.bundle,
                    None => return Err(StorageError::BundleNotFound { id }),
                }
            }
            ChangeOperation::Delete => {
                if next.remove(&id).is_none() {
                    return Err(StorageError::BundleNotFound { id });
                }
            }
        }
    }
    Ok(next)
}

pub(crate) fn from_bundles(bundles: Vec<Bundle>) -> BundleMap {
    bundles.into_iter().map(|b| (b.id, b)).collect()
}

pub(crate) fn snapshot(map: &BundleMap, scope: &BundleScope) -> BundleSnapshot {
    map.values()
        .rev()
        .filter(|b| scope.admits(b))
        .cloned()
        .collect()
}

pub(crate) fn page(map: &BundleMap, filter: &BundleFilter) -> BundlePage {
    filter.page(map.values().rev())
}

pub(crate) fn channels(map: &BundleMap) -> Vec<String> {
    map.values()
        .map(|b| b.channel.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
