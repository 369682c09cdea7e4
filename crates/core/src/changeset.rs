//! Administrative write batches.

use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, BundleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// One entry of a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub operation: ChangeOperation,
    pub bundle: Bundle,
}

/// Ordered list of bundle writes applied to a store as one atomic unit.
///
/// Produced by deploys (insert), rollbacks and admin edits (update) and
/// pruning (delete). A store either applies every entry or none of them,
/// and readers never observe a partially applied set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: ChangeOperation, bundle: Bundle) {
        self.changes.push(Change { operation, bundle });
    }

    pub fn insert(mut self, bundle: Bundle) -> Self {
        self.push(ChangeOperation::Insert, bundle);
        self
    }

    pub fn update(mut self, bundle: Bundle) -> Self {
        self.push(ChangeOperation::Update, bundle);
        self
    }

    pub fn delete(mut self, bundle: Bundle) -> Self {
        self.push(ChangeOperation::Delete, bundle);
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Ids touched by this set, in entry order.
    pub fn bundle_ids(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.changes.iter().map(|c| c.bundle.id)
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = Change>>(iter: T) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Platform;

    #[test]
    fn serializes_as_ordered_operation_list() {
        let bundle = Bundle::for_app_version(BundleId::NIL, Platform::Ios, "1.0", "uri");
        let set = ChangeSet::new()
            .insert(bundle.clone())
            .update(bundle.clone().with_enabled(false))
            .delete(bundle);
        let json = serde_json::to_value(&set).unwrap();
        let ops: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["operation"].as_str().unwrap())
            .collect();
        assert_eq!(ops, vec!["insert", "update", "delete"]);
        assert_eq!(set.len(), 3);
    }
}
