use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, BundleId};

/// Direction of a resolved decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateStatus {
    Update,
    Rollback,
}

/// A positive resolution: the bundle a device should install next.
///
/// NO_UPDATE is represented by the absence of an `UpdateInfo`
/// (`Option::None`, serialized as JSON `null`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub id: BundleId,
    pub should_force_update: bool,
    pub message: Option<String>,
    pub status: UpdateStatus,
    pub storage_uri: Option<String>,
    pub file_hash: Option<String>,
}

impl UpdateInfo {
    /// Offer `bundle` with the given status. Rollbacks are always forced.
    pub fn from_bundle(bundle: &Bundle, status: UpdateStatus) -> Self {
        Self {
            id: bundle.id,
            should_force_update: match status {
                UpdateStatus::Rollback => true,
                UpdateStatus::Update => bundle.should_force_update,
            },
            message: bundle.message.clone(),
            status,
            storage_uri: Some(bundle.storage_uri.clone()),
            file_hash: bundle.file_hash.clone(),
        }
    }

    /// Forced rollback to the app's embedded baseline: nil id, no payload.
    pub fn rollback_to_baseline() -> Self {
        Self {
            id: BundleId::NIL,
            should_force_update: true,
            message: None,
            status: UpdateStatus::Rollback,
            storage_uri: None,
            file_hash: None,
        }
    }

    pub fn is_baseline_rollback(&self) -> bool {
        self.id.is_nil() && self.status == UpdateStatus::Rollback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Platform;

    #[test]
    fn rollback_forces_update() {
        let bundle = Bundle::for_app_version(BundleId::generate(), Platform::Ios, "*", "uri")
            .with_force_update(false);
        assert!(!UpdateInfo::from_bundle(&bundle, UpdateStatus::Update).should_force_update);
        assert!(UpdateInfo::from_bundle(&bundle, UpdateStatus::Rollback).should_force_update);
    }

    #[test]
    fn baseline_rollback_serializes_with_nil_id() {
        let info = UpdateInfo::rollback_to_baseline();
        assert!(info.is_baseline_rollback());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["status"], "ROLLBACK");
        assert_eq!(json["shouldForceUpdate"], true);
        assert!(json["storageUri"].is_null());
    }
}
