pub(crate) mod bundles;
pub(crate) mod fingerprint;
pub(crate) mod keys;
pub(crate) mod resolve;

use clap::Args;
use ota_core::{QueryError, RawUpdateQuery, UpdateQuery};

/// Identifying fields of an update check, shared by `resolve` and `check`.
#[derive(Debug, Clone, Args)]
pub(crate) struct QueryArgs {
    /// Device platform (ios or android)
    #[arg(long)]
    pub(crate) platform: String,
    /// Native app version of the device
    #[arg(long, required_unless_present = "fingerprint", conflicts_with = "fingerprint")]
    pub(crate) app_version: Option<String>,
    /// Native fingerprint hash of the device
    #[arg(long)]
    pub(crate) fingerprint: Option<String>,
    /// Bundle currently installed on the device
    #[arg(long)]
    pub(crate) bundle_id: String,
    /// Bundle embedded in the app binary [default: nil id]
    #[arg(long)]
    pub(crate) min_bundle_id: Option<String>,
    /// Release channel [default: production]
    #[arg(long)]
    pub(crate) channel: Option<String>,
    /// Device identifier for rollout gating
    #[arg(long)]
    pub(crate) device_id: Option<String>,
}

impl QueryArgs {
    pub(crate) fn to_query(&self) -> Result<UpdateQuery, QueryError> {
        RawUpdateQuery {
            platform: Some(self.platform.clone()),
            app_version: self.app_version.clone(),
            fingerprint_hash: self.fingerprint.clone(),
            bundle_id: Some(self.bundle_id.clone()),
            min_bundle_id: self.min_bundle_id.clone(),
            channel: self.channel.clone(),
            device_id: self.device_id.clone(),
        }
        .into_query()
    }
}
