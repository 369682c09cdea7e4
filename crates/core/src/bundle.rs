//! Published bundle records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{BundleError, QueryError};

/// Channel used when neither the bundle nor the query names one.
pub const DEFAULT_CHANNEL: &str = "production";

const FULL_ROLLOUT: u8 = 100;

// ──────────────────────────────────────────────
// Identifiers
// ──────────────────────────────────────────────

/// Time-sortable bundle identifier.
///
/// Wraps a UUID (UUIDv7 for generated ids). Ordering is the UUID byte order,
/// which is the same as the lexical order of the lowercase hyphenated form,
/// so ids double as the version axis: a later deploy always sorts higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(Uuid);

impl BundleId {
    /// The all-zero id. Devices running their embedded bundle report it.
    pub const NIL: BundleId = BundleId(Uuid::nil());

    /// Generate a fresh, time-ordered id.
    pub fn generate() -> Self {
        BundleId(Uuid::now_v7())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        BundleId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for BundleId {
    fn default() -> Self {
        BundleId::NIL
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for BundleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(BundleId)
    }
}

impl From<Uuid> for BundleId {
    fn from(uuid: Uuid) -> Self {
        BundleId(uuid)
    }
}

// ──────────────────────────────────────────────
// Platform
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            _ => Err(QueryError::InvalidPlatform(s.to_string())),
        }
    }
}

// ──────────────────────────────────────────────
// Bundle
// ──────────────────────────────────────────────

/// The compatibility target a bundle participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleTarget<'a> {
    /// A version-range expression over the native app version.
    AppVersion(&'a str),
    /// A native fingerprint (full or OTA half).
    Fingerprint(&'a str),
}

/// One published, installable unit of app code.
///
/// Immutable once published apart from the administrative fields
/// (`enabled`, `rollout_percentage`, `target_device_ids`, `message`,
/// `should_force_update`), which change through a [`ChangeSet`](crate::ChangeSet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: BundleId,
    pub platform: Platform,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub should_force_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_hash: Option<String>,
    #[serde(
        default = "default_rollout",
        deserialize_with = "deserialize_rollout"
    )]
    pub rollout_percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_ids: Option<Vec<String>>,
    pub storage_uri: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub git_commit_hash: Option<String>,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_rollout() -> u8 {
    FULL_ROLLOUT
}

/// `null` and a missing field both mean a full rollout.
fn deserialize_rollout<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u8>::deserialize(deserializer)?.unwrap_or(FULL_ROLLOUT))
}

impl Bundle {
    /// A production, enabled, fully rolled-out bundle targeting an app-version range.
    pub fn for_app_version(
        id: BundleId,
        platform: Platform,
        target_app_version: impl Into<String>,
        storage_uri: impl Into<String>,
    ) -> Self {
        Self {
            target_app_version: Some(target_app_version.into()),
            ..Self::bare(id, platform, storage_uri.into())
        }
    }

    /// A production, enabled, fully rolled-out bundle targeting a native fingerprint.
    pub fn for_fingerprint(
        id: BundleId,
        platform: Platform,
        fingerprint_hash: impl Into<String>,
        storage_uri: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint_hash: Some(fingerprint_hash.into()),
            ..Self::bare(id, platform, storage_uri.into())
        }
    }

    fn bare(id: BundleId, platform: Platform, storage_uri: String) -> Self {
        Self {
            id,
            platform,
            channel: default_channel(),
            enabled: true,
            should_force_update: false,
            target_app_version: None,
            fingerprint_hash: None,
            rollout_percentage: FULL_ROLLOUT,
            target_device_ids: None,
            storage_uri,
            message: None,
            metadata: None,
            file_hash: None,
            git_commit_hash: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_force_update(mut self, should_force_update: bool) -> Self {
        self.should_force_update = should_force_update;
        self
    }

    pub fn with_rollout(mut self, percentage: u8) -> Self {
        self.rollout_percentage = percentage;
        self
    }

    pub fn with_target_devices<I, S>(mut self, device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_device_ids = Some(device_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_file_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = Some(file_hash.into());
        self
    }

    /// The compatibility target, if exactly one is set.
    pub fn target(&self) -> Option<BundleTarget<'_>> {
        match (&self.target_app_version, &self.fingerprint_hash) {
            (Some(range), None) => Some(BundleTarget::AppVersion(range)),
            (None, Some(hash)) => Some(BundleTarget::Fingerprint(hash)),
            _ => None,
        }
    }

    /// Explicit device allowlist, ignoring an empty list.
    pub fn device_allowlist(&self) -> Option<&[String]> {
        self.target_device_ids
            .as_deref()
            .filter(|devices| !devices.is_empty())
    }

    /// Check the structural invariants stores enforce on write.
    pub fn validate(&self) -> Result<(), BundleError> {
        let id = self.id.to_string();
        match (&self.target_app_version, &self.fingerprint_hash) {
            (None, None) => return Err(BundleError::MissingTarget { id }),
            (Some(_), Some(_)) => return Err(BundleError::ConflictingTarget { id }),
            _ => {}
        }
        if self.rollout_percentage > FULL_ROLLOUT {
            return Err(BundleError::RolloutOutOfRange {
                id,
                percentage: self.rollout_percentage,
            });
        }
        if self.channel.trim().is_empty() {
            return Err(BundleError::EmptyChannel { id });
        }
        Ok(())
    }
}
