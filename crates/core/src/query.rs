//! Update queries.
//!
//! A [`RawUpdateQuery`] is what a transport extracts from a request: every
//! field optional, every field text. [`RawUpdateQuery::into_query`] turns it
//! into a validated [`UpdateQuery`] or a [`QueryError`] the transport reports
//! as a client error.

use serde::{Deserialize, Serialize};

use crate::bundle::{BundleId, Platform, DEFAULT_CHANNEL};
use crate::error::QueryError;

/// How a device addresses compatible bundles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "camelCase")]
pub enum UpdateStrategy {
    /// Native app version, matched against `targetAppVersion` ranges.
    AppVersion(String),
    /// Native fingerprint, matched against `fingerprintHash`.
    Fingerprint(String),
}

impl UpdateStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateStrategy::AppVersion(_) => "appVersion",
            UpdateStrategy::Fingerprint(_) => "fingerprint",
        }
    }
}

/// A validated resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQuery {
    pub platform: Platform,
    pub strategy: UpdateStrategy,
    /// The bundle currently installed on the device.
    pub bundle_id: BundleId,
    /// Server-enforced floor; nothing older is ever offered.
    pub min_bundle_id: BundleId,
    pub channel: String,
    pub device_id: Option<String>,
}

impl UpdateQuery {
    pub fn app_version(platform: Platform, app_version: impl Into<String>, bundle_id: BundleId) -> Self {
        Self::new(platform, UpdateStrategy::AppVersion(app_version.into()), bundle_id)
    }

    pub fn fingerprint(
        platform: Platform,
        fingerprint_hash: impl Into<String>,
        bundle_id: BundleId,
    ) -> Self {
        Self::new(
            platform,
            UpdateStrategy::Fingerprint(fingerprint_hash.into()),
            bundle_id,
        )
    }

    pub fn new(platform: Platform, strategy: UpdateStrategy, bundle_id: BundleId) -> Self {
        Self {
            platform,
            strategy,
            bundle_id,
            min_bundle_id: BundleId::NIL,
            channel: DEFAULT_CHANNEL.to_string(),
            device_id: None,
        }
    }

    pub fn with_min_bundle_id(mut self, min_bundle_id: BundleId) -> Self {
        self.min_bundle_id = min_bundle_id;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Unvalidated query fields as carried by headers, path segments or flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUpdateQuery {
    pub platform: Option<String>,
    pub app_version: Option<String>,
    pub fingerprint_hash: Option<String>,
    pub bundle_id: Option<String>,
    pub min_bundle_id: Option<String>,
    pub channel: Option<String>,
    pub device_id: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_id(field: &'static str, value: &str) -> Result<BundleId, QueryError> {
    value.parse().map_err(|_| QueryError::InvalidBundleId {
        field,
        value: value.to_string(),
    })
}

impl RawUpdateQuery {
    /// Validate into an [`UpdateQuery`].
    ///
    /// `platform` and `bundleId` are required, plus one of `appVersion` /
    /// `fingerprintHash`; when both are given the fingerprint is used.
    /// Blank values count as absent.
    pub fn into_query(self) -> Result<UpdateQuery, QueryError> {
        let platform: Platform = present(self.platform)
            .ok_or(QueryError::MissingField("platform"))?
            .parse()?;

        let strategy = match (present(self.fingerprint_hash), present(self.app_version)) {
            (Some(hash), _) => UpdateStrategy::Fingerprint(hash),
            (None, Some(version)) => UpdateStrategy::AppVersion(version),
            (None, None) => return Err(QueryError::MissingStrategy),
        };

        let bundle_id = present(self.bundle_id).ok_or(QueryError::MissingField("bundleId"))?;
        let bundle_id = parse_id("bundleId", &bundle_id)?;

        let min_bundle_id = match present(self.min_bundle_id) {
            Some(min) => parse_id("minBundleId", &min)?,
            None => BundleId::NIL,
        };

        Ok(UpdateQuery {
            platform,
            strategy,
            bundle_id,
            min_bundle_id,
            channel: present(self.channel).unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            device_id: present(self.device_id),
        })
    }
}
