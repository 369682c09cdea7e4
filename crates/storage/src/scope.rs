use std::ops::Deref;
use std::sync::Arc;

use ota_core::{Bundle, Platform};
use serde::{Deserialize, Serialize};

/// The platform + channel partition a resolution reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleScope {
    pub platform: Platform,
    pub channel: String,
}

impl BundleScope {
    pub fn new(platform: Platform, channel: impl Into<String>) -> Self {
        Self {
            platform,
            channel: channel.into(),
        }
    }

    pub fn admits(&self, bundle: &Bundle) -> bool {
        bundle.platform == self.platform && bundle.channel == self.channel
    }
}

/// An immutable view of every bundle in one scope at one point in time.
///
/// Disabled bundles are included; narrowing happens in the resolver.
/// Bundles are ordered by id descending. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleSnapshot {
    bundles: Arc<[Bundle]>,
}

impl BundleSnapshot {
    /// Build a snapshot, sorting `bundles` by id descending.
    pub fn new(mut bundles: Vec<Bundle>) -> Self {
        bundles.sort_by(|a, b| b.id.cmp(&a.id));
        Self {
            bundles: bundles.into(),
        }
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }
}

impl Deref for BundleSnapshot {
    type Target = [Bundle];

    fn deref(&self) -> &[Bundle] {
        &self.bundles
    }
}

impl FromIterator<Bundle> for BundleSnapshot {
    fn from_iter<T: IntoIterator<Item = Bundle>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Admin listing filter. Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleFilter {
    pub platform: Option<Platform>,
    pub channel: Option<String>,
    pub enabled: Option<bool>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl BundleFilter {
    pub fn admits(&self, bundle: &Bundle) -> bool {
        self.platform.map_or(true, |p| p == bundle.platform)
            && self.channel.as_deref().map_or(true, |c| c == bundle.channel)
            && self.enabled.map_or(true, |e| e == bundle.enabled)
    }

    /// Apply the filter plus pagination to bundles already sorted by id descending.
    pub(crate) fn page<'a, I>(&self, bundles: I) -> BundlePage
    where
        I: IntoIterator<Item = &'a Bundle>,
    {
        let matching: Vec<&Bundle> = bundles.into_iter().filter(|b| self.admits(b)).collect();
        let total = matching.len();
        let data = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        BundlePage { data, total }
    }
}

/// One page of an admin listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundlePage {
    pub data: Vec<Bundle>,
    /// Number of bundles matching the filter, ignoring pagination.
    pub total: usize,
}
