//! Narrow a scope snapshot to the bundles a query may be offered.

use ota_core::{fingerprint, Bundle, BundleTarget, UpdateQuery, UpdateStrategy, VersionRange};

/// Bundles in `bundles` that are enabled, in the query's platform and
/// channel, at or above the floor, and whose target admits the device.
///
/// Bundles with a malformed target are skipped with a warning; a malformed
/// device version or fingerprint simply matches nothing.
pub fn narrow<'a>(query: &UpdateQuery, bundles: &'a [Bundle]) -> Vec<&'a Bundle> {
    bundles
        .iter()
        .filter(|b| {
            b.enabled
                && b.platform == query.platform
                && b.channel == query.channel
                && b.id >= query.min_bundle_id
        })
        .filter(|b| target_admits(b, &query.strategy))
        .collect()
}

fn target_admits(bundle: &Bundle, strategy: &UpdateStrategy) -> bool {
    let Some(target) = bundle.target() else {
        tracing::warn!(bundle = %bundle.id, "skipping bundle without exactly one target");
        return false;
    };

    match (target, strategy) {
        (BundleTarget::AppVersion(range), UpdateStrategy::AppVersion(version)) => {
            match VersionRange::parse(range) {
                Ok(range) => range.matches_device(version),
                Err(e) => {
                    tracing::warn!(bundle = %bundle.id, error = %e, "skipping bundle with malformed targetAppVersion");
                    false
                }
            }
        }
        (BundleTarget::Fingerprint(hash), UpdateStrategy::Fingerprint(device)) => {
            fingerprint::matches(hash, device)
        }
        _ => false,
    }
}
