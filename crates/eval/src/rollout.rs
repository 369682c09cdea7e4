//! Deterministic rollout gating.
//!
//! A device is offered a partially rolled-out bundle when its bucket for
//! that bundle falls under the rollout percentage. The bucket hashes the
//! device id together with the bundle id, so a device lands in a fresh
//! bucket for every release instead of being a permanent early adopter.

use ota_core::{Bundle, BundleId};
use sha2::{Digest, Sha256};

/// Bucket in `0..100` for a device and bundle.
///
/// `SHA-256(device_id || 0x00 || bundle_id bytes)`, first 8 bytes big-endian,
/// modulo 100. Stable across calls, processes and platforms.
pub fn bucket(device_id: &str, bundle_id: BundleId) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(bundle_id.as_uuid().as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 100) as u8
}

/// Whether `device_id` may be offered `bundle` as an update.
///
/// A non-empty device allowlist decides alone. Otherwise 100% admits every
/// device, 0% admits none, and anything between compares the bucket.
pub fn is_eligible(bundle: &Bundle, device_id: &str) -> bool {
    if let Some(allowlist) = bundle.device_allowlist() {
        return allowlist.iter().any(|d| d == device_id);
    }
    match bundle.rollout_percentage {
        p if p >= 100 => true,
        0 => false,
        p => bucket(device_id, bundle.id) < p,
    }
}
