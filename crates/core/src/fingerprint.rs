//! Native fingerprint compatibility.
//!
//! A full fingerprint is 40 hex characters. The first 20 identify the native
//! surface that decides OTA compatibility; the last 20 only affect build
//! caching. Two builds with equal OTA halves can run the same bundles.

const FULL_LEN: usize = 40;
const HALF_LEN: usize = 20;

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `true` for a 40-character hex fingerprint.
pub fn is_valid_full(fingerprint: &str) -> bool {
    is_hex(fingerprint, FULL_LEN)
}

/// `true` for a 20-character hex OTA half.
pub fn is_valid_half(fingerprint: &str) -> bool {
    is_hex(fingerprint, HALF_LEN)
}

/// The OTA half of a full fingerprint.
pub fn ota_half(fingerprint: &str) -> Option<&str> {
    is_valid_full(fingerprint).then(|| &fingerprint[..HALF_LEN])
}

/// The caching half of a full fingerprint.
pub fn caching_half(fingerprint: &str) -> Option<&str> {
    is_valid_full(fingerprint).then(|| &fingerprint[HALF_LEN..])
}

/// Whether two full fingerprints can share OTA bundles.
///
/// Anything other than two valid full fingerprints is incompatible.
pub fn compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.and_then(ota_half), b.and_then(ota_half)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Key a fingerprint is compared under during resolution.
///
/// Full fingerprints reduce to their OTA half, a bare half is used as is,
/// and anything else is compared verbatim.
pub fn ota_key(fingerprint: &str) -> &str {
    ota_half(fingerprint).unwrap_or(fingerprint)
}

/// Whether a bundle's `fingerprintHash` serves a device reporting `device`.
///
/// Empty values never match.
pub fn matches(bundle: &str, device: &str) -> bool {
    let (bundle, device) = (bundle.trim(), device.trim());
    if bundle.is_empty() || device.is_empty() {
        return false;
    }
    ota_key(bundle).eq_ignore_ascii_case(ota_key(device))
}
