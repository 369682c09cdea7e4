//! Device-reported version coercion.
//!
//! Native app versions arrive in whatever shape the platform reports:
//! `"1.0"`, `"2"`, `"v1.2.3"`, `"1.2.3 (45)"`, `"1.2.3-beta"`. Before any
//! range comparison they are coerced to a canonical `major.minor.patch`
//! the same way npm's `semver.coerce` does: take the first run of up to
//! three dot-separated numbers, default missing components to 0, drop
//! everything else.

use semver::Version;

/// Coerce `input` to `major.minor.patch`, or `None` when it contains no number.
pub fn coerce(input: &str) -> Option<Version> {
    let start = input.bytes().position(|b| b.is_ascii_digit())?;
    let mut rest = &input[start..];
    let mut parts = [0u64; 3];

    for (i, slot) in parts.iter_mut().enumerate() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        *slot = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        if i == 2 {
            break;
        }
        match rest.strip_prefix('.') {
            Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
            _ => break,
        }
    }

    Some(Version::new(parts[0], parts[1], parts[2]))
}
