//! `ota fingerprint` -- split a native fingerprint into its halves.

use ota_core::fingerprint;
use serde::Serialize;

use crate::{print_json, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintReport<'a> {
    fingerprint: &'a str,
    valid_full: bool,
    valid_half: bool,
    ota_half: Option<&'a str>,
    caching_half: Option<&'a str>,
    ota_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    compatible_with: Option<Compatibility<'a>>,
}

#[derive(Debug, Serialize)]
struct Compatibility<'a> {
    other: &'a str,
    compatible: bool,
    matches: bool,
}

fn report<'a>(hash: &'a str, compare: Option<&'a str>) -> FingerprintReport<'a> {
    let hash = hash.trim();
    FingerprintReport {
        fingerprint: hash,
        valid_full: fingerprint::is_valid_full(hash),
        valid_half: fingerprint::is_valid_half(hash),
        ota_half: fingerprint::ota_half(hash),
        caching_half: fingerprint::caching_half(hash),
        ota_key: fingerprint::ota_key(hash),
        compatible_with: compare.map(str::trim).map(|other| Compatibility {
            other,
            compatible: fingerprint::compatible(Some(hash), Some(other)),
            matches: fingerprint::matches(hash, other),
        }),
    }
}

pub(crate) fn cmd_fingerprint(hash: &str, compare: Option<&str>, output: OutputFormat) {
    let report = report(hash, compare);
    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            let kind = if report.valid_full {
                "full fingerprint"
            } else if report.valid_half {
                "OTA half"
            } else {
                "opaque hash (exact match only)"
            };
            println!("{}: {}", report.fingerprint, kind);
            println!("  ota half:     {}", report.ota_half.unwrap_or("-"));
            println!("  caching half: {}", report.caching_half.unwrap_or("-"));
            if let Some(c) = &report.compatible_with {
                println!(
                    "  vs {}: {}",
                    c.other,
                    if c.matches { "shares bundles" } else { "does not share bundles" }
                );
            }
        }
    }
}
