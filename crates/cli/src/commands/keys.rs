//! `ota keygen` and `ota verify-url`.

use std::path::Path;
use std::process;

use ota_eval::file_url;

use crate::trust::keygen::{key_fingerprint, read_public_key, write_keypair};
use crate::{print_json, report_error, OutputFormat};

pub(crate) fn cmd_keygen(prefix: &Path, output: OutputFormat, quiet: bool) {
    match write_keypair(prefix) {
        Ok((files, verifying_key)) => match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "secret": files.secret,
                "public": files.public,
                "fingerprint": key_fingerprint(&verifying_key),
            })),
            OutputFormat::Text => {
                if !quiet {
                    println!(
                        "Generated Ed25519 keypair: {}, {} (key {})",
                        files.secret.display(),
                        files.public.display(),
                        key_fingerprint(&verifying_key)
                    );
                }
            }
        },
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Split `<base>/<key>?expires=<n>&signature=<sig>` into its signed parts.
///
/// `key` is everything after the scheme and host.
fn signed_parts(url: &str) -> Result<(String, i64, String), String> {
    let (location, query) = url
        .split_once('?')
        .ok_or_else(|| "url has no query string".to_string())?;
    let path = location
        .split_once("://")
        .map_or(location, |(_, rest)| rest);
    let key = path
        .split_once('/')
        .map(|(_, key)| key)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| "url has no object key".to_string())?;

    let mut expires = None;
    let mut signature = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", v)) => {
                expires = Some(v.parse::<i64>().map_err(|_| format!("invalid expires '{}'", v))?)
            }
            Some(("signature", v)) => signature = Some(v.to_string()),
            _ => {}
        }
    }
    match (expires, signature) {
        (Some(expires), Some(signature)) => Ok((key.to_string(), expires, signature)),
        _ => Err("url is missing expires or signature".into()),
    }
}

pub(crate) fn cmd_verify_url(url: &str, public_key: &Path, output: OutputFormat, quiet: bool) {
    let result = read_public_key(public_key).and_then(|key| {
        let (object, expires, signature) = signed_parts(url)?;
        file_url::verify(&key, &object, expires, &signature, time::OffsetDateTime::now_utc())
            .map_err(|e| e.to_string())?;
        Ok((object, expires))
    });

    match result {
        Ok((object, expires)) => match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "valid": true,
                "key": object,
                "expires": expires,
            })),
            OutputFormat::Text => {
                if !quiet {
                    println!("valid: {} (expires at {})", object, expires);
                }
            }
        },
        Err(e) => {
            report_error(&format!("invalid: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_of_a_signed_url() {
        let (key, expires, signature) =
            signed_parts("https://cdn.example.com/bucket/app/b.zip?expires=1735689660&signature=abc_-")
                .unwrap();
        assert_eq!(key, "bucket/app/b.zip");
        assert_eq!(expires, 1735689660);
        assert_eq!(signature, "abc_-");
    }

    #[test]
    fn incomplete_urls_are_rejected() {
        assert!(signed_parts("https://cdn.example.com/b.zip").is_err());
        assert!(signed_parts("https://cdn.example.com/b.zip?expires=1").is_err());
        assert!(signed_parts("https://cdn.example.com?expires=1&signature=x").is_err());
        assert!(signed_parts("https://cdn.example.com/b.zip?expires=soon&signature=x").is_err());
    }
}
