//! `ota resolve` (local store) and `ota check` (running server).

use std::process;

use ota_core::{BundleId, UpdateInfo, UpdateQuery, UpdateStatus, UpdateStrategy};
use ota_eval::{ResolutionEngine, UpdateResponse};

use super::QueryArgs;
use crate::config::StoreLocator;
use crate::{print_json, report_error, OutputFormat};

fn query_or_exit(args: &QueryArgs, output: OutputFormat, quiet: bool) -> UpdateQuery {
    match args.to_query() {
        Ok(q) => q,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) async fn cmd_resolve(store: &str, args: &QueryArgs, output: OutputFormat, quiet: bool) {
    let query = query_or_exit(args, output, quiet);

    let store = match store
        .parse::<StoreLocator>()
        .and_then(|locator| locator.open(false).map_err(|e| e.to_string()))
    {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let engine = ResolutionEngine::new(store);
    match engine.resolve(&query).await {
        Ok(info) => match output {
            OutputFormat::Json => print_json(&info),
            OutputFormat::Text => println!("{}", describe_info(info.as_ref())),
        },
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn cmd_check(endpoint: &str, args: &QueryArgs, output: OutputFormat, quiet: bool) {
    let query = query_or_exit(args, output, quiet);
    let url = format!("{}{}", endpoint.trim_end_matches('/'), update_path(&query));

    let agent = ureq::Agent::new_with_defaults();
    let response = match agent.get(&url).call() {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("error: update check against {} failed: {}", endpoint, e), output, quiet);
            process::exit(1);
        }
    };
    let decision: Option<UpdateResponse> = match response.into_body().read_json() {
        Ok(d) => d,
        Err(e) => {
            report_error(&format!("error: could not parse server response: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&decision),
        OutputFormat::Text => println!("{}", describe_response(decision.as_ref())),
    }
}

/// Path transport for `query`:
/// `/app-version|fingerprint/{platform}/{target}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]`.
pub(crate) fn update_path(query: &UpdateQuery) -> String {
    let (kind, target) = match &query.strategy {
        UpdateStrategy::AppVersion(version) => ("app-version", version),
        UpdateStrategy::Fingerprint(hash) => ("fingerprint", hash),
    };
    let mut path = format!(
        "/{}/{}/{}/{}/{}/{}",
        kind,
        query.platform,
        encode_segment(target),
        encode_segment(&query.channel),
        query.min_bundle_id,
        query.bundle_id
    );
    if let Some(device) = &query.device_id {
        path.push('/');
        path.push_str(&encode_segment(device));
    }
    path
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn describe(id: BundleId, status: UpdateStatus, force: bool, location: Option<&str>) -> String {
    let forced = if force { " (forced)" } else { "" };
    match (status, id.is_nil()) {
        (UpdateStatus::Rollback, true) => format!("ROLLBACK to built-in bundle{}", forced),
        (UpdateStatus::Rollback, false) => format!(
            "ROLLBACK to {}{}\n  file: {}",
            id,
            forced,
            location.unwrap_or("-")
        ),
        (UpdateStatus::Update, _) => format!(
            "UPDATE to {}{}\n  file: {}",
            id,
            forced,
            location.unwrap_or("-")
        ),
    }
}

fn describe_info(info: Option<&UpdateInfo>) -> String {
    match info {
        None => "no update".to_string(),
        Some(i) => describe(i.id, i.status, i.should_force_update, i.storage_uri.as_deref()),
    }
}

fn describe_response(response: Option<&UpdateResponse>) -> String {
    match response {
        None => "no update".to_string(),
        Some(r) => describe(r.id, r.status, r.should_force_update, r.file_url.as_deref()),
    }
}
