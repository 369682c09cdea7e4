//! `ota bundles` -- admin actions against a bundle store. Every write is
//! exactly one changeset.

use std::process;
use std::sync::Arc;

use clap::{Args, Subcommand};
use ota_core::{Bundle, BundleId, BundleTarget, ChangeSet, Platform};
use ota_storage::{BundleFilter, BundleStore};

use crate::config::StoreLocator;
use crate::{print_json, report_error, OutputFormat};

#[derive(Debug, Subcommand)]
pub(crate) enum BundlesCommand {
    /// List bundles, newest first
    List {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        /// Only enabled (true) or disabled (false) bundles
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one bundle as JSON
    Show { id: String },
    /// Publish a new bundle
    Deploy(DeployArgs),
    /// Change the administrative fields of a bundle
    Update(UpdateArgs),
    /// Delete a bundle
    Delete { id: String },
}

#[derive(Debug, Args)]
pub(crate) struct DeployArgs {
    /// Target platform (ios or android)
    #[arg(long)]
    platform: String,
    /// App-version range the bundle targets, e.g. "1.x.x"
    #[arg(long, required_unless_present = "fingerprint", conflicts_with = "fingerprint")]
    target_app_version: Option<String>,
    /// Native fingerprint the bundle targets
    #[arg(long)]
    fingerprint: Option<String>,
    /// Where the bundle payload is stored
    #[arg(long)]
    storage_uri: String,
    #[arg(long, default_value = ota_core::DEFAULT_CHANNEL)]
    channel: String,
    #[arg(long)]
    message: Option<String>,
    /// Require the device to apply the update immediately
    #[arg(long)]
    force_update: bool,
    /// Percentage of devices offered the bundle
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
    rollout: u8,
    /// Publish disabled
    #[arg(long)]
    disabled: bool,
    #[arg(long)]
    file_hash: Option<String>,
    #[arg(long)]
    git_commit_hash: Option<String>,
    /// Restrict to these device ids (repeatable)
    #[arg(long = "target-device")]
    target_devices: Vec<String>,
    /// Use this id instead of generating one
    #[arg(long)]
    id: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct UpdateArgs {
    id: String,
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
    #[arg(long)]
    force_update: Option<bool>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    rollout: Option<u8>,
    #[arg(long)]
    message: Option<String>,
    /// Replace the device allowlist (repeatable)
    #[arg(long = "target-device", conflicts_with = "clear_target_devices")]
    target_devices: Vec<String>,
    /// Remove the device allowlist
    #[arg(long)]
    clear_target_devices: bool,
}

fn fail(msg: impl std::fmt::Display, output: OutputFormat, quiet: bool) -> ! {
    report_error(&format!("error: {}", msg), output, quiet);
    process::exit(1);
}

pub(crate) async fn cmd_bundles(
    store: &str,
    command: BundlesCommand,
    output: OutputFormat,
    quiet: bool,
) {
    let store = match store
        .parse::<StoreLocator>()
        .and_then(|locator| locator.open(false).map_err(|e| e.to_string()))
    {
        Ok(s) => s,
        Err(e) => fail(e, output, quiet),
    };
    if let Err(e) = run(store, command, output, quiet).await {
        fail(e, output, quiet);
    }
}

async fn run(
    store: Arc<dyn BundleStore>,
    command: BundlesCommand,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    match command {
        BundlesCommand::List {
            platform,
            channel,
            enabled,
            limit,
            offset,
        } => {
            let platform = platform
                .as_deref()
                .map(str::parse::<Platform>)
                .transpose()
                .map_err(|e| e.to_string())?;
            let filter = BundleFilter {
                platform,
                channel,
                enabled,
                limit: Some(limit),
                offset,
            };
            let page = store.list_bundles(&filter).await.map_err(|e| e.to_string())?;
            match output {
                OutputFormat::Json => print_json(&page),
                OutputFormat::Text => {
                    for bundle in &page.data {
                        println!("{}", summary_line(bundle));
                    }
                    if !quiet {
                        println!(
                            "{} of {} bundle(s) shown",
                            page.data.len(),
                            page.total
                        );
                    }
                }
            }
        }
        BundlesCommand::Show { id } => {
            let bundle = find(store.as_ref(), &id).await?;
            print_json(&bundle);
        }
        BundlesCommand::Deploy(args) => {
            let bundle = deploy_bundle(args)?;
            let id = bundle.id;
            store
                .commit(ChangeSet::new().insert(bundle))
                .await
                .map_err(|e| e.to_string())?;
            confirm(output, quiet, "deployed", id);
        }
        BundlesCommand::Update(args) => {
            let current = find(store.as_ref(), &args.id).await?;
            let updated = apply_update(current, &args);
            let id = updated.id;
            store
                .commit(ChangeSet::new().update(updated))
                .await
                .map_err(|e| e.to_string())?;
            confirm(output, quiet, "updated", id);
        }
        BundlesCommand::Delete { id } => {
            let bundle = find(store.as_ref(), &id).await?;
            let id = bundle.id;
            store
                .commit(ChangeSet::new().delete(bundle))
                .await
                .map_err(|e| e.to_string())?;
            confirm(output, quiet, "deleted", id);
        }
    }
    Ok(())
}

async fn find(store: &dyn BundleStore, id: &str) -> Result<Bundle, String> {
    let id: BundleId = id
        .parse()
        .map_err(|_| format!("invalid bundle id '{}'", id))?;
    store
        .get_bundle(id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("bundle {} not found", id))
}

fn confirm(output: OutputFormat, quiet: bool, action: &str, id: BundleId) {
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "id": id, "action": action })),
        OutputFormat::Text if !quiet => println!("{} bundle {}", action, id),
        OutputFormat::Text => {}
    }
}

fn summary_line(bundle: &Bundle) -> String {
    let target = match bundle.target() {
        Some(BundleTarget::AppVersion(range)) => format!("app {}", range),
        Some(BundleTarget::Fingerprint(hash)) => format!("fp {}", hash),
        None => "invalid target".to_string(),
    };
    format!(
        "{}  {:<7}  {:<12}  {:<24}  {:<8}  {:>3}%",
        bundle.id,
        bundle.platform,
        bundle.channel,
        target,
        if bundle.enabled { "enabled" } else { "disabled" },
        bundle.rollout_percentage
    )
}

fn deploy_bundle(args: DeployArgs) -> Result<Bundle, String> {
    let platform: Platform = args.platform.parse().map_err(|e: ota_core::QueryError| e.to_string())?;
    let id = match &args.id {
        Some(id) => id
            .parse()
            .map_err(|_| format!("invalid bundle id '{}'", id))?,
        None => BundleId::generate(),
    };

    let mut bundle = match (args.target_app_version, args.fingerprint) {
        (Some(range), None) => Bundle::for_app_version(id, platform, range, args.storage_uri),
        (None, Some(hash)) => Bundle::for_fingerprint(id, platform, hash, args.storage_uri),
        _ => return Err("give exactly one of --target-app-version or --fingerprint".into()),
    };
    bundle = bundle
        .with_channel(args.channel)
        .with_enabled(!args.disabled)
        .with_force_update(args.force_update)
        .with_rollout(args.rollout);
    if let Some(message) = args.message {
        bundle = bundle.with_message(message);
    }
    if let Some(hash) = args.file_hash {
        bundle = bundle.with_file_hash(hash);
    }
    if !args.target_devices.is_empty() {
        bundle = bundle.with_target_devices(args.target_devices);
    }
    bundle.git_commit_hash = args.git_commit_hash;

    bundle.validate().map_err(|e| e.to_string())?;
    Ok(bundle)
}

fn apply_update(mut bundle: Bundle, args: &UpdateArgs) -> Bundle {
    if args.enable {
        bundle.enabled = true;
    }
    if args.disable {
        bundle.enabled = false;
    }
    if let Some(force) = args.force_update {
        bundle.should_force_update = force;
    }
    if let Some(rollout) = args.rollout {
        bundle.rollout_percentage = rollout;
    }
    if let Some(message) = &args.message {
        bundle.message = Some(message.clone());
    }
    if args.clear_target_devices {
        bundle.target_device_ids = None;
    } else if !args.target_devices.is_empty() {
        bundle.target_device_ids = Some(args.target_devices.clone());
    }
    bundle
}
