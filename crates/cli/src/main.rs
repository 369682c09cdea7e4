mod commands;
mod config;
mod serve;
mod trust;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::bundles::BundlesCommand;
use crate::commands::QueryArgs;
use crate::config::{ServeArgs, ServeConfig};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Over-the-air bundle update server and tooling.
#[derive(Parser)]
#[command(name = "ota", version, about = "Over-the-air bundle update server and tooling")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the update HTTP server
    Serve(ServeArgs),

    /// Resolve one update query against a local bundle store
    Resolve {
        /// Bundle store: memory, json:<path>, sqlite:<path>
        #[arg(long)]
        store: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Ask a running server whether a device has an update
    Check {
        /// Server base URL, e.g. http://localhost:8080
        #[arg(long)]
        endpoint: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Inspect and publish bundles
    Bundles {
        /// Bundle store: json:<path> or sqlite:<path> [env: OTA_STORE]
        #[arg(long, global = true)]
        store: Option<String>,
        #[command(subcommand)]
        command: BundlesCommand,
    },

    /// Generate an Ed25519 key pair for signing download URLs
    Keygen {
        /// Output path prefix; writes <prefix>.secret and <prefix>.pub
        #[arg(long, default_value = "ota")]
        out: PathBuf,
    },

    /// Check a signed download URL against a public key
    VerifyUrl {
        /// The signed URL
        url: String,
        /// Public key file written by `ota keygen`
        #[arg(long)]
        public_key: PathBuf,
    },

    /// Show the OTA and caching halves of a native fingerprint
    Fingerprint {
        /// Fingerprint hash
        hash: String,
        /// Second fingerprint to test for OTA compatibility
        #[arg(long)]
        compare: Option<String>,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "ota=info,tower_http=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Serve(args) => {
            let config = match ServeConfig::load(&args) {
                Ok(c) => c,
                Err(e) => {
                    report_error(&format!("error: {}", e), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = runtime(cli.output, cli.quiet);
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Resolve { store, query } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::resolve::cmd_resolve(&store, &query, cli.output, cli.quiet));
        }
        Commands::Check { endpoint, query } => {
            commands::resolve::cmd_check(&endpoint, &query, cli.output, cli.quiet);
        }
        Commands::Bundles { store, command } => {
            let Some(store) = store.or_else(|| std::env::var("OTA_STORE").ok()) else {
                report_error("error: --store or OTA_STORE is required", cli.output, cli.quiet);
                process::exit(1);
            };
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::bundles::cmd_bundles(&store, command, cli.output, cli.quiet));
        }
        Commands::Keygen { out } => {
            commands::keys::cmd_keygen(&out, cli.output, cli.quiet);
        }
        Commands::VerifyUrl { url, public_key } => {
            commands::keys::cmd_verify_url(&url, &public_key, cli.output, cli.quiet);
        }
        Commands::Fingerprint { hash, compare } => {
            commands::fingerprint::cmd_fingerprint(&hash, compare.as_deref(), cli.output);
        }
    }
}

/// Print an error to stderr in the selected format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print a value to stdout as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("serialization error: {}", e),
    }
}
