//! `ota serve` configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file named
//! by `--config`, `OTA_*` environment variables, command-line flags.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::Args;
use ota_eval::{FileUrlResolver, PassthroughResolver, SignedUrlResolver};
use ota_storage::{BundleStore, CachingStore, JsonFileStore, MemoryStore, SqliteStore, StorageError};
use serde::Deserialize;

use crate::trust::keygen::read_secret_key;

pub(crate) const DEFAULT_PORT: u16 = 8080;
pub(crate) const DEFAULT_URL_TTL_SECS: u64 = 60;
/// Longest signed URL lifetime accepted: seven days.
pub(crate) const MAX_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

// ── Store locator ──────────────────────────────────────────────────

/// Where bundles live: `memory`, `json:<path>`, `sqlite:<path>` or
/// `sqlite::memory:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreLocator {
    Memory,
    Json(PathBuf),
    Sqlite(PathBuf),
    SqliteMemory,
}

impl FromStr for StoreLocator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "memory" {
            return Ok(Self::Memory);
        }
        if s == "sqlite::memory:" {
            return Ok(Self::SqliteMemory);
        }
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid store '{s}': expected memory, json:<path> or sqlite:<path>"))?;
        if path.is_empty() {
            return Err(format!("invalid store '{s}': missing path"));
        }
        match kind {
            "json" => Ok(Self::Json(PathBuf::from(path))),
            "sqlite" => Ok(Self::Sqlite(PathBuf::from(path))),
            other => Err(format!("unknown store kind '{other}'")),
        }
    }
}

impl fmt::Display for StoreLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Json(path) => write!(f, "json:{}", path.display()),
            Self::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
            Self::SqliteMemory => f.write_str("sqlite::memory:"),
        }
    }
}

impl StoreLocator {
    /// Open the backend, optionally behind a snapshot cache.
    pub(crate) fn open(&self, cache: bool) -> Result<Arc<dyn BundleStore>, StorageError> {
        let store: Arc<dyn BundleStore> = match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::Json(path) => Arc::new(JsonFileStore::new(path)),
            Self::Sqlite(path) => Arc::new(SqliteStore::open(path)?),
            Self::SqliteMemory => Arc::new(SqliteStore::in_memory()?),
        };
        if cache {
            Ok(Arc::new(CachingStore::new(store)))
        } else {
            Ok(store)
        }
    }
}

// ── Serve configuration ────────────────────────────────────────────

/// Flags accepted by `ota serve`. Unset flags fall through to the
/// environment, the config file, then defaults.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct ServeArgs {
    /// Path to a TOML config file
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Port to listen on [default: 8080]
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Bundle store: memory, json:<path>, sqlite:<path>, sqlite::memory:
    #[arg(long)]
    pub(crate) store: Option<String>,
    /// Ed25519 secret key file used to sign download URLs
    #[arg(long)]
    pub(crate) signing_key: Option<PathBuf>,
    /// Base URL signed download links point at
    #[arg(long)]
    pub(crate) public_base_url: Option<String>,
    /// Lifetime of signed download URLs in seconds [default: 60]
    #[arg(long)]
    pub(crate) url_ttl_secs: Option<u64>,
    /// Cache scope snapshots in memory
    #[arg(long)]
    pub(crate) cache: bool,
    /// Per-IP request limit per minute on update checks
    #[arg(long)]
    pub(crate) rate_limit: Option<u64>,
    /// Path to TLS certificate PEM file (requires --tls-key)
    #[arg(long)]
    pub(crate) tls_cert: Option<PathBuf>,
    /// Path to TLS private key PEM file (requires --tls-cert)
    #[arg(long)]
    pub(crate) tls_key: Option<PathBuf>,
}

/// The `ota.toml` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    port: Option<u16>,
    store: Option<String>,
    signing_key: Option<PathBuf>,
    public_base_url: Option<String>,
    url_ttl_secs: Option<u64>,
    cache: Option<bool>,
    rate_limit: Option<u64>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("error parsing config '{}': {}", path.display(), e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServeConfig {
    pub(crate) port: u16,
    pub(crate) store: StoreLocator,
    pub(crate) signing_key: Option<PathBuf>,
    pub(crate) public_base_url: Option<String>,
    pub(crate) url_ttl_secs: u64,
    pub(crate) cache: bool,
    pub(crate) rate_limit: Option<u64>,
    pub(crate) tls_cert: Option<PathBuf>,
    pub(crate) tls_key: Option<PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreLocator::Memory,
            signing_key: None,
            public_base_url: None,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            cache: false,
            rate_limit: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl ServeConfig {
    /// Layer file, process environment and flags over the defaults.
    pub(crate) fn load(args: &ServeArgs) -> Result<Self, String> {
        Self::layered(args, |key| std::env::var(key).ok())
    }

    fn layered(args: &ServeArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(path) = &args.config {
            config.apply_file(FileConfig::read(path)?)?;
        }
        config.apply_env(&env)?;
        config.apply_args(args)?;
        config.check()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), String> {
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(store) = file.store {
            self.store = store.parse()?;
        }
        if file.signing_key.is_some() {
            self.signing_key = file.signing_key;
        }
        if file.public_base_url.is_some() {
            self.public_base_url = file.public_base_url;
        }
        if let Some(ttl) = file.url_ttl_secs {
            self.url_ttl_secs = ttl;
        }
        if let Some(cache) = file.cache {
            self.cache = cache;
        }
        if file.rate_limit.is_some() {
            self.rate_limit = file.rate_limit;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), String> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("OTA_PORT") {
            self.port = parse_env("OTA_PORT", &port)?;
        }
        if let Some(store) = var("OTA_STORE") {
            self.store = store.parse()?;
        }
        if let Some(key) = var("OTA_SIGNING_KEY") {
            self.signing_key = Some(PathBuf::from(key));
        }
        if let Some(url) = var("OTA_PUBLIC_BASE_URL") {
            self.public_base_url = Some(url);
        }
        if let Some(ttl) = var("OTA_URL_TTL_SECS") {
            self.url_ttl_secs = parse_env("OTA_URL_TTL_SECS", &ttl)?;
        }
        if let Some(cache) = var("OTA_CACHE") {
            self.cache = parse_flag("OTA_CACHE", &cache)?;
        }
        if let Some(limit) = var("OTA_RATE_LIMIT") {
            self.rate_limit = Some(parse_env("OTA_RATE_LIMIT", &limit)?);
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &ServeArgs) -> Result<(), String> {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(store) = &args.store {
            self.store = store.parse()?;
        }
        if args.signing_key.is_some() {
            self.signing_key = args.signing_key.clone();
        }
        if args.public_base_url.is_some() {
            self.public_base_url = args.public_base_url.clone();
        }
        if let Some(ttl) = args.url_ttl_secs {
            self.url_ttl_secs = ttl;
        }
        if args.cache {
            self.cache = true;
        }
        if args.rate_limit.is_some() {
            self.rate_limit = args.rate_limit;
        }
        self.tls_cert = args.tls_cert.clone();
        self.tls_key = args.tls_key.clone();
        Ok(())
    }

    fn check(&self) -> Result<(), String> {
        if self.signing_key.is_some() != self.public_base_url.is_some() {
            return Err("--signing-key and --public-base-url must be given together".into());
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err("--tls-cert and --tls-key must both be provided".into());
        }
        if self.url_ttl_secs > MAX_URL_TTL_SECS {
            return Err(format!(
                "url ttl {}s exceeds the maximum of {}s",
                self.url_ttl_secs, MAX_URL_TTL_SECS
            ));
        }
        if self.rate_limit == Some(0) {
            return Err("rate limit must be at least 1 request per minute".into());
        }
        Ok(())
    }

    /// The resolver that turns `storageUri` into the `fileUrl` sent to devices.
    pub(crate) fn file_urls(&self) -> Result<Arc<dyn FileUrlResolver>, String> {
        match (&self.signing_key, &self.public_base_url) {
            (Some(key_path), Some(base_url)) => {
                let key = read_secret_key(key_path)?;
                let ttl = i64::try_from(self.url_ttl_secs)
                    .map_err(|_| format!("url ttl {} is too large", self.url_ttl_secs))?;
                Ok(Arc::new(
                    SignedUrlResolver::new(key, base_url.as_str()).with_ttl(time::Duration::seconds(ttl)),
                ))
            }
            _ => Ok(Arc::new(PassthroughResolver)),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, String>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("invalid {key} '{value}': {e}"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid {key} '{value}': expected true or false")),
    }
}
