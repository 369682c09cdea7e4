//! Mapping a bundle's `storageUri` to the `fileUrl` handed to devices.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use time::{Duration, OffsetDateTime};

/// Default lifetime of a signed download URL.
pub const DEFAULT_URL_TTL: Duration = Duration::seconds(60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileUrlError {
    #[error("storage uri '{0}' has no object key")]
    InvalidStorageUri(String),

    #[error("url lifetime {ttl} from {now} is out of range")]
    ExpiryOutOfRange { now: OffsetDateTime, ttl: Duration },

    #[error("signed url expired at {expires}")]
    Expired { expires: i64 },

    #[error("signed url signature is invalid")]
    BadSignature,
}

/// Turns a stored locator into a URL a device can download from.
pub trait FileUrlResolver: Send + Sync {
    fn file_url(&self, storage_uri: &str) -> Result<String, FileUrlError>;
}

/// Hands the storage URI out unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl FileUrlResolver for PassthroughResolver {
    fn file_url(&self, storage_uri: &str) -> Result<String, FileUrlError> {
        Ok(storage_uri.to_string())
    }
}

/// Issues short-lived Ed25519-signed URLs of the form
/// `<base>/<key>?expires=<unix seconds>&signature=<base64url>`.
///
/// The key is the storage URI with its `scheme://` prefix removed. The
/// signed message is `<key>\n<expires>`.
pub struct SignedUrlResolver {
    signing_key: SigningKey,
    base_url: String,
    ttl: Duration,
}

impl SignedUrlResolver {
    pub fn new(signing_key: SigningKey, base_url: impl Into<String>) -> Self {
        Self {
            signing_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl: DEFAULT_URL_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `storage_uri` as of `now`.
    pub fn file_url_at(&self, storage_uri: &str, now: OffsetDateTime) -> Result<String, FileUrlError> {
        let key = object_key(storage_uri)?;
        let expires = now
            .checked_add(self.ttl)
            .ok_or(FileUrlError::ExpiryOutOfRange { now, ttl: self.ttl })?
            .unix_timestamp();
        let signature = self.signing_key.sign(&signed_message(key, expires));
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            key,
            expires,
            BASE64URL.encode(signature.to_bytes())
        ))
    }
}

impl FileUrlResolver for SignedUrlResolver {
    fn file_url(&self, storage_uri: &str) -> Result<String, FileUrlError> {
        self.file_url_at(storage_uri, OffsetDateTime::now_utc())
    }
}

/// Check a signed URL's parts on the download side.
pub fn verify(
    verifying_key: &VerifyingKey,
    key: &str,
    expires: i64,
    signature: &str,
    now: OffsetDateTime,
) -> Result<(), FileUrlError> {
    let bytes = BASE64URL
        .decode(signature)
        .map_err(|_| FileUrlError::BadSignature)?;
    let signature = Signature::from_slice(&bytes).map_err(|_| FileUrlError::BadSignature)?;
    verifying_key
        .verify(&signed_message(key, expires), &signature)
        .map_err(|_| FileUrlError::BadSignature)?;
    if now.unix_timestamp() > expires {
        return Err(FileUrlError::Expired { expires });
    }
    Ok(())
}

fn object_key(storage_uri: &str) -> Result<&str, FileUrlError> {
    let key = storage_uri
        .split_once("://")
        .map_or(storage_uri, |(_, rest)| rest)
        .trim_start_matches('/');
    if key.is_empty() {
        return Err(FileUrlError::InvalidStorageUri(storage_uri.to_string()));
    }
    Ok(key)
}

fn signed_message(key: &str, expires: i64) -> Vec<u8> {
    format!("{key}\n{expires}").into_bytes()
}
