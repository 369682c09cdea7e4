use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};

/// Paths of a freshly written key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairFiles {
    pub secret: PathBuf,
    pub public: PathBuf,
}

/// Generate an Ed25519 URL-signing key pair and write it next to `prefix`.
///
/// Writes `<prefix>.secret` (base64 32-byte seed, mode 0o600 on Unix) and
/// `<prefix>.pub` (base64 32-byte verifying key). Existing files are
/// refused rather than overwritten.
pub fn write_keypair(prefix: &Path) -> Result<(KeyPairFiles, VerifyingKey), String> {
    let files = KeyPairFiles {
        secret: with_suffix(prefix, "secret"),
        public: with_suffix(prefix, "pub"),
    };
    for path in [&files.secret, &files.public] {
        if path.exists() {
            return Err(format!("refusing to overwrite '{}'", path.display()));
        }
    }

    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let verifying_key = signing_key.verifying_key();

    std::fs::write(&files.secret, BASE64.encode(signing_key.to_bytes()))
        .map_err(|e| format!("error writing secret key to '{}': {}", files.secret.display(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(&files.secret, perms) {
            tracing::warn!(path = %files.secret.display(), error = %e, "could not restrict secret key permissions");
        }
    }

    std::fs::write(&files.public, BASE64.encode(verifying_key.to_bytes()))
        .map_err(|e| format!("error writing public key to '{}': {}", files.public.display(), e))?;

    Ok((files, verifying_key))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Read a secret key file: a base64-encoded 32-byte Ed25519 seed.
pub fn read_secret_key(path: &Path) -> Result<SigningKey, String> {
    let key_bytes = read_key_bytes(path, "secret")?;
    Ok(SigningKey::from_bytes(&key_bytes))
}

/// Read a public key file: a base64-encoded 32-byte Ed25519 verifying key.
pub fn read_public_key(path: &Path) -> Result<VerifyingKey, String> {
    let key_bytes = read_key_bytes(path, "public")?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| format!("invalid public key material in '{}': {}", path.display(), e))
}

fn read_key_bytes(path: &Path, kind: &str) -> Result<[u8; 32], String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading {} key '{}': {}", kind, path.display(), e))?;
    let bytes = BASE64
        .decode(contents.trim())
        .map_err(|e| format!("error decoding {} key '{}': {}", kind, path.display(), e))?;
    bytes.try_into().map_err(|_| {
        format!(
            "invalid {} key length in '{}': expected 32 bytes",
            kind,
            path.display()
        )
    })
}

/// Short hex id of a verifying key (its first 8 bytes), for logs.
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    key.to_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
