use ota_core::{BundleError, BundleId};

/// All errors that can be returned by a BundleStore implementation.
///
/// A failed commit leaves the store exactly as it was before the commit.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An insert named an id that already exists.
    #[error("bundle already exists: {id}")]
    DuplicateBundle { id: BundleId },

    /// An update or delete named an id that does not exist.
    #[error("bundle not found: {id}")]
    BundleNotFound { id: BundleId },

    /// An inserted or updated bundle failed structural validation.
    #[error("invalid bundle: {0}")]
    InvalidBundle(#[from] BundleError),

    /// The stored document or a stored column could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend-specific storage error (I/O, DB connection, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Backend(format!("storage task failed: {err}"))
    }
}
