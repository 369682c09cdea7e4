use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ota_core::{Bundle, BundleId, ChangeOperation, ChangeSet, Platform};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};
use crate::traits::BundleStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bundles (
    id                  TEXT PRIMARY KEY,
    platform            TEXT NOT NULL,
    channel             TEXT NOT NULL DEFAULT 'production',
    enabled             INTEGER NOT NULL,
    should_force_update INTEGER NOT NULL,
    target_app_version  TEXT,
    fingerprint_hash    TEXT,
    rollout_percentage  INTEGER NOT NULL DEFAULT 100,
    target_device_ids   TEXT,
    storage_uri         TEXT NOT NULL,
    message             TEXT,
    metadata            TEXT,
    file_hash           TEXT,
    git_commit_hash     TEXT
);
CREATE INDEX IF NOT EXISTS bundles_scope ON bundles (platform, channel, id);
";

const COLUMNS: &str = "id, platform, channel, enabled, should_force_update, target_app_version, \
     fingerprint_hash, rollout_percentage, target_device_ids, storage_uri, message, metadata, \
     file_hash, git_commit_hash";

/// SQLite-backed store.
///
/// Each changeset runs in one transaction; a failing entry rolls the whole
/// transaction back. Ids are stored as lowercase hyphenated text, whose
/// lexical order matches [`BundleId`] order.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let connection = Connection::open(path)?;
        connection.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(connection)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> Result<Self, StorageError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&connection)?;
            f(&mut guard)
        })
        .await?
    }
}

fn lock(connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    connection
        .lock()
        .map_err(|_| StorageError::Backend("sqlite connection mutex poisoned".to_string()))
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: usize,
) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(column)?
        .map(|text| serde_json::from_str(&text).map_err(|e| conversion_error(column, e)))
        .transpose()
}

fn row_to_bundle(row: &Row<'_>) -> rusqlite::Result<Bundle> {
    let id: String = row.get(0)?;
    let platform: String = row.get(1)?;
    Ok(Bundle {
        id: id.parse().map_err(|e| conversion_error(0, e))?,
        platform: platform
            .parse::<Platform>()
            .map_err(|e| conversion_error(1, e))?,
        channel: row.get(2)?,
        enabled: row.get(3)?,
        should_force_update: row.get(4)?,
        target_app_version: row.get(5)?,
        fingerprint_hash: row.get(6)?,
        rollout_percentage: row.get(7)?,
        target_device_ids: json_column(row, 8)?,
        storage_uri: row.get(9)?,
        message: row.get(10)?,
        metadata: json_column(row, 11)?,
        file_hash: row.get(12)?,
        git_commit_hash: row.get(13)?,
    })
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, StorageError> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

// ── Changeset application ────────────────────────────────────────────────────

fn insert(tx: &rusqlite::Transaction<'_>, bundle: &Bundle) -> Result<(), StorageError> {
    let result = tx.execute(
        &format!(
            "INSERT INTO bundles ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            bundle.id.to_string(),
            bundle.platform.as_str(),
            bundle.channel,
            bundle.enabled,
            bundle.should_force_update,
            bundle.target_app_version,
            bundle.fingerprint_hash,
            bundle.rollout_percentage,
            to_json(bundle.target_device_ids.as_ref())?,
            bundle.storage_uri,
            bundle.message,
            to_json(bundle.metadata.as_ref())?,
            bundle.file_hash,
            bundle.git_commit_hash,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(StorageError::DuplicateBundle { id: bundle.id })
        }
        Err(e) => Err(e.into()),
    }
}

fn update(tx: &rusqlite::Transaction<'_>, bundle: &Bundle) -> Result<(), StorageError> {
    let rows = tx.execute(
        "UPDATE bundles SET platform = ?2, channel = ?3, enabled = ?4, should_force_update = ?5, \
         target_app_version = ?6, fingerprint_hash = ?7, rollout_percentage = ?8, \
         target_device_ids = ?9, storage_uri = ?10, message = ?11, metadata = ?12, \
         file_hash = ?13, git_commit_hash = ?14 WHERE id = ?1",
        params![
            bundle.id.to_string(),
            bundle.platform.as_str(),
            bundle.channel,
            bundle.enabled,
            bundle.should_force_update,
            bundle.target_app_version,
            bundle.fingerprint_hash,
            bundle.rollout_percentage,
            to_json(bundle.target_device_ids.as_ref())?,
            bundle.storage_uri,
            bundle.message,
            to_json(bundle.metadata.as_ref())?,
            bundle.file_hash,
            bundle.git_commit_hash,
        ],
    )?;
    if rows == 0 {
        return Err(StorageError::BundleNotFound { id: bundle.id });
    }
    Ok(())
}

fn delete(tx: &rusqlite::Transaction<'_>, id: BundleId) -> Result<(), StorageError> {
    let rows = tx.execute("DELETE FROM bundles WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(StorageError::BundleNotFound { id });
    }
    Ok(())
}

fn apply_changes(connection: &mut Connection, changes: &ChangeSet) -> Result<(), StorageError> {
    let tx = connection.transaction()?;
    for change in changes {
        match change.operation {
            ChangeOperation::Insert => {
                change.bundle.validate()?;
                insert(&tx, &change.bundle)?;
            }
            ChangeOperation::Update => {
                change.bundle.validate()?;
                update(&tx, &change.bundle)?;
            }
            ChangeOperation::Delete => delete(&tx, change.bundle.id)?,
        }
    }
    tx.commit()?;
    Ok(())
}

// ── BundleStore ──────────────────────────────────────────────────────────────

#[async_trait]
impl BundleStore for SqliteStore {
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError> {
        let platform = scope.platform;
        let channel = scope.channel.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLUMNS} FROM bundles WHERE platform = ?1 AND channel = ?2 \
                 ORDER BY id DESC"
            ))?;
            let bundles = stmt
                .query_map(params![platform.as_str(), channel], row_to_bundle)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BundleSnapshot::new(bundles))
        })
        .await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let count = changes.len();
        self.with_connection(move |conn| apply_changes(conn, &changes))
            .await?;
        tracing::info!(changes = count, "committed changeset to sqlite store");
        Ok(())
    }

    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError> {
        self.with_connection(move |conn| {
            let bundle = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM bundles WHERE id = ?1"),
                    params![id.to_string()],
                    row_to_bundle,
                )
                .optional()?;
            Ok(bundle)
        })
        .await
    }

    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let platform = filter.platform.map(|p| p.as_str());
            let predicate = "(?1 IS NULL OR platform = ?1) AND (?2 IS NULL OR channel = ?2) \
                             AND (?3 IS NULL OR enabled = ?3)";

            let total: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM bundles WHERE {predicate}"),
                params![platform, filter.channel, filter.enabled],
                |row| row.get(0),
            )?;

            let limit = filter
                .limit
                .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
            let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
            let mut stmt = tx.prepare(&format!(
                "SELECT {COLUMNS} FROM bundles WHERE {predicate} \
                 ORDER BY id DESC LIMIT ?4 OFFSET ?5"
            ))?;
            let data = stmt
                .query_map(
                    params![platform, filter.channel, filter.enabled, limit, offset],
                    row_to_bundle,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            tx.commit()?;

            Ok(BundlePage {
                data,
                total: usize::try_from(total).unwrap_or(0),
            })
        })
        .await
    }

    async fn channels(&self) -> Result<Vec<String>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT channel FROM bundles ORDER BY channel")?;
            let channels = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(channels)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_optional_json_columns() {
        let store = SqliteStore::in_memory().unwrap();
        let mut bundle =
            Bundle::for_fingerprint(BundleId::generate(), Platform::Ios, "abc", "r2://x")
                .with_target_devices(["device-a", "device-b"])
                .with_message("hello");
        bundle.metadata = Some(serde_json::json!({"app_version": "1.0.0"}));

        store.commit(ChangeSet::new().insert(bundle.clone())).await.unwrap();
        assert_eq!(store.get_bundle(bundle.id).await.unwrap(), Some(bundle));
    }

    #[tokio::test]
    async fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ota.db");
        let bundle = Bundle::for_app_version(BundleId::generate(), Platform::Android, "*", "s3://x");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.commit(ChangeSet::new().insert(bundle.clone())).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get_bundle(bundle.id).await.unwrap(), Some(bundle));
    }
}
