use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use ota_core::{Bundle, BundleId, ChangeSet};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::apply::{self, BundleMap};
use crate::error::StorageError;
use crate::scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};
use crate::traits::BundleStore;

/// Store backed by one JSON document: an array of bundles.
///
/// Every read loads the whole document; every commit writes a fresh
/// temporary file next to it and renames it into place, so a reader sees
/// either the old or the new document. Commits to the same file from one
/// process are serialized across every handle opened on it. Commits from
/// separate processes sharing the file are last-writer-wins: one writer's
/// changeset can be lost, but never half-applied.
///
/// A missing file is an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

/// Per-file commit locks shared by all handles in the process.
fn commit_lock(key: PathBuf) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Canonical location of the document. The directory must exist.
    fn lock_key(&self) -> Result<PathBuf, StorageError> {
        let dir = std::fs::canonicalize(self.dir())?;
        match self.path.file_name() {
            Some(name) => Ok(dir.join(name)),
            None => Err(StorageError::Backend(format!(
                "{} is not a file path",
                self.path.display()
            ))),
        }
    }

    async fn load(&self) -> Result<BundleMap, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BundleMap::new()),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        let bundles: Vec<Bundle> = serde_json::from_slice(&bytes)?;
        Ok(apply::from_bundles(bundles))
    }

    async fn save(&self, state: &BundleMap) -> Result<(), StorageError> {
        let bundles: Vec<&Bundle> = state.values().rev().collect();
        let bytes = serde_json::to_vec_pretty(&bundles)?;
        let dir = self.dir().to_path_buf();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&dir, &path, &bytes))
            .await
            .map_err(|e| StorageError::Backend(format!("json writer task failed: {e}")))?
    }
}

fn replace_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        StorageError::Backend(format!("failed to create temp file in {}: {e}", dir.display()))
    })?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| {
            StorageError::Backend(format!("failed to write {}: {e}", tmp.path().display()))
        })?;
    tmp.persist(path).map_err(|e| {
        StorageError::Backend(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

#[async_trait]
impl BundleStore for JsonFileStore {
    async fn snapshot(&self, scope: &BundleScope) -> Result<BundleSnapshot, StorageError> {
        Ok(apply::snapshot(&self.load().await?, scope))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let count = changes.len();
        tokio::fs::create_dir_all(self.dir()).await?;
        let lock = commit_lock(self.lock_key()?);
        let _guard = lock.lock().await;
        let current = self.load().await?;
        let next = apply::apply(&current, changes)?;
        self.save(&next).await?;
        tracing::info!(
            changes = count,
            path = %self.path.display(),
            "committed changeset to json store"
        );
        Ok(())
    }

    async fn get_bundle(&self, id: BundleId) -> Result<Option<Bundle>, StorageError> {
        Ok(self.load().await?.remove(&id))
    }

    async fn list_bundles(&self, filter: &BundleFilter) -> Result<BundlePage, StorageError> {
        Ok(apply::page(&self.load().await?, filter))
    }

    async fn channels(&self) -> Result<Vec<String>, StorageError> {
        Ok(apply::channels(&self.load().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_core::Platform;
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("bundles.json"));
        let snapshot = store
            .snapshot(&BundleScope::new(Platform::Ios, "production"))
            .await
            .unwrap();
        assert!(snapshot.is_empty());
        assert!(store.channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_writes_readable_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bundles.json");
        let store = JsonFileStore::new(&path);
        let bundle = Bundle::for_app_version(BundleId::generate(), Platform::Android, "1.x.x", "s3://b/1");
        store.commit(ChangeSet::new().insert(bundle.clone())).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["targetAppVersion"], "1.x.x");
        assert_eq!(raw[0]["platform"], "android");

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get_bundle(bundle.id).await.unwrap(), Some(bundle));
    }

    fn insert_fresh(n: usize) -> (ChangeSet, Vec<BundleId>) {
        let bundles: Vec<Bundle> = (0..n)
            .map(|_| Bundle::for_app_version(BundleId::generate(), Platform::Ios, "*", "s3://b/x"))
            .collect();
        let ids = bundles.iter().map(|b| b.id).collect();
        (bundles.into_iter().fold(ChangeSet::new(), ChangeSet::insert), ids)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handles_on_one_file_keep_every_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.json");
        let a = Arc::new(JsonFileStore::new(&path));
        let b = Arc::new(JsonFileStore::new(dir.path().join(".").join("bundles.json")));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            for store in [a.clone(), b.clone()] {
                tasks.push(tokio::spawn(async move {
                    let (changes, _) = insert_fresh(10);
                    store.commit(changes).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let page = JsonFileStore::new(&path)
            .list_bundles(&BundleFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rejected_commit_on_one_handle_stays_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.json");
        let a = JsonFileStore::new(&path);
        let b = JsonFileStore::new(&path);

        let (seed, seeded) = insert_fresh(1);
        a.commit(seed).await.unwrap();
        let existing = a.get_bundle(seeded[0]).await.unwrap().unwrap();

        for _ in 0..25 {
            let (good, good_ids) = insert_fresh(20);
            let (bad, bad_ids) = insert_fresh(20);
            let bad = bad.insert(existing.clone());

            let (ok, rejected) = tokio::join!(a.commit(good), b.commit(bad));
            assert!(ok.is_ok());
            assert!(matches!(rejected, Err(StorageError::DuplicateBundle { .. })));

            for id in good_ids {
                assert!(b.get_bundle(id).await.unwrap().is_some());
            }
            for id in bad_ids {
                assert!(a.get_bundle(id).await.unwrap().is_none());
            }
        }
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonFileStore::new(&path).channels().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
