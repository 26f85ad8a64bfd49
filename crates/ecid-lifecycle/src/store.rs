//! Visitor-record persistence
//!
//! The manager persists at most one record. Whatever the backing medium, a
//! failed decode on retrieve is treated as "nothing stored" rather than an
//! error so that a corrupt file can never wedge initialization.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ecid_core::{Error, Result, VisitorRecord};
use tracing::{debug, warn};

/// Storage for the single current visitor record
#[async_trait]
pub trait VisitorStore: Send + Sync {
    /// Persist `record`, replacing whatever was stored before
    async fn save(&self, record: &VisitorRecord) -> Result<()>;

    /// The stored record, or `None` when nothing usable is stored
    async fn retrieve(&self) -> Option<VisitorRecord>;

    /// Remove the stored record; removing nothing is not an error
    async fn delete(&self) -> Result<()>;
}

/// File-backed store keeping the record as a single JSON document.
///
/// Writes go through a sibling temp file and a rename so a crash mid-write
/// leaves either the old record or the new one, never a torn file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }

    async fn write_atomically(path: &Path, tmp: &Path, bytes: Vec<u8>) -> std::io::Result<()> {
        tokio::fs::write(tmp, bytes).await?;
        tokio::fs::rename(tmp, path).await
    }
}

#[async_trait]
impl VisitorStore for FileStore {
    async fn save(&self, record: &VisitorRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        Self::write_atomically(&self.path, &self.tmp_path(), bytes)
            .await
            .map_err(|err| Error::storage(format!("write {}: {err}", self.path.display())))
    }

    async fn retrieve(&self) -> Option<VisitorRecord> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read stored visitor record");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "stored visitor record is unreadable; ignoring it");
                None
            }
        }
    }

    async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "deleted stored visitor record");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::storage(format!(
                "delete {}: {err}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory store, mostly for tests and hosts that handle persistence
/// themselves
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<VisitorRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<VisitorRecord>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VisitorStore for MemoryStore {
    async fn save(&self, record: &VisitorRecord) -> Result<()> {
        *self.lock() = Some(record.clone());
        Ok(())
    }

    async fn retrieve(&self) -> Option<VisitorRecord> {
        self.lock().clone()
    }

    async fn delete(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VisitorRecord {
        let mut record = VisitorRecord::new("12345");
        record.dcs_region = Some("6".to_string());
        record
    }

    #[tokio::test]
    async fn file_store_round_trips_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("visitor.json"));

        assert!(store.retrieve().await.is_none());
        store.save(&record()).await.unwrap();
        assert_eq!(store.retrieve().await, Some(record()));
    }

    #[tokio::test]
    async fn file_store_save_replaces_the_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("visitor.json"));

        store.save(&record()).await.unwrap();
        store.save(&VisitorRecord::new("67890")).await.unwrap();
        assert_eq!(
            store.retrieve().await.map(|r| r.experience_cloud_id),
            Some("67890".to_string())
        );
    }

    #[tokio::test]
    async fn file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("visitor.json"));

        store.delete().await.unwrap();
        store.save(&record()).await.unwrap();
        store.delete().await.unwrap();
        assert!(store.retrieve().await.is_none());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_nothing_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visitor.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(store.retrieve().await.is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trips_a_record() {
        let store = MemoryStore::new();
        store.save(&record()).await.unwrap();
        assert_eq!(store.retrieve().await, Some(record()));
        store.delete().await.unwrap();
        assert!(store.retrieve().await.is_none());
    }
}
