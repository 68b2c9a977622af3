//! Local mirror of server data and offline bookkeeping.
//!
//! Snapshots are stored as JSON under string keys. The typed [`LocalMirror`]
//! facade never fails: a missing or unreadable value reads as `None` and a
//! failed write is logged and dropped, so the app keeps working when local
//! storage is full or corrupt.
//!
//! # Key Space
//!
//! - `omnipa-shopping-lists`: array of list summaries
//! - `omnipa-shopping-list-<id>`: one list with its items
//! - `omnipa-pending-changes`: the pending-change queue
//! - `omnipa-last-sync`: epoch millis of the last successful sync
//! - `omnipa-dead-letter`: changes abandoned after too many failed replays

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::lock;
use crate::models::RecordId;

/// Errors from a raw key-value store.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("I/O error for {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("Failed to encode value for {0}: {1}")]
    Encode(String, #[source] serde_json::Error),

    #[error("Failed to decode value for {0}: {1}")]
    Decode(String, #[source] serde_json::Error),
}

/// Raw string storage behind the mirror.
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` if the key is absent.
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError>;
    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError>;
    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), MirrorError>;
}

/// Stores each key as `<data_dir>/<encoded key>.json`.
#[derive(Clone, Debug)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the file path used for a key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let path = self.path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MirrorError::Io(path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| MirrorError::Io(self.data_dir.clone(), e))?;

        let path = self.path(key);

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        let mut file =
            File::create(&temp_path).map_err(|e| MirrorError::Io(temp_path.clone(), e))?;
        file.write_all(value.as_bytes())
            .map_err(|e| MirrorError::Io(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| MirrorError::Io(temp_path.clone(), e))?;

        fs::rename(&temp_path, &path).map_err(|e| MirrorError::Io(path, e))
    }

    fn delete(&self, key: &str) -> Result<(), MirrorError> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MirrorError::Io(path, e)),
        }
    }
}

/// In-process store, used by tests and by clients without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), MirrorError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Logical keys of the local mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirrorKey {
    ShoppingLists,
    ListDetail(RecordId),
    PendingChanges,
    LastSync,
    DeadLetter,
}

impl MirrorKey {
    /// Returns the storage key string.
    pub fn storage_key(&self) -> String {
        match self {
            MirrorKey::ShoppingLists => "omnipa-shopping-lists".to_string(),
            MirrorKey::ListDetail(id) => format!("omnipa-shopping-list-{}", id),
            MirrorKey::PendingChanges => "omnipa-pending-changes".to_string(),
            MirrorKey::LastSync => "omnipa-last-sync".to_string(),
            MirrorKey::DeadLetter => "omnipa-dead-letter".to_string(),
        }
    }
}

/// Typed, failure-tolerant access to the key-value store.
#[derive(Clone)]
pub struct LocalMirror {
    store: Arc<dyn KeyValueStore>,
}

impl LocalMirror {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads and decodes a value. Missing keys and decode failures read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &MirrorKey) -> Option<T> {
        self.try_get(key).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable mirror entry: {}", e);
            None
        })
    }

    /// Encodes and stores a value. Failures are logged, never returned.
    pub fn set<T: Serialize>(&self, key: &MirrorKey, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            tracing::warn!("Failed to write mirror entry: {}", e);
        }
    }

    /// Deletes a key. Absent keys are a no-op.
    pub fn remove(&self, key: &MirrorKey) {
        if let Err(e) = self.store.delete(&key.storage_key()) {
            tracing::warn!("Failed to remove mirror entry: {}", e);
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key: &MirrorKey) -> Result<Option<T>, MirrorError> {
        let storage_key = key.storage_key();
        match self.store.read(&storage_key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| MirrorError::Decode(storage_key, e)),
            None => Ok(None),
        }
    }

    fn try_set<T: Serialize>(&self, key: &MirrorKey, value: &T) -> Result<(), MirrorError> {
        let storage_key = key.storage_key();
        let json =
            serde_json::to_string(value).map_err(|e| MirrorError::Encode(storage_key.clone(), e))?;
        self.store.write(&storage_key, &json)
    }
}

impl std::fmt::Debug for LocalMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMirror").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShoppingList;
    use chrono::Utc;
    use tempfile::TempDir;

    fn file_mirror() -> (LocalMirror, FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("mirror"));
        let mirror = LocalMirror::new(Arc::new(store.clone()));
        (mirror, store, temp_dir)
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(MirrorKey::ShoppingLists.storage_key(), "omnipa-shopping-lists");
        assert_eq!(
            MirrorKey::ListDetail(RecordId::server("abc")).storage_key(),
            "omnipa-shopping-list-abc"
        );
        assert_eq!(MirrorKey::PendingChanges.storage_key(), "omnipa-pending-changes");
        assert_eq!(MirrorKey::LastSync.storage_key(), "omnipa-last-sync");
    }

    #[test]
    fn test_get_missing_returns_none() {
        let (mirror, _store, _temp) = file_mirror();
        let value: Option<Vec<ShoppingList>> = mirror.get(&MirrorKey::ShoppingLists);
        assert!(value.is_none());
    }

    #[test]
    fn test_set_creates_directory_and_get_reads_back() {
        let (mirror, store, _temp) = file_mirror();
        let lists = vec![ShoppingList::new(RecordId::server("l1"), "Groceries", Utc::now())];

        mirror.set(&MirrorKey::ShoppingLists, &lists);

        assert!(store.data_dir().exists());
        let loaded: Vec<ShoppingList> = mirror.get(&MirrorKey::ShoppingLists).unwrap();
        assert_eq!(loaded, lists);
    }

    #[test]
    fn test_corrupt_json_reads_as_none() {
        let (mirror, store, _temp) = file_mirror();
        store.write("omnipa-last-sync", "{not json").unwrap();

        let value: Option<i64> = mirror.get(&MirrorKey::LastSync);
        assert!(value.is_none());
    }

    #[test]
    fn test_write_replaces_file_without_leaving_temp() {
        let (mirror, store, _temp) = file_mirror();
        mirror.set(&MirrorKey::LastSync, &1_i64);
        mirror.set(&MirrorKey::LastSync, &2_i64);

        let path = store.path("omnipa-last-sync");
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(mirror.get::<i64>(&MirrorKey::LastSync), Some(2));
    }

    #[test]
    fn test_interrupted_write_keeps_previous_value() {
        let (mirror, store, _temp) = file_mirror();
        mirror.set(&MirrorKey::LastSync, &7_i64);

        // A write cut short before the rename leaves only a torn temp file
        let path = store.path("omnipa-last-sync");
        fs::write(path.with_extension("json.tmp"), "{\"trunc").unwrap();

        assert_eq!(store.read("omnipa-last-sync").unwrap().as_deref(), Some("7"));
        assert_eq!(mirror.get::<i64>(&MirrorKey::LastSync), Some(7));
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let (mirror, _store, _temp) = file_mirror();
        mirror.remove(&MirrorKey::DeadLetter);
        mirror.set(&MirrorKey::LastSync, &5_i64);
        mirror.remove(&MirrorKey::LastSync);
        mirror.remove(&MirrorKey::LastSync);
        assert!(mirror.get::<i64>(&MirrorKey::LastSync).is_none());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the data directory should be makes every write fail
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, "x").unwrap();
        let mirror = LocalMirror::new(Arc::new(FileStore::new(blocker)));

        mirror.set(&MirrorKey::LastSync, &1_i64);
        assert!(mirror.get::<i64>(&MirrorKey::LastSync).is_none());
    }

    #[test]
    fn test_provisional_list_key_is_file_safe() {
        let (mirror, store, _temp) = file_mirror();
        let key = MirrorKey::ListDetail(RecordId::new_local());
        mirror.set(&key, &1_i64);

        let path = store.path(&key.storage_key());
        assert!(path.exists());
        assert!(!path.file_name().unwrap().to_string_lossy().contains(':'));
    }

    #[test]
    fn test_memory_store() {
        let mirror = LocalMirror::new(Arc::new(MemoryStore::new()));
        mirror.set(&MirrorKey::LastSync, &42_i64);
        assert_eq!(mirror.get::<i64>(&MirrorKey::LastSync), Some(42));
        mirror.remove(&MirrorKey::LastSync);
        assert_eq!(mirror.get::<i64>(&MirrorKey::LastSync), None);
    }
}
