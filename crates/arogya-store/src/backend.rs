//! Durable string key/value backends
//!
//! Models the profile-local storage the records live in: opaque string
//! values under namespaced string keys. Concurrent writers follow
//! last-writer-wins; there is no cross-process locking.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::{Result, StoreError};

/// Storage seam so the store doesn't care where values live.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory backend for tests and ephemeral profiles.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

/// File-backed backend: one JSON object on disk, rewritten atomically
/// (temp file + rename) on every mutation.
pub struct FileBackend {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileBackend {
    /// Open or create the storage file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let data = fs::read_to_string(&path)?;
            match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("storage file unreadable, starting empty: {err}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        info!("opened record storage ({})", path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Open using the default path (~/.arogya/records.json)
    pub fn open_default() -> Result<Self> {
        let path = dirs::home_dir()
            .ok_or(StoreError::NoHomeDir)?
            .join(".arogya")
            .join("records.json");
        Self::open(path)
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_string(entries)?)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        self.persist(&entries)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.set("arogya.profile", "{\"age\":34}").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(
            backend.get("arogya.profile").unwrap().as_deref(),
            Some("{\"age\":34}")
        );
    }

    #[test]
    fn test_file_backend_remove_and_keys() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("records.json")).unwrap();

        backend.set("arogya.a", "1").unwrap();
        backend.set("arogya.b", "2").unwrap();
        backend.remove("arogya.a").unwrap();

        assert_eq!(backend.get("arogya.a").unwrap(), None);
        assert_eq!(backend.keys().unwrap(), vec!["arogya.b".to_string()]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "not json at all").unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_backend_roundtrip() {
        let backend = InMemoryBackend::new();
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v"));
        backend.remove("k").unwrap();
        assert_eq!(backend.get("k").unwrap(), None);
    }
}
