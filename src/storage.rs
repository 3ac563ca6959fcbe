// src/storage.rs
//! Durable string key-value storage for visitor eligibility records.
//!
//! Keys are namespaced per visitor through [`ScopedStorage`], so one backing
//! store can hold the records of every visitor.
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage lock poisoned")]
    Poisoned,

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("storage disabled")]
    Disabled,
}

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Storage that refuses every operation, standing in for a blocked backing store.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStorage;

#[async_trait]
impl KeyValueStorage for DisabledStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Disabled)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Disabled)
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Disabled)
    }
}

/// JSON file holding every entry; rewritten in full on each change.
///
/// Writes go through `tokio::fs`, so they run on the blocking pool. The async
/// lock is held across the write to keep file contents in change order.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: tokio::sync::Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened visitor storage");

        Ok(Self {
            path,
            entries: tokio::sync::Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(entries)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

/// View of a shared storage where every key is prefixed with `"{scope}:"`.
#[derive(Clone)]
pub struct ScopedStorage {
    inner: Arc<dyn KeyValueStorage>,
    prefix: String,
}

impl ScopedStorage {
    pub fn new(inner: Arc<dyn KeyValueStorage>, scope: impl fmt::Display) -> Self {
        Self {
            inner,
            prefix: format!("{scope}:"),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl KeyValueStorage for ScopedStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(&self.scoped(key), value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(&self.scoped(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("visitors.json");

        let storage = FileStorage::open(&path).await.unwrap();
        storage.set("a", "1").await.unwrap();
        storage.set("b", "2").await.unwrap();
        storage.remove("a").await.unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn file_is_written_as_compact_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visitors.json");

        let storage = FileStorage::open(&path).await.unwrap();
        storage.set("v:keci_poll_voted", "{\"choice\":1}").await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains('\n'));
        assert_eq!(written, r#"{"v:keci_poll_voted":"{\"choice\":1}"}"#);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn concurrent_writes_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visitors.json");
        let storage = Arc::new(FileStorage::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                storage.set(&format!("k{i}"), "x").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reopened = FileStorage::open(&path).await.unwrap();
        for i in 0..20 {
            assert_eq!(reopened.get(&format!("k{i}")).await.unwrap().as_deref(), Some("x"));
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visitors.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            FileStorage::open(&path).await,
            Err(StorageError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn scopes_do_not_collide() {
        let shared: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let alice = ScopedStorage::new(shared.clone(), "alice");
        let bob = ScopedStorage::new(shared.clone(), "bob");

        alice.set("k", "a").await.unwrap();
        assert_eq!(bob.get("k").await.unwrap(), None);
        assert_eq!(shared.get("alice:k").await.unwrap().as_deref(), Some("a"));
    }
}
