//! Cache storage seam: named generations of request-key → response pairs.
//!
//! [`CacheStorage`] stands in for the browser's `caches` global and
//! [`Store`] for a single opened cache. [`MemoryStorage`] is the in-memory
//! implementation used by tests and by anything that does not need
//! persistence; [`DirStorage`](super::DirStorage) persists to disk.
//!
//! Handles are cheap to clone and share state, so two controller instances
//! (old and new version) can operate on the same storage.

use super::request::Response;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// The set of cache generations, keyed by name.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Store: Store;

    /// Open a generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Store, StorageError>;

    /// Open a generation only if it exists. Never creates one.
    async fn open_existing(&self, name: &str) -> Result<Option<Self::Store>, StorageError>;

    /// Delete a generation. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Names of all existing generations.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Record `name` as the generation of the active controller.
    async fn set_active(&self, name: &str) -> Result<(), StorageError>;

    /// The generation recorded by the last activation, if any.
    async fn active(&self) -> Result<Option<String>, StorageError>;
}

/// One opened generation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<Response>, StorageError>;

    /// Store a response, replacing any previous value for the key.
    async fn put(&self, key: &str, response: Response) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory cache storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    generations: Arc<RwLock<BTreeMap<String, MemoryStore>>>,
    active: Arc<RwLock<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    type Store = MemoryStore;

    async fn open(&self, name: &str) -> Result<MemoryStore, StorageError> {
        let mut generations = self.generations.write().await;
        Ok(generations.entry(name.to_string()).or_default().clone())
    }

    async fn open_existing(&self, name: &str) -> Result<Option<MemoryStore>, StorageError> {
        Ok(self.generations.read().await.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.generations.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }

    async fn set_active(&self, name: &str) -> Result<(), StorageError> {
        *self.active.write().await = Some(name.to_string());
        Ok(())
    }

    async fn active(&self) -> Result<Option<String>, StorageError> {
        Ok(self.active.read().await.clone())
    }
}

/// In-memory generation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Response>>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn lookup(&self, key: &str) -> Result<Option<Response>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: Response) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
