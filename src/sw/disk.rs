//! On-disk cache storage.
//!
//! Used by the `folio sw` commands so that install, activate and fetch can
//! run as separate invocations against the same generations.
//!
//! # Layout
//!
//! ```text
//! .folio-cache/
//! ├── folio-v1.0.0/
//! │   ├── index.json          # key → status, headers, body digest
//! │   └── bodies/
//! │       ├── 3f2a…           # SHA-256 of the body bytes
//! │       └── 9c41…
//! ├── folio-v1.0.1/
//! │   └── …
//! └── ACTIVE                  # name of the activated generation
//! ```
//!
//! Bodies are **content-addressed**: two keys with identical bodies (`/` and
//! `/index.html`) share one file. A generation exists once its directory has
//! an `index.json`. An index that cannot be parsed, or carries another format
//! version, is treated as an empty generation.
//!
//! Handles hold no copy of the index: `lookup` and `keys` read it from disk.
//! `put` reloads it under the storage's write lock, inserts its one key and
//! renames a fresh file into place, so writers through one storage resolve
//! per key, last writer wins.

use super::request::Response;
use super::storage::{CacheStorage, StorageError, Store};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Name of the index file within a generation directory.
const INDEX_FILENAME: &str = "index.json";

/// Bump to invalidate every stored generation when the index format changes.
const INDEX_VERSION: u32 = 1;

const BODIES_DIR: &str = "bodies";

/// File at the storage root naming the activated generation.
const ACTIVE_FILENAME: &str = "ACTIVE";

/// One stored response, minus its body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredEntry {
    status: u16,
    headers: BTreeMap<String, String>,
    body_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationIndex {
    version: u32,
    entries: BTreeMap<String, StoredEntry>,
}

impl GenerationIndex {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }

    fn load(dir: &Path) -> Self {
        let content = match fs::read_to_string(dir.join(INDEX_FILENAME)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(index) if index.version == INDEX_VERSION => index,
            _ => {
                tracing::warn!(dir = %dir.display(), "discarding unreadable cache index");
                Self::empty()
            }
        }
    }

    fn save(&self, dir: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = dir.join(format!("{INDEX_FILENAME}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(tmp, dir.join(INDEX_FILENAME))?;
        Ok(())
    }
}

/// SHA-256 of a body, returned as a hex string.
fn hash_body(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}

/// Cache storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
    /// Serializes index rewrites across every store opened from this storage.
    write_lock: Arc<Mutex<()>>,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store(&self, dir: PathBuf) -> DirStore {
        DirStore {
            dir,
            write_lock: Arc::clone(&self.write_lock),
        }
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DirStorage {
    type Store = DirStore;

    async fn open(&self, name: &str) -> Result<DirStore, StorageError> {
        let dir = self.generation_dir(name)?;
        fs::create_dir_all(dir.join(BODIES_DIR))?;
        if !dir.join(INDEX_FILENAME).exists() {
            let _guard = self.write_lock.lock().await;
            GenerationIndex::empty().save(&dir)?;
        }
        Ok(self.store(dir))
    }

    async fn open_existing(&self, name: &str) -> Result<Option<DirStore>, StorageError> {
        let dir = self.generation_dir(name)?;
        if !dir.join(INDEX_FILENAME).is_file() {
            return Ok(None);
        }
        Ok(Some(self.store(dir)))
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.generation_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().join(INDEX_FILENAME).is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn set_active(&self, name: &str) -> Result<(), StorageError> {
        self.generation_dir(name)?;
        fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!("{ACTIVE_FILENAME}.tmp"));
        fs::write(&tmp, name)?;
        fs::rename(tmp, self.root.join(ACTIVE_FILENAME))?;
        Ok(())
    }

    async fn active(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.root.join(ACTIVE_FILENAME)) {
            Ok(name) => {
                let name = name.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One generation directory.
#[derive(Debug)]
pub struct DirStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DirStore {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn body_path(&self, hash: &str) -> PathBuf {
        self.dir.join(BODIES_DIR).join(hash)
    }
}

#[async_trait]
impl Store for DirStore {
    async fn lookup(&self, key: &str) -> Result<Option<Response>, StorageError> {
        let entry = match GenerationIndex::load(&self.dir).entries.remove(key) {
            Some(e) => e,
            None => return Ok(None),
        };
        let body = match fs::read(self.body_path(&entry.body_hash)) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(key, "cached body missing on disk, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Response {
            status: entry.status,
            headers: entry.headers,
            body,
        }))
    }

    async fn put(&self, key: &str, response: Response) -> Result<(), StorageError> {
        let body_hash = hash_body(&response.body);
        let body_path = self.body_path(&body_hash);
        if !body_path.exists() {
            fs::write(&body_path, &response.body)?;
        }

        let _guard = self.write_lock.lock().await;
        let mut index = GenerationIndex::load(&self.dir);
        index.entries.insert(
            key.to_string(),
            StoredEntry {
                status: response.status,
                headers: response.headers,
                body_hash,
            },
        );
        index.save(&self.dir)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(GenerationIndex::load(&self.dir).entries.into_keys().collect())
    }
}
