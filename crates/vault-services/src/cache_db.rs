//! `CacheDB` — the durable key → cache-entry table backing `ChunkCache`.
//!
//! An entry is either `Local` (written directly by this host, safe to
//! push) or `Remote` (fetched from the backend, already durable there).
//! `ChunkCache` is the only thing that should construct entries; this
//! module just stores and retrieves them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use vault_core::error::Result;
use vault_core::key::Key;
use vault_core::resource::{FileResource, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEntrySource {
    Local,
    Remote,
}

#[derive(Clone)]
pub struct CacheEntry {
    pub source: CacheEntrySource,
    pub resource: Arc<dyn Resource>,
}

pub trait CacheDB: Send + Sync {
    fn get(&self, key: &Key) -> Option<CacheEntry>;
    fn put(&self, key: &Key, entry: CacheEntry);
    /// Allocate a fresh path under the cache's temp area for a chunk that
    /// is about to be written (fetched from remote, or assembled locally).
    fn allocate_temp_filename(&self) -> PathBuf;
}

/// Copy an externally-sourced file into the cache's storage area and
/// return a `Resource` over the copy. Used when a caller hands in a path
/// that isn't already managed by the cache (e.g. a file staged by a
/// client upload).
pub fn make_fs_resource(dest: &Path, src: &Path) -> Result<Arc<dyn Resource>> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dest)?;
    Ok(Arc::new(FileResource::new(dest)?))
}

/// In-memory `CacheDB`, useful for tests and for ephemeral minions that
/// don't need the cache to survive a restart.
pub struct MemCacheDB {
    root: PathBuf,
    entries: Mutex<HashMap<Key, CacheEntry>>,
    next_temp_id: std::sync::atomic::AtomicU64,
}

impl MemCacheDB {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("tmp"))?;
        Ok(Self {
            root,
            entries: Mutex::new(HashMap::new()),
            next_temp_id: std::sync::atomic::AtomicU64::new(0),
        })
    }
}

impl CacheDB for MemCacheDB {
    fn get(&self, key: &Key) -> Option<CacheEntry> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &Key, entry: CacheEntry) {
        self.entries.lock().unwrap().insert(*key, entry);
    }

    fn allocate_temp_filename(&self) -> PathBuf {
        let id = self
            .next_temp_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.root.join("tmp").join(format!("{}-{id}", std::process::id()))
    }
}

/// Sled-backed durable `CacheDB`: entry metadata (source + file path) is
/// persisted in a sled tree, chunk bytes live on disk as regular files so
/// they can still be mmap'd by `FileResource`.
pub struct PersistentCacheDB {
    root: PathBuf,
    db: sled::Db,
    next_temp_id: std::sync::atomic::AtomicU64,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    source: CacheEntrySource,
    path: PathBuf,
}

impl PersistentCacheDB {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("tmp"))?;
        std::fs::create_dir_all(root.join("chunks"))?;
        let db = sled::open(root.join("index.sled"))
            .map_err(|e| vault_core::error::VaultError::Corruption(e.to_string()))?;
        Ok(Self {
            root,
            db,
            next_temp_id: std::sync::atomic::AtomicU64::new(0),
        })
    }
}

impl CacheDB for PersistentCacheDB {
    fn get(&self, key: &Key) -> Option<CacheEntry> {
        let raw = self.db.get(key.as_bytes()).ok().flatten()?;
        let stored: StoredEntry = bincode::deserialize(&raw).ok()?;
        let resource = FileResource::new(&stored.path).ok()?;
        Some(CacheEntry {
            source: stored.source,
            resource: Arc::new(resource),
        })
    }

    fn put(&self, key: &Key, entry: CacheEntry) {
        let path = self.root.join("chunks").join(key.to_hex());
        if let Ok(bytes) = entry.resource.as_bytes() {
            if std::fs::write(&path, &bytes).is_ok() {
                let stored = StoredEntry {
                    source: entry.source,
                    path,
                };
                if let Ok(encoded) = bincode::serialize(&stored) {
                    let _ = self.db.insert(key.as_bytes(), encoded);
                }
            }
        }
    }

    fn allocate_temp_filename(&self) -> PathBuf {
        let id = self
            .next_temp_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.root.join("tmp").join(format!("{}-{id}", std::process::id()))
    }
}
