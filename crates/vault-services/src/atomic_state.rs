//! `AtomicState` — the minion's in-memory view of every root label it
//! knows about, and the only place that mutates one.
//!
//! Each label gets its own `tokio::sync::RwLock<Key>` instead of one
//! mutex guarding every label (a deliberate redesign — see the design
//! ledger): readers of unrelated labels never wait on each other, and a
//! long-running mutation of `work/feature-x` doesn't stall a stat of
//! `work/main`. A mutation still takes the single write lock for its own
//! label for the whole read-modify-write cycle, so two concurrent
//! mutations of the same label serialize correctly.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use vault_core::error::{Result, VaultError};
use vault_core::key::{Key, EMPTY_DIR_KEY};

use crate::cache_db::CacheDB;
use crate::chunk_service::ChunkService;
use crate::directory::{Directory, FileMetadata};
use crate::directory_service::DirectoryService;

pub struct AtomicState<D: CacheDB, B: ChunkService> {
    dirs: Arc<DirectoryService<D, B>>,
    roots: DashMap<String, Arc<RwLock<Key>>>,
}

impl<D: CacheDB, B: ChunkService> AtomicState<D, B> {
    pub fn new(dirs: Arc<DirectoryService<D, B>>) -> Self {
        Self {
            dirs,
            roots: DashMap::new(),
        }
    }

    fn lock_for(&self, label: &str) -> Arc<RwLock<Key>> {
        self.roots
            .entry(label.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(EMPTY_DIR_KEY)))
            .clone()
    }

    /// Seed or overwrite a label's current root, e.g. after fetching its
    /// value from the root service. Does not itself push anything
    /// anywhere — callers own syncing with `TagService`.
    pub async fn register_root(&self, label: &str, key: Key) {
        let lock = self.lock_for(label);
        *lock.write().await = key;
    }

    pub async fn get_root(&self, label: &str) -> Key {
        let lock = self.lock_for(label);
        *lock.read().await
    }

    pub fn known_labels(&self) -> Vec<String> {
        self.roots.iter().map(|e| e.key().clone()).collect()
    }

    /// Walk `path` from `root`, returning the `Directory` at every level
    /// from the root down to (but not including) the final component's
    /// parent-resolved target — i.e. one `Directory` per path component
    /// including the root itself. `path` may be empty, in which case the
    /// result is just `[root directory]`.
    fn dirs_from_path(&self, root: Key, path: &[String]) -> Result<Vec<Directory>> {
        let mut trail = Vec::with_capacity(path.len() + 1);
        let mut current = self.dirs.load(&root)?;
        trail.push(current.clone());

        for component in path {
            let meta = current
                .get(component)
                .ok_or_else(|| VaultError::NoSuchPath(component.clone()))?;
            if !meta.is_directory() {
                return Err(VaultError::NotADirectory(component.clone()));
            }
            current = self.dirs.load(&meta.key)?;
            trail.push(current.clone());
        }

        Ok(trail)
    }

    /// Rebuild the directory spine bottom-up after changing the leaf
    /// directory's entry for `leaf_name`, re-keying every ancestor in
    /// turn. `trail` is the directory list `dirs_from_path` produced for
    /// `path`; `trail.last()` is the immediate parent of `leaf_name`.
    /// Returns the new root key. Doesn't take any lock itself — the
    /// caller must already hold the label's write lock.
    fn unsafe_link(
        &self,
        trail: Vec<Directory>,
        path: &[String],
        leaf_name: &str,
        leaf_meta: Option<FileMetadata>,
    ) -> Result<Key> {
        let mut iter = trail.into_iter().rev();
        let leaf_dir = iter.next().expect("dirs_from_path always returns >=1 entry");

        let mut rebuilt = match leaf_meta {
            Some(meta) => leaf_dir.with_entry(leaf_name, meta),
            None => leaf_dir
                .without_entry(leaf_name)
                .ok_or_else(|| VaultError::NoSuchPath(leaf_name.to_string()))?,
        };
        let (mut new_key, mut new_size) = self.dirs.store(&rebuilt)?;
        let mut new_total_size = new_size + rebuilt.total_size();

        for (ancestor, name) in iter.zip(path.iter().rev()) {
            rebuilt = ancestor.with_entry(name, FileMetadata::directory_rekeyed(new_key, new_size, new_total_size));
            let (key, size) = self.dirs.store(&rebuilt)?;
            new_key = key;
            new_size = size;
            new_total_size = new_size + rebuilt.total_size();
        }

        Ok(new_key)
    }

    /// Create an empty directory at `path/name` under `label`.
    pub async fn mkdir(&self, label: &str, path: &[String], name: &str) -> Result<Key> {
        let lock = self.lock_for(label);
        let mut root_guard = lock.write().await;

        let trail = self.dirs_from_path(*root_guard, path)?;
        if trail.last().unwrap().get(name).is_some() {
            return Err(VaultError::AlreadyExists(name.to_string()));
        }
        let new_root = self.unsafe_link(trail, path, name, Some(FileMetadata::directory(EMPTY_DIR_KEY)))?;
        *root_guard = new_root;
        Ok(new_root)
    }

    /// Bind `path/name` to a file chunk keyed by `key`, creating or
    /// replacing whatever was there.
    pub async fn link(&self, label: &str, path: &[String], name: &str, key: Key, size: u64) -> Result<Key> {
        let lock = self.lock_for(label);
        let mut root_guard = lock.write().await;

        let trail = self.dirs_from_path(*root_guard, path)?;
        let new_root = self.unsafe_link(trail, path, name, Some(FileMetadata::file(key, size)))?;
        *root_guard = new_root;
        Ok(new_root)
    }

    /// Remove `path/name`, whether it names a file or an empty or
    /// non-empty subdirectory.
    pub async fn unlink(&self, label: &str, path: &[String], name: &str) -> Result<Key> {
        let lock = self.lock_for(label);
        let mut root_guard = lock.write().await;

        let trail = self.dirs_from_path(*root_guard, path)?;
        let new_root = self.unsafe_link(trail, path, name, None)?;
        *root_guard = new_root;
        Ok(new_root)
    }

    /// Look up metadata for `path/name` without mutating anything.
    pub async fn stat(&self, label: &str, path: &[String], name: &str) -> Result<FileMetadata> {
        let lock = self.lock_for(label);
        let root = *lock.read().await;

        let trail = self.dirs_from_path(root, path)?;
        trail
            .last()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::NoSuchPath(name.to_string()))
    }

    /// List every entry directly under `path`.
    pub async fn list(&self, label: &str, path: &[String]) -> Result<Vec<(String, FileMetadata)>> {
        let lock = self.lock_for(label);
        let root = *lock.read().await;

        let trail = self.dirs_from_path(root, path)?;
        Ok(trail.last().unwrap().iter().cloned().collect())
    }
}
