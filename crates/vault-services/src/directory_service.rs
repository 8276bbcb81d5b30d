//! `DirectoryService` — loads and stores `Directory` values as chunks.
//!
//! Deliberately thin: a directory is just bytes like any other chunk, so
//! this only knows how to go from a `Key` to a decoded `Directory` (and
//! back), short-circuiting `EMPTY_DIR_KEY` without ever touching the
//! cache or backend.

use std::sync::Arc;

use vault_core::error::Result;
use vault_core::key::{Key, EMPTY_DIR_KEY};
use vault_core::resource::MemResource;

use crate::cache_db::CacheDB;
use crate::chunk_cache::ChunkCache;
use crate::chunk_service::ChunkService;
use crate::directory::Directory;

pub struct DirectoryService<D: CacheDB, B: ChunkService> {
    cache: Arc<ChunkCache<D, B>>,
}

impl<D: CacheDB, B: ChunkService> DirectoryService<D, B> {
    pub fn new(cache: Arc<ChunkCache<D, B>>) -> Self {
        Self { cache }
    }

    pub fn load(&self, key: &Key) -> Result<Directory> {
        if key.is_empty_dir() {
            return Ok(Directory::empty());
        }
        let resource = self.cache.get(key)?;
        Directory::decode(&resource.as_bytes()?)
    }

    /// Encode and store `dir`, returning its content key and its encoded
    /// byte length (`size`, in spine re-clone terms). An empty directory
    /// always returns `(EMPTY_DIR_KEY, 0)` without writing anything.
    pub fn store(&self, dir: &Directory) -> Result<(Key, u64)> {
        if dir.is_empty() {
            return Ok((EMPTY_DIR_KEY, 0));
        }
        let bytes = dir.encode()?;
        let key = Key::of(&bytes);
        let len = bytes.len() as u64;
        self.cache
            .put_local(&key, Arc::new(MemResource::new(bytes)))?;
        Ok((key, len))
    }
}
