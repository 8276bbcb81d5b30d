//! `ChunkCache` — the two-tier store every chunk read/write actually goes
//! through: a local `CacheDB` in front of a remote `ChunkService`.
//!
//! A `get` for a key not yet cached locally triggers exactly one remote
//! fetch even when many callers ask for the same key concurrently — late
//! arrivals block on a condition variable instead of each issuing their
//! own backend request. This mirrors the original cache's `inProgress`
//! map plus `sync.Cond` broadcast, translated to `std::sync::Condvar`.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use vault_core::error::{Result, VaultError};
use vault_core::key::{Key, EMPTY_DIR_KEY};
use vault_core::resource::{MemResource, Resource};

use crate::cache_db::{CacheDB, CacheEntry, CacheEntrySource};
use crate::chunk_service::ChunkService;

/// Adapts an `Arc<dyn Resource>` (what the cache hands back) to the
/// owned `Box<dyn Resource>` shape `ChunkService::get` requires.
struct ArcResource(Arc<dyn Resource>);

impl Resource for ArcResource {
    fn len(&self) -> u64 {
        self.0.len()
    }

    fn as_bytes(&self) -> io::Result<Bytes> {
        self.0.as_bytes()
    }

    fn fresh_reader(&self) -> io::Result<Box<dyn std::io::Read + Send>> {
        self.0.fresh_reader()
    }
}

/// Tracks keys whose remote fetch is currently in flight, so concurrent
/// callers for the same key wait on one fetch instead of issuing N.
#[derive(Default)]
struct InProgress {
    keys: HashSet<Key>,
}

pub struct ChunkCache<D: CacheDB, B: ChunkService> {
    local: Arc<D>,
    backend: Arc<B>,
    in_progress: Mutex<InProgress>,
    condvar: Condvar,
}

impl<D: CacheDB, B: ChunkService> ChunkCache<D, B> {
    pub fn new(local: Arc<D>, backend: Arc<B>) -> Self {
        Self {
            local,
            backend,
            in_progress: Mutex::new(InProgress::default()),
            condvar: Condvar::new(),
        }
    }

    /// Fetch a chunk, populating the local cache on a remote hit.
    ///
    /// `EMPTY_DIR_KEY` is never looked up anywhere: callers that hold it
    /// already know the answer is the empty directory.
    pub fn get(&self, key: &Key) -> Result<Arc<dyn Resource>> {
        if key.is_empty_dir() {
            return Err(VaultError::InvalidKey(
                "EMPTY_DIR_KEY is never stored or fetched".into(),
            ));
        }

        if let Some(entry) = self.local.get(key) {
            return Ok(entry.resource);
        }

        loop {
            let mut guard = self.in_progress.lock().unwrap();
            if let Some(entry) = self.local.get(key) {
                return Ok(entry.resource);
            }
            if guard.keys.contains(key) {
                // Another thread is already fetching this key; wait for it
                // to finish and re-check the local cache.
                guard = self.condvar.wait(guard).unwrap();
                drop(guard);
                continue;
            }
            guard.keys.insert(*key);
            break;
        }

        let result = self.fetch_and_populate(key);

        {
            let mut guard = self.in_progress.lock().unwrap();
            guard.keys.remove(key);
        }
        self.condvar.notify_all();

        result
    }

    fn fetch_and_populate(&self, key: &Key) -> Result<Arc<dyn Resource>> {
        let resource: Arc<dyn Resource> = Arc::from(self.backend.get(key)?);
        self.local.put(
            key,
            CacheEntry {
                source: CacheEntrySource::Remote,
                resource: resource.clone(),
            },
        );
        Ok(resource)
    }

    /// Store a chunk locally, marked `Local` (eligible for upload but not
    /// yet pushed to the backend). Returns immediately if the key is
    /// already cached, matching `ChunkService::put`'s idempotence.
    pub fn put_local(&self, key: &Key, resource: Arc<dyn Resource>) -> Result<()> {
        if key.is_empty_dir() {
            return Ok(());
        }
        if self.local.get(key).is_some() {
            return Ok(());
        }
        self.local.put(
            key,
            CacheEntry {
                source: CacheEntrySource::Local,
                resource,
            },
        );
        Ok(())
    }

    /// True if `key` is present locally, regardless of source.
    pub fn has_local(&self, key: &Key) -> bool {
        key.is_empty_dir() || self.local.get(key).is_some()
    }

    /// The entry's source, if cached locally.
    pub fn local_source(&self, key: &Key) -> Option<CacheEntrySource> {
        self.local.get(key).map(|e| e.source)
    }

    pub fn local_db(&self) -> &Arc<D> {
        &self.local
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

/// Lets `ChunkCache` itself stand in as a `ChunkService` so push/pull can
/// treat "the minion's view of a chunk" and "a remote blob store"
/// uniformly. A `put` through this path always lands as a `Local` entry
/// (it's a write the caller is originating, not a fetch); `delete` is a
/// no-op — GC only ever deletes from the backend, never from a minion's
/// local cache.
impl<D: CacheDB, B: ChunkService> ChunkService for ChunkCache<D, B> {
    fn get(&self, key: &Key) -> Result<Box<dyn Resource>> {
        ChunkCache::get(self, key).map(|r| Box::new(ArcResource(r)) as Box<dyn Resource>)
    }

    fn put(&self, key: &Key, resource: &dyn Resource) -> Result<()> {
        let bytes = resource.as_bytes()?;
        self.put_local(key, Arc::new(MemResource::new(bytes)))
    }

    fn delete(&self, _key: &Key) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_db::MemCacheDB;
    use crate::chunk_service::LocalBlobStore;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use vault_core::resource::MemResource;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("{prefix}-{}-{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn harness() -> ChunkCache<MemCacheDB, LocalBlobStore> {
        let local = Arc::new(MemCacheDB::new(temp_dir("vault-chunkcache-local")).unwrap());
        let backend = Arc::new(LocalBlobStore::new(temp_dir("vault-chunkcache-backend")).unwrap());
        ChunkCache::new(local, backend)
    }

    #[test]
    fn get_empty_dir_key_is_rejected() {
        let cache = harness();
        assert!(matches!(
            cache.get(&EMPTY_DIR_KEY),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    fn put_local_then_get_hits_cache_without_backend() {
        let cache = harness();
        let data = b"local only";
        let key = Key::of(data);
        cache
            .put_local(&key, Arc::new(MemResource::new(&data[..])))
            .unwrap();

        assert_eq!(cache.local_source(&key), Some(CacheEntrySource::Local));
        let got = cache.get(&key).unwrap();
        assert_eq!(&got.as_bytes().unwrap()[..], data);
    }

    #[test]
    fn get_populates_local_cache_from_backend_as_remote() {
        let cache = harness();
        let data = b"from backend";
        let key = Key::of(data);
        cache.backend.put(&key, &MemResource::new(&data[..])).unwrap();

        assert!(!cache.has_local(&key));
        let got = cache.get(&key).unwrap();
        assert_eq!(&got.as_bytes().unwrap()[..], data);
        assert_eq!(cache.local_source(&key), Some(CacheEntrySource::Remote));
    }

    #[test]
    fn get_missing_everywhere_reports_chunk_missing() {
        let cache = harness();
        let key = Key::of(b"nowhere");
        assert!(matches!(cache.get(&key), Err(VaultError::ChunkMissing(_))));
    }

    #[test]
    fn concurrent_gets_for_same_key_all_succeed() {
        let cache = Arc::new(harness());
        let data = b"shared chunk";
        let key = Key::of(data);
        cache.backend.put(&key, &MemResource::new(&data[..])).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get(&key).unwrap().as_bytes().unwrap().to_vec())
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), data);
        }
    }
}
