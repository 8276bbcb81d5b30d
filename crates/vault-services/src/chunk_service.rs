//! `ChunkService` — the external object-store transport. Get/put/delete
//! by content key, all methods threadsafe.
//!
//! `LocalBlobStore` is the one concrete implementation shipped here: a
//! file-backed store using a two-level hashed directory layout (the same
//! layout Git uses for loose objects). It stands in for a real S3-backed
//! transport — `BackendConfig`'s credential/endpoint/bucket fields are
//! modeled for that real implementation but unused by this one.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use vault_core::error::{Result, VaultError};
use vault_core::key::Key;
use vault_core::resource::{FileResource, Resource};

/// Get/put/delete a chunk by content key. All methods threadsafe.
pub trait ChunkService: Send + Sync {
    fn get(&self, key: &Key) -> Result<Box<dyn Resource>>;
    fn put(&self, key: &Key, resource: &dyn Resource) -> Result<()>;
    fn delete(&self, key: &Key) -> Result<()>;
}

/// A `ChunkService` whose full key set can be enumerated — required for
/// the GC sweep phase.
pub trait IterableChunkService: ChunkService {
    fn iterate(&self) -> Result<Box<dyn Iterator<Item = Key> + Send>>;
}

/// File-backed reference `ChunkService`, grounded on the local chunk
/// cache's two-level hashed directory layout, keyed by the 44-character
/// base-64 encoding:
///   `{root}/{b64[0..2]}/{b64}`
#[derive(Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn chunk_path(&self, key: &Key) -> PathBuf {
        let b64 = key.to_base64();
        self.root.join(&b64[0..2]).join(&b64)
    }
}

impl ChunkService for LocalBlobStore {
    fn get(&self, key: &Key) -> Result<Box<dyn Resource>> {
        let path = self.chunk_path(key);
        if !path.exists() {
            return Err(VaultError::ChunkMissing(*key));
        }
        Ok(Box::new(FileResource::new(path)?))
    }

    fn put(&self, key: &Key, resource: &dyn Resource) -> Result<()> {
        let path = self.chunk_path(key);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            let data = resource.as_bytes()?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        tracing::trace!(key = %key, "chunk stored in backend");
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<()> {
        let path = self.chunk_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl IterableChunkService for LocalBlobStore {
    fn iterate(&self) -> Result<Box<dyn Iterator<Item = Key> + Send>> {
        let mut keys = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if let Ok(subdir) = fs::read_dir(entry.path()) {
                    for chunk in subdir.flatten() {
                        if let Some(name) = chunk.file_name().to_str() {
                            if let Ok(key) = Key::from_base64(name) {
                                keys.push(key);
                            }
                        }
                    }
                }
            }
        }
        Ok(Box::new(keys.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use vault_core::resource::MemResource;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> LocalBlobStore {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vault-blobstore-test-{}-{}",
            std::process::id(),
            id
        ));
        let _ = fs::remove_dir_all(&dir);
        LocalBlobStore::new(&dir).unwrap()
    }

    #[test]
    fn put_and_get_roundtrip() {
        let store = temp_store();
        let data = b"hello world";
        let key = Key::of(data);

        store.put(&key, &MemResource::new(&data[..])).unwrap();
        let got = store.get(&key).unwrap();
        assert_eq!(&got.as_bytes().unwrap()[..], data);
    }

    #[test]
    fn get_missing_returns_chunk_missing_error() {
        let store = temp_store();
        let key = Key::of(b"never stored");
        match store.get(&key) {
            Err(VaultError::ChunkMissing(k)) => assert_eq!(k, key),
            other => panic!("expected ChunkMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn put_is_idempotent() {
        let store = temp_store();
        let data = b"idempotent";
        let key = Key::of(data);

        store.put(&key, &MemResource::new(&data[..])).unwrap();
        store.put(&key, &MemResource::new(&data[..])).unwrap();

        let count = store.iterate().unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_then_get_reports_missing() {
        let store = temp_store();
        let data = b"to delete";
        let key = Key::of(data);

        store.put(&key, &MemResource::new(&data[..])).unwrap();
        store.delete(&key).unwrap();
        assert!(matches!(store.get(&key), Err(VaultError::ChunkMissing(_))));
    }

    #[test]
    fn delete_of_missing_key_is_not_an_error() {
        let store = temp_store();
        let key = Key::of(b"was never here");
        assert!(store.delete(&key).is_ok());
    }

    #[test]
    fn iterate_enumerates_all_stored_keys() {
        let store = temp_store();
        let k1 = Key::of(b"one");
        let k2 = Key::of(b"two");
        store.put(&k1, &MemResource::new(&b"one"[..])).unwrap();
        store.put(&k2, &MemResource::new(&b"two"[..])).unwrap();

        let mut found: Vec<Key> = store.iterate().unwrap().collect();
        found.sort();
        let mut expected = vec![k1, k2];
        expected.sort();
        assert_eq!(found, expected);
    }
}
