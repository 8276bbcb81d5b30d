//! Push/pull replication between two `ChunkService`s.
//!
//! Both directions are the same walk: start at a root known to be a
//! directory, and for everything reachable from it that the destination
//! doesn't already have, copy the chunk over. `push` copies
//! local → remote, `pull` copies remote → local; the algorithm doesn't
//! care which is which; `destination.get` doubling as a membership test
//! means a subtree already present on the far side is never re-walked,
//! so repeated pushes of mostly-unchanged trees stay cheap.
//!
//! Grounded on a stack-based DFS seeded with `EMPTY_DIR_KEY` in the
//! `seen` set, since that key is never stored or fetched anywhere.

use std::collections::HashSet;

use vault_core::error::Result;
use vault_core::key::Key;

use crate::chunk_service::ChunkService;
use crate::directory::Directory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushPullStats {
    /// Chunks actually copied from source to destination.
    pub transferred: usize,
    /// Chunks skipped because the destination already had them (or their
    /// whole subtree was skipped as a result).
    pub already_present: usize,
}

enum Pending {
    Directory(Key),
    File(Key),
}

fn replicate_tree(
    root: Key,
    source: &dyn ChunkService,
    destination: &dyn ChunkService,
) -> Result<PushPullStats> {
    let mut stats = PushPullStats::default();
    let mut seen: HashSet<Key> = HashSet::new();
    seen.insert(vault_core::key::EMPTY_DIR_KEY);

    let mut stack = vec![Pending::Directory(root)];

    while let Some(item) = stack.pop() {
        let (key, is_directory) = match item {
            Pending::Directory(key) => (key, true),
            Pending::File(key) => (key, false),
        };

        if key.is_empty_dir() || !seen.insert(key) {
            continue;
        }

        if destination.get(&key).is_ok() {
            stats.already_present += 1;
            continue;
        }

        let resource = source.get(&key)?;
        destination.put(&key, &*resource)?;
        stats.transferred += 1;

        if is_directory {
            let bytes = resource.as_bytes()?;
            let dir = Directory::decode(&bytes)?;
            for (_, meta) in dir.iter() {
                if meta.is_directory() {
                    stack.push(Pending::Directory(meta.key));
                } else {
                    stack.push(Pending::File(meta.key));
                }
            }
        }
    }

    Ok(stats)
}

/// Copy every chunk reachable from `root` that `remote` doesn't already
/// have, reading from `local`.
pub fn push(root: Key, local: &dyn ChunkService, remote: &dyn ChunkService) -> Result<PushPullStats> {
    tracing::debug!(root = %root, "starting push");
    let stats = replicate_tree(root, local, remote)?;
    tracing::info!(root = %root, transferred = stats.transferred, already_present = stats.already_present, "push complete");
    Ok(stats)
}

/// Copy every chunk reachable from `root` that `local` doesn't already
/// have, reading from `remote`.
pub fn pull(root: Key, remote: &dyn ChunkService, local: &dyn ChunkService) -> Result<PushPullStats> {
    tracing::debug!(root = %root, "starting pull");
    let stats = replicate_tree(root, remote, local)?;
    tracing::info!(root = %root, transferred = stats.transferred, already_present = stats.already_present, "pull complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_service::LocalBlobStore;
    use crate::directory::FileMetadata;
    use std::sync::atomic::{AtomicU64, Ordering};
    use vault_core::resource::MemResource;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> LocalBlobStore {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("vault-pushpull-{}-{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&dir);
        LocalBlobStore::new(&dir).unwrap()
    }

    fn store_chunk(store: &LocalBlobStore, data: &[u8]) -> Key {
        let key = Key::of(data);
        store.put(&key, &MemResource::new(data.to_vec())).unwrap();
        key
    }

    fn store_directory(store: &LocalBlobStore, dir: &Directory) -> Key {
        let bytes = dir.encode().unwrap();
        let key = Key::of(&bytes);
        store.put(&key, &MemResource::new(bytes)).unwrap();
        key
    }

    #[test]
    fn push_empty_root_transfers_nothing() {
        let local = temp_store();
        let remote = temp_store();
        let stats = push(vault_core::key::EMPTY_DIR_KEY, &local, &remote).unwrap();
        assert_eq!(stats.transferred, 0);
    }

    #[test]
    fn push_single_file_transfers_file_and_root() {
        let local = temp_store();
        let remote = temp_store();

        let file_key = store_chunk(&local, b"hello");
        let root_dir = Directory::empty().with_entry("hello.txt", FileMetadata::file(file_key, 5));
        let root_key = store_directory(&local, &root_dir);

        let stats = push(root_key, &local, &remote).unwrap();
        assert_eq!(stats.transferred, 2); // root dir + file
        assert!(remote.get(&file_key).is_ok());
        assert!(remote.get(&root_key).is_ok());
    }

    #[test]
    fn push_nested_directories_walks_whole_tree() {
        let local = temp_store();
        let remote = temp_store();

        let file_key = store_chunk(&local, b"deep content");
        let inner_dir = Directory::empty().with_entry("leaf.txt", FileMetadata::file(file_key, 12));
        let inner_key = store_directory(&local, &inner_dir);
        let outer_dir = Directory::empty().with_entry("inner", FileMetadata::directory(inner_key));
        let outer_key = store_directory(&local, &outer_dir);

        let stats = push(outer_key, &local, &remote).unwrap();
        assert_eq!(stats.transferred, 3); // outer + inner + file

        let fetched_outer = Directory::decode(&remote.get(&outer_key).unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(fetched_outer, outer_dir);
    }

    #[test]
    fn push_is_idempotent_second_call_transfers_nothing() {
        let local = temp_store();
        let remote = temp_store();

        let file_key = store_chunk(&local, b"stable");
        let root_dir = Directory::empty().with_entry("f", FileMetadata::file(file_key, 6));
        let root_key = store_directory(&local, &root_dir);

        push(root_key, &local, &remote).unwrap();
        let second = push(root_key, &local, &remote).unwrap();
        assert_eq!(second.transferred, 0);
        assert_eq!(second.already_present, 1); // root already present short-circuits the walk
    }

    #[test]
    fn pull_mirrors_push_in_the_opposite_direction() {
        let remote = temp_store();
        let local = temp_store();

        let file_key = store_chunk(&remote, b"from the backend");
        let root_dir = Directory::empty().with_entry("remote.txt", FileMetadata::file(file_key, 16));
        let root_key = store_directory(&remote, &root_dir);

        let stats = pull(root_key, &remote, &local).unwrap();
        assert_eq!(stats.transferred, 2);
        assert!(local.get(&file_key).is_ok());
        assert!(local.get(&root_key).is_ok());
    }

    #[test]
    fn shared_subtree_across_two_branches_is_only_transferred_once() {
        let local = temp_store();
        let remote = temp_store();

        let shared_file = store_chunk(&local, b"shared");
        let shared_dir = Directory::empty().with_entry("shared.txt", FileMetadata::file(shared_file, 6));
        let shared_key = store_directory(&local, &shared_dir);

        let root_dir = Directory::empty()
            .with_entry("a", FileMetadata::directory(shared_key))
            .with_entry("b", FileMetadata::directory(shared_key));
        let root_key = store_directory(&local, &root_dir);

        let stats = push(root_key, &local, &remote).unwrap();
        // root + shared_dir + shared_file, the second reference to shared_key is deduped.
        assert_eq!(stats.transferred, 3);
    }
}
