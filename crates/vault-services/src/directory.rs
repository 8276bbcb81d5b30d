//! Immutable directory entries.
//!
//! A directory is a sorted `(name, metadata)` list, bincode-encoded and
//! stored as an ordinary chunk under its own content key. Mutating a
//! directory never mutates this struct in place — callers build a new
//! sorted vector and re-key it, which is what makes the whole tree
//! copy-on-write: changing one file only changes the chunk keys along
//! the path from the root to that file.
//!
//! The original design balances these as a B-tree once a directory grows
//! past a leaf-size threshold; that rebalancing is not implemented here
//! (see the design ledger) — directories are always a single sorted leaf
//! vector, which is correct for any size but loses the original's log(n)
//! lookup/update inside one directory.

use serde::{Deserialize, Serialize};

use vault_core::error::{Result, VaultError};
use vault_core::key::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
}

/// The unit stored inside a directory entry. `total_size` is the
/// recursive byte sum (this node's own `size` plus every descendant's
/// `total_size` for directories; equal to `size` for files) and is
/// recomputed every time a COW spine clone re-keys this node —
/// `creation_time` moves with it, since a rebuilt node is a fresh node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub kind: FileKind,
    pub key: Key,
    pub size: u64,
    pub total_size: u64,
    pub creation_time: u64,
}

impl FileMetadata {
    pub fn file(key: Key, size: u64) -> Self {
        Self {
            kind: FileKind::File,
            key,
            size,
            total_size: size,
            creation_time: now_unix_secs(),
        }
    }

    /// A freshly created, empty directory entry (e.g. `mkdir`'s new leaf).
    pub fn directory(key: Key) -> Self {
        Self {
            kind: FileKind::Directory,
            key,
            size: 0,
            total_size: 0,
            creation_time: now_unix_secs(),
        }
    }

    /// A directory entry for a COW spine clone: `size` is the new
    /// directory chunk's own encoded length, `total_size` is `size` plus
    /// the sum of its children's `total_size`.
    pub fn directory_rekeyed(key: Key, size: u64, total_size: u64) -> Self {
        Self {
            kind: FileKind::Directory,
            key,
            size,
            total_size,
            creation_time: now_unix_secs(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A single immutable directory: a name-sorted entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    entries: Vec<(String, FileMetadata)>,
}

impl Directory {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_sorted(entries: Vec<(String, FileMetadata)>) -> Self {
        debug_assert!(
            entries.windows(2).all(|w| w[0].0 < w[1].0),
            "directory entries must be strictly sorted and deduplicated by name"
        );
        Self { entries }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| VaultError::Corruption(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| VaultError::Corruption(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FileMetadata)> {
        self.entries.iter()
    }

    /// Sum of every direct child's `total_size` — the `children_size`
    /// term in the spine re-clone algorithm's `total_size` recomputation.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|(_, m)| m.total_size).sum()
    }

    pub fn get(&self, name: &str) -> Option<&FileMetadata> {
        self.entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Return a new directory with `name` bound to `metadata`, replacing
    /// any existing entry of the same name.
    pub fn with_entry(&self, name: &str, metadata: FileMetadata) -> Self {
        let mut entries = self.entries.clone();
        match entries.binary_search_by(|(n, _)| n.as_str().cmp(name)) {
            Ok(idx) => entries[idx].1 = metadata,
            Err(idx) => entries.insert(idx, (name.to_string(), metadata)),
        }
        Self { entries }
    }

    /// Return a new directory with `name` removed, or `None` if it wasn't
    /// present.
    pub fn without_entry(&self, name: &str) -> Option<Self> {
        let idx = self
            .entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()?;
        let mut entries = self.entries.clone();
        entries.remove(idx);
        Some(Self { entries })
    }
}
