//! `Roots` — the label/lease registry that is the root service's whole
//! reason to exist, plus the tricolor mark-sweep `Coloring` used for GC.
//!
//! Grounded directly on `tagsvc/roots.go`'s `Roots`/`Coloring`/`Leases`:
//! named roots are durable (kept until explicitly reassigned), anonymous
//! roots are leases with a timestamp after which they may expire. GC
//! walks every live root (named + unexpired leases), marks everything
//! reachable black, and anything left white in the backend is free to
//! delete.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use vault_core::error::Result;
use vault_core::key::{Key, EMPTY_DIR_KEY};
use vault_services::cache_db::MemCacheDB;
use vault_services::chunk_service::{IterableChunkService, LocalBlobStore};
use vault_services::chunk_cache::ChunkCache;
use vault_services::directory_service::DirectoryService;

use crate::log::{Log, LogRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Gray,
    Black,
}

/// Tricolor mark set: white is implicit (absent from both sets).
#[derive(Default)]
pub struct Coloring {
    gray: HashSet<Key>,
    black: HashSet<Key>,
}

impl Coloring {
    fn mark(&mut self, key: Key, color: Color) {
        match color {
            Color::Gray => {
                if !self.black.contains(&key) {
                    self.gray.insert(key);
                }
            }
            Color::Black => {
                self.gray.remove(&key);
                self.black.insert(key);
            }
            Color::White => panic!("cannot mark a key white"),
        }
    }

    fn get(&self, key: &Key) -> Color {
        if self.gray.contains(key) {
            Color::Gray
        } else if self.black.contains(key) {
            Color::Black
        } else {
            Color::White
        }
    }

    fn pick_gray(&self) -> Option<Key> {
        self.gray.iter().next().copied()
    }

    fn reset(&mut self) {
        self.gray.clear();
        self.black.clear();
    }

    /// Mark everything reachable from `roots` black, starting every root
    /// gray and working the gray frontier to exhaustion.
    fn color_keys(
        &mut self,
        roots: &[Key],
        dirs: &DirectoryService<MemCacheDB, LocalBlobStore>,
    ) -> Result<()> {
        self.reset();
        for root in roots {
            self.mark(*root, Color::Gray);
        }
        self.mark(EMPTY_DIR_KEY, Color::Black);

        while let Some(next) = self.pick_gray() {
            let dir = dirs.load(&next)?;
            for (_, meta) in dir.iter() {
                if meta.is_directory() {
                    if self.get(&meta.key) == Color::White {
                        self.mark(meta.key, Color::Gray);
                    }
                } else {
                    self.mark(meta.key, Color::Black);
                }
            }
            self.mark(next, Color::Black);
        }

        Ok(())
    }

    /// Enumerate every chunk in the backend; anything still white is
    /// unreachable and handed to `free`.
    fn free_white_keys(&self, chunks: &dyn IterableChunkService, mut free: impl FnMut(Key)) -> Result<usize> {
        let mut freed = 0;
        for key in chunks.iterate()? {
            if self.get(&key) == Color::White {
                free(key);
                freed += 1;
            }
        }
        Ok(freed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyLease {
    timestamp: u64,
    key: Key,
}

struct RootsState {
    labels: HashMap<String, Key>,
    leases: BinaryHeap<Reverse<LeaseOrd>>,
}

/// `BinaryHeap` is a max-heap; wrapping in `Reverse` and ordering only
/// by timestamp gives a min-heap over lease expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LeaseOrd(KeyLease);

impl PartialOrd for LeaseOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LeaseOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.timestamp.cmp(&other.0.timestamp)
    }
}

pub struct Roots {
    state: Mutex<RootsState>,
    /// Independent of `state`'s label/lease lock so a running mark phase
    /// (which can take a while — it walks the whole reachable directory
    /// tree) never blocks `set`/`add_lease`, and so their write barrier
    /// (marking a freshly-bound key gray) can actually interleave with
    /// an in-progress collection instead of waiting behind it.
    coloring: Mutex<Coloring>,
    log: Mutex<Log>,
}

impl Roots {
    /// Open (or create) the registry backed by the log at `log_path`,
    /// replaying its contents to rebuild in-memory state.
    pub fn open(log_path: &Path) -> Result<Self> {
        let mut labels = HashMap::new();
        let mut leases = BinaryHeap::new();

        let log = Log::open(log_path, |record| match record {
            LogRecord::Label { label, key } => match key {
                Some(k) => {
                    labels.insert(label.clone(), *k);
                }
                None => {
                    labels.remove(label);
                }
            },
            LogRecord::Lease { key, expiry_unix_secs } => {
                leases.push(Reverse(LeaseOrd(KeyLease {
                    timestamp: *expiry_unix_secs,
                    key: *key,
                })));
            }
        })?;

        let mut coloring = Coloring::default();
        for key in labels.values() {
            coloring.mark(*key, Color::Gray);
        }

        Ok(Self {
            state: Mutex::new(RootsState { labels, leases }),
            coloring: Mutex::new(coloring),
            log: Mutex::new(log),
        })
    }

    pub fn set(&self, label: &str, key: Option<Key>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match key {
                Some(k) => {
                    state.labels.insert(label.to_string(), k);
                    self.coloring.lock().unwrap().mark(k, Color::Gray);
                }
                None => {
                    state.labels.remove(label);
                }
            }
        }
        self.log.lock().unwrap().append(&LogRecord::Label {
            label: label.to_string(),
            key,
        })
    }

    pub fn get(&self, label: &str) -> Option<Key> {
        self.state.lock().unwrap().labels.get(label).copied()
    }

    pub fn add_lease(&self, expiry_unix_secs: u64, key: Key) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.leases.push(Reverse(LeaseOrd(KeyLease {
                timestamp: expiry_unix_secs,
                key,
            })));
            self.coloring.lock().unwrap().mark(key, Color::Gray);
        }
        self.log.lock().unwrap().append(&LogRecord::Lease {
            key,
            expiry_unix_secs,
        })
    }

    /// Remove and return every lease whose expiry is older than
    /// `oldest_to_keep`.
    pub fn expire(&self, oldest_to_keep: u64) -> Vec<Key> {
        let mut state = self.state.lock().unwrap();
        let mut expired = Vec::new();
        while let Some(Reverse(LeaseOrd(lease))) = state.leases.peek().copied() {
            if lease.timestamp >= oldest_to_keep {
                break;
            }
            state.leases.pop();
            expired.push(lease.key);
        }
        expired
    }

    pub fn get_named_roots(&self) -> Vec<(String, Key)> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .map(|(name, key)| (name.clone(), *key))
            .collect()
    }

    /// All keys that must survive a GC sweep: named roots plus every
    /// lease not yet expired as of `now`.
    fn get_roots(&self, now: u64) -> Vec<Key> {
        let state = self.state.lock().unwrap();
        let mut roots: Vec<Key> = state.labels.values().copied().collect();
        roots.extend(
            state
                .leases
                .iter()
                .map(|Reverse(LeaseOrd(l))| l)
                .filter(|l| l.timestamp >= now)
                .map(|l| l.key),
        );
        roots
    }

    /// Run one full mark-sweep pass: mark everything reachable from the
    /// current roots, then free anything in `chunks` left white.
    /// `free` is called once per freed key — the caller decides whether
    /// that means a hard delete or a soft quarantine.
    ///
    /// The mark phase only holds `coloring`'s own lock, not `state`'s —
    /// `set`/`add_lease` can run concurrently and their write barrier
    /// (marking the newly bound key gray) is honored whether it lands
    /// before or during the walk. The sweep phase takes no lock on
    /// `state` at all.
    pub fn gc(
        &self,
        now: u64,
        dirs: &DirectoryService<MemCacheDB, LocalBlobStore>,
        chunks: &dyn IterableChunkService,
        mut free: impl FnMut(Key),
    ) -> Result<usize> {
        let roots = self.get_roots(now);
        let mut coloring = self.coloring.lock().unwrap();
        coloring.color_keys(&roots, dirs)?;
        coloring.free_white_keys(chunks, &mut free)
    }
}

/// Build the backend-facing `DirectoryService` the root service's GC
/// uses to walk directory chunks. An ephemeral `MemCacheDB` sits in
/// front of the same backend `LocalBlobStore` purely so repeated reads
/// within one GC pass don't re-fetch — there is no separate "local"
/// tier on the root side the way there is on a minion.
pub fn gc_directory_service(
    backend: std::sync::Arc<LocalBlobStore>,
    scratch_dir: &Path,
) -> Result<DirectoryService<MemCacheDB, LocalBlobStore>> {
    let local = std::sync::Arc::new(MemCacheDB::new(scratch_dir)?);
    let cache = std::sync::Arc::new(ChunkCache::new(local, backend));
    Ok(DirectoryService::new(cache))
}
