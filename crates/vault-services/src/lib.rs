//! vault-services — the filesystem's storage and versioning engine:
//! chunk storage, the two-tier cache, immutable directories, atomic
//! root state, push/pull replication, and the tag service client.

pub mod atomic_state;
pub mod cache_db;
pub mod chunk_cache;
pub mod chunk_service;
pub mod directory;
pub mod directory_service;
pub mod push_pull;
pub mod tag_service;

pub use atomic_state::AtomicState;
pub use cache_db::{CacheDB, CacheEntry, CacheEntrySource, MemCacheDB, PersistentCacheDB};
pub use chunk_cache::ChunkCache;
pub use chunk_service::{ChunkService, IterableChunkService, LocalBlobStore};
pub use directory::{Directory, FileMetadata};
pub use directory_service::DirectoryService;
pub use push_pull::{pull, push, PushPullStats};
pub use tag_service::TagService;
