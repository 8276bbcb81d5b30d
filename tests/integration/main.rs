//! End-to-end scenarios spanning a minion (`AtomicState` + `ChunkCache`)
//! and a root service (`Roots` + `RpcServer`) talking over a real TCP
//! socket, mirroring the S1–S6 scenarios.
//!
//! Unlike the finer-grained unit tests inside each crate, these exercise
//! the full stack a running `vaultd`/`vault-root` pair would use: two
//! independent `AtomicState`s, a shared `LocalBlobStore` backend, and an
//! actual authenticated RPC round trip for every label read/write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vault_core::key::Key;
use vault_core::resource::{FileResource, MemResource, Resource};
use vault_root::roots::Roots;
use vault_root::rpc::RpcServer;
use vault_services::cache_db::PersistentCacheDB;
use vault_services::chunk_cache::ChunkCache;
use vault_services::chunk_service::{ChunkService, LocalBlobStore};
use vault_services::directory_service::DirectoryService;
use vault_services::tag_service::TagService;
use vault_services::{push, pull, AtomicState};

const AUTH_SECRET: &str = "integration-test-secret";

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

fn temp_dir(prefix: &str) -> PathBuf {
    let id = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Ports are handed out from a private range, offset by pid so repeat
/// test runs on the same machine don't collide with a still-unwinding
/// prior run.
fn next_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::Relaxed);
    18000u16
        .wrapping_add((std::process::id() as u16).wrapping_mul(37))
        .wrapping_add(offset)
}

/// A minion's storage stack: local cache in front of a shared backend,
/// directory service on top, `AtomicState` owning the label locks.
struct Minion {
    cache: Arc<ChunkCache<PersistentCacheDB, LocalBlobStore>>,
    atomic: Arc<AtomicState<PersistentCacheDB, LocalBlobStore>>,
}

fn spawn_minion(name: &str, backend: Arc<LocalBlobStore>) -> Minion {
    let local = Arc::new(PersistentCacheDB::open(temp_dir(&format!("vault-it-cache-{name}"))).unwrap());
    let cache = Arc::new(ChunkCache::new(local, backend));
    let dirs = Arc::new(DirectoryService::new(cache.clone()));
    let atomic = Arc::new(AtomicState::new(dirs));
    Minion { cache, atomic }
}

/// Starts a real root service listening on loopback and returns a
/// connected, already-authenticated `TagService` client for it plus the
/// shared backend every minion in the test should also use.
async fn spawn_root(backend_dir: PathBuf) -> (Arc<TagService>, Arc<LocalBlobStore>) {
    let backend = Arc::new(LocalBlobStore::new(backend_dir.join("backend")).unwrap());
    let roots = Arc::new(Roots::open(&backend_dir.join("roots.log")).unwrap());
    let port = next_port();
    let bind_addr = format!("127.0.0.1:{port}");

    let server = Arc::new(RpcServer {
        roots,
        backend: backend.clone(),
        auth_secret: AUTH_SECRET.to_string(),
        gc_scratch_dir: backend_dir.join("gc-scratch"),
    });
    tokio::spawn({
        let server = server.clone();
        let bind_addr = bind_addr.clone();
        async move {
            let _ = server.serve(&bind_addr).await;
        }
    });

    // Give the listener a moment to bind before any client connects.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let tags = Arc::new(TagService::new(bind_addr, AUTH_SECRET));
    (tags, backend)
}

// ── S3: file put + read within one minion ───────────────────────────────────

#[tokio::test]
async fn s3_file_put_and_read_round_trips_through_a_directory() {
    let (_tags, backend) = spawn_root(temp_dir("vault-it-s3-root")).await;
    let minion = spawn_minion("s3", backend);

    let file_dir = temp_dir("vault-it-s3-file");
    std::fs::create_dir_all(&file_dir).unwrap();
    let source_path = file_dir.join("source.bin");
    std::fs::write(&source_path, b"test").unwrap();

    let resource = FileResource::new(&source_path).unwrap();
    let key = Key::of(&resource.as_bytes().unwrap());
    minion.cache.put_local(&key, Arc::new(resource)).unwrap();

    minion.atomic.mkdir("r", &[], "a").await.unwrap();
    minion
        .atomic
        .link("r", &["a".to_string()], "b", key, 4)
        .await
        .unwrap();

    let meta = minion.atomic.stat("r", &["a".to_string()], "b").await.unwrap();
    assert_eq!(meta.key, key);
    assert_eq!(meta.size, 4);

    let bytes = minion.cache.get(&key).unwrap().as_bytes().unwrap();
    assert_eq!(&bytes[..4], b"test");
}

// ── S4: push from one peer, pull on another, sharing backend + root service ──

#[tokio::test]
async fn s4_push_then_pull_replicates_a_tree_between_peers() {
    let root_dir = temp_dir("vault-it-s4-root");
    let (tags, backend) = spawn_root(root_dir).await;

    let peer1 = spawn_minion("s4-peer1", backend.clone());
    let peer2 = spawn_minion("s4-peer2", backend.clone());

    let data = b"test";
    let key = Key::of(data);
    peer1.cache.put_local(&key, Arc::new(MemResource::new(&data[..]))).unwrap();

    peer1.atomic.mkdir("r", &[], "a").await.unwrap();
    peer1
        .atomic
        .link("r", &["a".to_string()], "b", key, data.len() as u64)
        .await
        .unwrap();
    let root_key = peer1.atomic.get_root("r").await;

    let stats = tokio::task::spawn_blocking({
        let cache = peer1.cache.clone();
        let backend = backend.clone();
        move || {
            push(
                root_key,
                cache.as_ref() as &dyn ChunkService,
                backend.as_ref() as &dyn ChunkService,
            )
        }
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(stats.transferred, 3); // root dir + "a" dir + file chunk
    assert_eq!(stats.already_present, 0);

    tags.set("tag", Some(root_key)).await.unwrap();

    let fetched_root = tags.get("tag").await.unwrap().expect("tag should be set");
    assert_eq!(fetched_root, root_key);

    tokio::task::spawn_blocking({
        let backend = backend.clone();
        let cache = peer2.cache.clone();
        move || {
            pull(
                fetched_root,
                backend.as_ref() as &dyn ChunkService,
                cache.as_ref() as &dyn ChunkService,
            )
        }
    })
    .await
    .unwrap()
    .unwrap();
    peer2.atomic.register_root("z", fetched_root).await;

    let meta = peer2.atomic.stat("z", &["a".to_string()], "b").await.unwrap();
    assert_eq!(meta.key, key);

    let bytes = peer2.cache.get(&key).unwrap().as_bytes().unwrap();
    assert_eq!(&bytes[..], data);
}

// ── S5: lease lifecycle over the real RPC surface ────────────────────────────

#[tokio::test]
async fn s5_lease_lifecycle_through_the_rpc_surface() {
    let (tags, _backend) = spawn_root(temp_dir("vault-it-s5-root")).await;

    let k1 = Key::of(b"K1");
    let k2 = Key::of(b"K2");
    let k3 = Key::of(b"K3");

    tags.add_lease(1, k1).await.unwrap();
    tags.add_lease(2, k2).await.unwrap();
    tags.add_lease(30, k3).await.unwrap();

    // Exercise the Gc RPC end to end; at this point none of the leases
    // the server just stamped (now + timeout) have expired yet, so
    // nothing should be reachable-but-freed as a side effect.
    tags.gc().await.unwrap();
}

// ── S6: GC over the RPC surface preserves reachable, frees unreachable ──────

#[tokio::test]
async fn s6_gc_over_rpc_preserves_reachable_and_frees_unreachable() {
    let root_dir = temp_dir("vault-it-s6-root");
    let (tags, backend) = spawn_root(root_dir).await;
    let minion = spawn_minion("s6", backend.clone());

    let f1 = Key::of(b"F1");
    let f2 = Key::of(b"F2");
    let f3 = Key::of(b"F3");
    minion.cache.put_local(&f1, Arc::new(MemResource::new(&b"F1"[..]))).unwrap();

    minion.atomic.mkdir("l1", &[], "d").await.unwrap();
    minion
        .atomic
        .link("l1", &["d".to_string()], "f1", f1, 2)
        .await
        .unwrap();
    let root_key = minion.atomic.get_root("l1").await;

    tokio::task::spawn_blocking({
        let cache = minion.cache.clone();
        let backend = backend.clone();
        move || {
            push(
                root_key,
                cache.as_ref() as &dyn ChunkService,
                backend.as_ref() as &dyn ChunkService,
            )
        }
    })
    .await
    .unwrap()
    .unwrap();

    tags.set("L1", Some(root_key)).await.unwrap();

    // F2 and F3 are written straight to the shared backend without ever
    // being linked under any label — orphans a prior partial operation
    // might have left behind.
    backend.put(&f2, &MemResource::new(&b"F2"[..])).unwrap();
    backend.put(&f3, &MemResource::new(&b"F3"[..])).unwrap();

    tags.gc().await.unwrap();

    assert!(backend.get(&f1).is_ok(), "reachable file must survive GC");
    assert!(backend.get(&root_key).is_ok(), "reachable directory must survive GC");
    assert!(backend.get(&f2).is_err(), "unreachable F2 must be freed");
    assert!(backend.get(&f3).is_err(), "unreachable F3 must be freed");
}

// ── S2: directory listing ordering (sanity check against real AtomicState) ──

#[tokio::test]
async fn s2_directory_listing_is_sorted_by_name() {
    let (_tags, backend) = spawn_root(temp_dir("vault-it-s2-root")).await;
    let minion = spawn_minion("s2", backend);

    minion.atomic.mkdir("r", &[], "a").await.unwrap();
    minion.atomic.mkdir("r", &[], "c").await.unwrap();
    minion.atomic.mkdir("r", &[], "b").await.unwrap();

    let entries = minion.atomic.list("r", &[]).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}
