//! vaultd — the per-host minion daemon: owns an `AtomicState` over the
//! local chunk cache, keeps it in sync with the root service's labels,
//! and serves the client IPC surface vault-ctl talks to.

use std::sync::Arc;

use vault_api::ApiState;
use vault_core::config::MinionConfig;
use vault_services::cache_db::PersistentCacheDB;
use vault_services::chunk_cache::ChunkCache;
use vault_services::chunk_service::LocalBlobStore;
use vault_services::directory_service::DirectoryService;
use vault_services::tag_service::TagService;
use vault_services::AtomicState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = MinionConfig::load()?;
    tracing::info!(root_address = %config.root_address, ipc_port = config.ipc_port, "starting vaultd");

    let local = Arc::new(PersistentCacheDB::open(&config.cache_dir)?);
    let backend = Arc::new(LocalBlobStore::new(&config.backend.backend_root)?);
    let cache = Arc::new(ChunkCache::new(local, backend.clone()));
    let dirs = Arc::new(DirectoryService::new(cache.clone()));
    let atomic = Arc::new(AtomicState::new(dirs));
    let tags = Arc::new(TagService::new(config.root_address.clone(), config.auth_secret.clone()));

    sync_known_labels(&atomic, &tags).await;

    let state = ApiState {
        atomic,
        cache,
        backend,
        tags,
    };

    vault_api::serve(state, &config.ipc_bind, config.ipc_port).await
}

/// Seed the in-memory `AtomicState` with whatever labels the root
/// service already knows about, so a freshly started minion can stat or
/// list an existing root before its first mutation.
async fn sync_known_labels(atomic: &Arc<AtomicState<PersistentCacheDB, LocalBlobStore>>, tags: &Arc<TagService>) {
    match tags.get_all().await {
        Ok(labels) => {
            for (label, key) in labels {
                atomic.register_root(&label, key).await;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not reach root service at startup; starting with empty roots");
        }
    }
}
