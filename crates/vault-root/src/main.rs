//! The root service: the authoritative label/lease registry every
//! minion pushes to and pulls from, plus the mark-sweep GC over the
//! backend's chunk store.

use std::sync::Arc;
use std::time::Duration;

use vault_core::config::RootConfig;
use vault_services::chunk_service::LocalBlobStore;

use vault_root::roots::Roots;
use vault_root::rpc::RpcServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RootConfig::load()?;
    tracing::info!(tcp_port = config.tcp_port, "starting vault-root");

    let backend = Arc::new(LocalBlobStore::new(&config.backend.backend_root)?);
    let roots = Arc::new(Roots::open(&config.persist_log_path)?);

    let gc_scratch_dir = config
        .persist_log_path
        .parent()
        .unwrap_or(std::path::Path::new("."))
        .join("gc-scratch");

    let server = Arc::new(RpcServer {
        roots: roots.clone(),
        backend,
        auth_secret: config.auth_secret.clone(),
        gc_scratch_dir,
    });

    let bind_addr = format!("0.0.0.0:{}", config.tcp_port);
    let listener_server = server.clone();
    let listener_task = tokio::spawn(async move {
        if let Err(e) = listener_server.serve(&bind_addr).await {
            tracing::error!(error = %e, "RPC listener exited");
        }
    });

    let lease_sweep_task = tokio::spawn(lease_expiry_loop(roots.clone()));

    tokio::select! {
        _ = listener_task => {}
        _ = lease_sweep_task => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Periodically drop leases whose absolute expiry (set at `AddLease`
/// time, already `timeout_secs` past the grant) has passed.
async fn lease_expiry_loop(roots: Arc<Roots>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let expired = roots.expire(now);
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "expired leases");
        }
    }
}
