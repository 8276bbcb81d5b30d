//! The root service's TCP RPC listener.
//!
//! One task per connection. Every connection must complete the
//! minion↔root challenge-response handshake before its first RPC frame
//! is accepted; a failed or skipped handshake gets the connection
//! closed. Grounded on `tagsvc/service.go`'s `listenForever`/
//! `handleConnection`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use vault_core::wire::{
    compute_response, random_challenge, RootRequest, RootResponse, CHALLENGE_SIZE, GREETING,
};
use vault_services::chunk_service::{ChunkService, IterableChunkService, LocalBlobStore};

use crate::roots::{gc_directory_service, Roots};

pub struct RpcServer {
    pub roots: Arc<Roots>,
    pub backend: Arc<LocalBlobStore>,
    pub auth_secret: String,
    pub gc_scratch_dir: std::path::PathBuf,
}

impl RpcServer {
    pub async fn serve(self: Arc<Self>, bind_addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(addr = bind_addr, "root RPC listener started");

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    tracing::warn!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        if !self.authenticate(&mut stream).await? {
            tracing::warn!("rejecting connection: auth handshake failed");
            send_response(&mut stream, &RootResponse::Error("authentication failed".into())).await?;
            return Ok(());
        }
        send_response(&mut stream, &RootResponse::Ok).await?;

        loop {
            let request: RootRequest = match read_request(&mut stream).await {
                Ok(req) => req,
                Err(_) => return Ok(()), // peer closed the connection
            };
            let response = self.dispatch(request);
            send_response(&mut stream, &response).await?;
        }
    }

    async fn authenticate(&self, stream: &mut TcpStream) -> std::io::Result<bool> {
        let mut greeting = [0u8; GREETING.len()];
        stream.read_exact(&mut greeting).await?;
        if greeting != *GREETING {
            return Ok(false);
        }

        let mut client_challenge = [0u8; CHALLENGE_SIZE];
        stream.read_exact(&mut client_challenge).await?;

        let server_challenge = random_challenge();
        stream.write_all(&server_challenge).await?;

        let mut response = [0u8; 16];
        stream.read_exact(&mut response).await?;

        let expected = compute_response(self.auth_secret.as_bytes(), &client_challenge, &server_challenge);
        Ok(response == expected)
    }

    fn dispatch(&self, request: RootRequest) -> RootResponse {
        match request {
            RootRequest::Set { label, key } => match self.roots.set(&label, key) {
                Ok(()) => RootResponse::Ok,
                Err(e) => RootResponse::Error(e.to_string()),
            },
            RootRequest::Get { label } => RootResponse::Key(self.roots.get(&label)),
            RootRequest::GetAll => RootResponse::Named(self.roots.get_named_roots()),
            RootRequest::AddLease { timeout_secs, key } => {
                let expiry = now_unix_secs() + timeout_secs;
                match self.roots.add_lease(expiry, key) {
                    Ok(()) => RootResponse::Ok,
                    Err(e) => RootResponse::Error(e.to_string()),
                }
            }
            RootRequest::Gc => match self.run_gc() {
                Ok(freed) => {
                    tracing::info!(freed, "GC sweep complete");
                    RootResponse::Ok
                }
                Err(e) => RootResponse::Error(e.to_string()),
            },
        }
    }

    fn run_gc(&self) -> vault_core::error::Result<usize> {
        let dirs = gc_directory_service(self.backend.clone(), &self.gc_scratch_dir)?;
        let backend = self.backend.clone();
        self.roots.gc(
            now_unix_secs(),
            &dirs,
            backend.as_ref() as &dyn IterableChunkService,
            |key| {
                if let Err(e) = backend.delete(&key) {
                    tracing::warn!(key = %key, error = %e, "failed to delete unreachable chunk");
                } else {
                    tracing::debug!(key = %key, "freed unreachable chunk");
                }
            },
        )
    }
}

fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<RootRequest> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    bincode::deserialize(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn send_response(stream: &mut TcpStream, response: &RootResponse) -> std::io::Result<()> {
    let body = bincode::serialize(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = body.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&body).await?;
    Ok(())
}
