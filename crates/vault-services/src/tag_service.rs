//! `TagService` — the minion's RPC client for the root service.
//!
//! Every minion op that needs the authoritative value of a label, or
//! wants to publish a new one, goes through here: `Set`/`Get`/`GetAll`
//! for label reads and writes, `AddLease` to protect in-flight chunks
//! from GC, `Gc` to request a sweep.
//!
//! One TCP connection is held open and serialized behind a mutex — the
//! root service processes one request at a time per connection, so
//! pipelining would just buffer without helping throughput. Framing
//! mirrors `vault_core::wire`'s length-prefix format but uses Tokio's
//! async I/O traits directly, since the `wire` module's helpers are
//! generic over blocking `std::io::{Read, Write}`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use vault_core::error::{Result, VaultError};
use vault_core::key::Key;
use vault_core::wire::{
    compute_response, random_challenge, RootRequest, RootResponse, CHALLENGE_SIZE, GREETING,
    MAX_FRAME_LEN,
};

async fn write_frame_async(stream: &mut TcpStream, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME_LEN {
        return Err(VaultError::Corruption("frame too long".into()));
    }
    let len = body.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(body).await?;
    Ok(())
}

async fn read_frame_async(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn encode_frame_async(stream: &mut TcpStream, req: &RootRequest) -> Result<()> {
    let body = bincode::serialize(req).map_err(|e| VaultError::Corruption(e.to_string()))?;
    write_frame_async(stream, &body).await
}

async fn decode_response_async(stream: &mut TcpStream) -> Result<RootResponse> {
    let body = read_frame_async(stream).await?;
    bincode::deserialize(&body).map_err(|e| VaultError::Corruption(e.to_string()))
}

/// `TagService` client: owns the connection lifecycle and the
/// minion↔root auth handshake, exposes one async method per RPC.
pub struct TagService {
    address: String,
    auth_secret: String,
    conn: Mutex<Option<TcpStream>>,
}

impl TagService {
    pub fn new(address: impl Into<String>, auth_secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            auth_secret: auth_secret.into(),
            conn: Mutex::new(None),
        }
    }

    async fn connect_and_authenticate(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.address).await?;

        stream.write_all(GREETING).await?;
        let client_challenge = random_challenge();
        stream.write_all(&client_challenge).await?;

        let mut server_challenge = [0u8; CHALLENGE_SIZE];
        stream.read_exact(&mut server_challenge).await?;

        let response = compute_response(self.auth_secret.as_bytes(), &client_challenge, &server_challenge);
        stream.write_all(&response).await?;

        match decode_response_async(&mut stream).await? {
            RootResponse::Ok => Ok(stream),
            RootResponse::Error(_) => Err(VaultError::AuthFailure),
            _ => Err(VaultError::AuthFailure),
        }
    }

    async fn roundtrip(&self, req: RootRequest) -> Result<RootResponse> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_and_authenticate().await?);
        }
        let stream = guard.as_mut().unwrap();

        let result = async {
            encode_frame_async(stream, &req).await?;
            decode_response_async(stream).await
        }
        .await;

        // Any error on an established connection is treated as fatal to
        // that connection; the next call reconnects.
        if result.is_err() {
            *guard = None;
        }
        result
    }

    pub async fn set(&self, label: &str, key: Option<Key>) -> Result<()> {
        match self
            .roundtrip(RootRequest::Set {
                label: label.to_string(),
                key,
            })
            .await?
        {
            RootResponse::Ok => Ok(()),
            RootResponse::Error(msg) => Err(VaultError::NoSuchTag(msg)),
            _ => Err(VaultError::Corruption("unexpected response to Set".into())),
        }
    }

    pub async fn get(&self, label: &str) -> Result<Option<Key>> {
        match self
            .roundtrip(RootRequest::Get {
                label: label.to_string(),
            })
            .await?
        {
            RootResponse::Key(key) => Ok(key),
            RootResponse::Error(msg) => Err(VaultError::NoSuchTag(msg)),
            _ => Err(VaultError::Corruption("unexpected response to Get".into())),
        }
    }

    pub async fn get_all(&self) -> Result<Vec<(String, Key)>> {
        match self.roundtrip(RootRequest::GetAll).await? {
            RootResponse::Named(all) => Ok(all),
            RootResponse::Error(msg) => Err(VaultError::NoSuchTag(msg)),
            _ => Err(VaultError::Corruption("unexpected response to GetAll".into())),
        }
    }

    pub async fn add_lease(&self, timeout_secs: u64, key: Key) -> Result<()> {
        match self
            .roundtrip(RootRequest::AddLease { timeout_secs, key })
            .await?
        {
            RootResponse::Ok => Ok(()),
            RootResponse::Error(msg) => Err(VaultError::Corruption(msg)),
            _ => Err(VaultError::Corruption("unexpected response to AddLease".into())),
        }
    }

    pub async fn gc(&self) -> Result<()> {
        match self.roundtrip(RootRequest::Gc).await? {
            RootResponse::Ok => Ok(()),
            RootResponse::Error(msg) => Err(VaultError::Corruption(msg)),
            _ => Err(VaultError::Corruption("unexpected response to Gc".into())),
        }
    }
}
