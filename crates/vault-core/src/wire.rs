//! Wire format for the minion↔root TCP RPC surface: length-prefixed
//! bincode frames, plus the mutual-challenge auth handshake performed
//! once per connection before any RPC frame is exchanged.
//!
//! Framing matches the root service's append-only log: a 2-byte
//! big-endian length prefix followed by the bincode-encoded body. Using
//! the same prefix width for both the log and the RPC wire keeps one
//! mental model for "how long is this record" across the service.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Key;

// ── Framing ───────────────────────────────────────────────────────────────────

/// Max frame body size — defends against a corrupt length prefix turning
/// into an unbounded allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    FrameTooLong(usize),
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("auth handshake failed")]
    AuthFailed,
}

/// Write a 2-byte big-endian length prefix followed by `body`.
pub fn write_frame(w: &mut impl Write, body: &[u8]) -> Result<(), WireError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLong(body.len()));
    }
    let len = body.len() as u16;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(body)?;
    Ok(())
}

/// Read a length-prefixed frame body.
pub fn read_frame(r: &mut impl Read) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(body)
}

pub fn encode_frame<T: Serialize>(w: &mut impl Write, value: &T) -> Result<(), WireError> {
    let body = bincode::serialize(value)?;
    write_frame(w, &body)
}

pub fn decode_frame<T: for<'de> Deserialize<'de>>(r: &mut impl Read) -> Result<T, WireError> {
    let body = read_frame(r)?;
    Ok(bincode::deserialize(&body)?)
}

// ── Auth handshake ────────────────────────────────────────────────────────────
//
// minion -> root: GREETING, then a 64-byte random client challenge.
// root -> minion: a 64-byte random server challenge.
// minion -> root: MD5(secret || client_challenge || server_challenge).
// root compares against its own computation and either serves RPC frames
// or closes the connection.

pub const CHALLENGE_SIZE: usize = 64;
pub const GREETING: &[u8] = b"vault_minion_v1\n";

pub fn random_challenge() -> [u8; CHALLENGE_SIZE] {
    use rand::RngCore;
    let mut buf = [0u8; CHALLENGE_SIZE];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

pub fn compute_response(secret: &[u8], client: &[u8], server: &[u8]) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(secret);
    hasher.update(client);
    hasher.update(server);
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

// ── RPC surface (minion <-> root) ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RootRequest {
    Set { label: String, key: Option<Key> },
    Get { label: String },
    GetAll,
    AddLease { timeout_secs: u64, key: Key },
    Gc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RootResponse {
    Ok,
    Key(Option<Key>),
    Named(Vec<(String, Key)>),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = io::Cursor::new(buf);
        let out = read_frame(&mut cursor).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn frame_too_long_rejected() {
        let big = vec![0u8; MAX_FRAME_LEN + 1];
        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &big).is_err());
    }

    #[test]
    fn encode_decode_request_roundtrip() {
        let req = RootRequest::Set {
            label: "main".to_string(),
            key: Some(Key::of(b"payload")),
        };
        let mut buf = Vec::new();
        encode_frame(&mut buf, &req).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let decoded: RootRequest = decode_frame(&mut cursor).unwrap();
        match decoded {
            RootRequest::Set { label, key } => {
                assert_eq!(label, "main");
                assert_eq!(key, Some(Key::of(b"payload")));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn compute_response_is_deterministic_and_order_sensitive() {
        let secret = b"sekrit";
        let client = [1u8; CHALLENGE_SIZE];
        let server = [2u8; CHALLENGE_SIZE];
        let r1 = compute_response(secret, &client, &server);
        let r2 = compute_response(secret, &client, &server);
        assert_eq!(r1, r2);

        let swapped = compute_response(secret, &server, &client);
        assert_ne!(r1, swapped);
    }

    #[test]
    fn random_challenge_is_sized_correctly() {
        let c1 = random_challenge();
        let c2 = random_challenge();
        assert_eq!(c1.len(), CHALLENGE_SIZE);
        // Astronomically unlikely to collide.
        assert_ne!(c1, c2);
    }
}
