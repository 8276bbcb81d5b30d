//! Content-addressed chunk keys.
//!
//! A `Key` is the SHA-256 digest of a chunk's bytes. Two chunks with
//! identical content always have the same key, which is what lets the
//! store deduplicate across the whole filesystem tree.

use base64::engine::general_purpose::URL_SAFE as BASE64_ENGINE;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

pub const KEY_LEN: usize = 32;

/// A 32-byte content-addressed key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Key(pub [u8; KEY_LEN]);

/// The sentinel key for the empty directory. Never stored in any
/// `ChunkService` — directory lookups short-circuit on it.
///
/// Only the first byte is set; this matches the bit pattern used by the
/// filesystem this design is modeled on, so logs and caches that predate
/// this crate stay interoperable.
pub const EMPTY_DIR_KEY: Key = Key([
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
]);

impl Key {
    /// Compute the content key for a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        Key(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN {
            return None;
        }
        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(bytes);
        Some(Key(out))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn is_empty_dir(&self) -> bool {
        *self == EMPTY_DIR_KEY
    }

    /// Hex identifier, kept around for log lines where a fixed-width,
    /// unambiguous-alphabet form reads better than base-64.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_bytes(&bytes)
    }

    /// The wire/API/blob-namespace string form: a 44-character base-64
    /// encoding (URL-safe alphabet, so the result is also usable verbatim
    /// as a path component or a URL path segment).
    pub fn to_base64(&self) -> String {
        BASE64_ENGINE.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, VaultError> {
        let bytes = BASE64_ENGINE
            .decode(s)
            .map_err(|_| VaultError::InvalidKey(s.to_string()))?;
        Self::from_bytes(&bytes).ok_or_else(|| VaultError::InvalidKey(s.to_string()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_base64())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl FromStr for Key {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, VaultError> {
        Self::from_base64(s)
    }
}

/// Incremental hasher for content that arrives in pieces.
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> Key {
        let digest = self.0.finalize();
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        Key(bytes)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
