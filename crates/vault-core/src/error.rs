//! The unified error type for the versioned filesystem.
//!
//! Every fallible operation across `vault-services`, `vaultd`, `vault-api`,
//! `vault-root`, and `vault-ctl` returns `Result<_, VaultError>` (or wraps
//! one with `anyhow` at the binary boundary). Constructors never coerce a
//! `NoSuchTag`/`NoSuchPath` into `IoError` — callers match explicitly so
//! the distinction survives across the RPC boundary.

use crate::key::Key;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("no such path: {0}")]
    NoSuchPath(String),

    #[error("no such tag: {0}")]
    NoSuchTag(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("chunk missing from cache: {0}")]
    ChunkMissing(Key),

    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("authentication failed")]
    AuthFailure,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corruption detected: {0}")]
    Corruption(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
