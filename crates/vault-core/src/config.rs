//! Configuration for the minion daemon and the root service.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $VAULT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/vault/config.toml
//!   3. ~/.config/vault/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a minion (the per-host daemon owning an `AtomicState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinionConfig {
    /// `host:port` of the root service.
    pub root_address: String,
    /// Shared secret used in the minion↔root auth handshake.
    pub auth_secret: String,
    /// Local chunk cache directory.
    pub cache_dir: PathBuf,
    /// Address the client-facing HTTP IPC surface binds to.
    pub ipc_bind: String,
    pub ipc_port: u16,
    /// Chunk backend shared with every other minion and the root
    /// service's GC. Chunk bytes never flow through the root service —
    /// only root/lease metadata does — so minions talk to the backend
    /// directly, same as `RootConfig.backend`.
    pub backend: BackendConfig,
}

impl Default for MinionConfig {
    fn default() -> Self {
        Self {
            root_address: "127.0.0.1:7420".to_string(),
            auth_secret: String::new(),
            cache_dir: data_dir().join("cache"),
            ipc_bind: "127.0.0.1".to_string(),
            ipc_port: 7421,
            backend: BackendConfig::default(),
        }
    }
}

/// Configuration for the root service (label/lease registry + GC + backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    pub backend: BackendConfig,
    pub tcp_port: u16,
    pub persist_log_path: PathBuf,
    pub auth_secret: String,
    /// Minimum age (seconds) a chunk must have before GC may free it, to
    /// cover the window between a chunk's upload and its root pointer
    /// update. See the GC module doc comment for the full rationale.
    pub gc_upload_window_secs: u64,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            tcp_port: 7420,
            persist_log_path: data_dir().join("roots.log"),
            auth_secret: String::new(),
            gc_upload_window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub bucket: String,
    pub prefix: String,
    /// Directory used by the file-backed reference `LocalBlobStore`
    /// implementation. Unused credentials above are still modeled as
    /// config fields for a real object-store backend to read.
    pub backend_root: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: String::new(),
            bucket: String::new(),
            prefix: String::new(),
            backend_root: data_dir().join("backend"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("vault")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("vault")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

macro_rules! config_loader {
    ($ty:ty, $file_env:expr, $file_name:expr) => {
        impl $ty {
            pub fn load() -> Result<Self, ConfigError> {
                let path = Self::file_path();
                let config = if path.exists() {
                    let text = std::fs::read_to_string(&path)
                        .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
                    toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
                } else {
                    <$ty>::default()
                };
                Ok(config)
            }

            pub fn file_path() -> PathBuf {
                std::env::var($file_env)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| config_dir().join($file_name))
            }

            pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
                let path = Self::file_path();
                if !path.exists() {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
                    }
                    let text = toml::to_string_pretty(&<$ty>::default())
                        .map_err(ConfigError::SerializeFailed)?;
                    std::fs::write(&path, text)
                        .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
                }
                Ok(path)
            }
        }
    };
}

config_loader!(MinionConfig, "VAULT_MINION_CONFIG", "minion.toml");
config_loader!(RootConfig, "VAULT_ROOT_CONFIG", "root.toml");
