//! The root service's append-only recovery log.
//!
//! Every label write and lease grant is appended here before it takes
//! effect in memory, so a restart can rebuild `Roots` by replaying the
//! file from the start. Framing is the same 2-byte length prefix used
//! by the minion↔root RPC wire (`vault_core::wire`), just written
//! directly to a file instead of a socket.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use vault_core::error::{Result, VaultError};
use vault_core::key::Key;
use vault_core::wire::{read_frame, write_frame};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    Label { label: String, key: Option<Key> },
    Lease { key: Key, expiry_unix_secs: u64 },
}

pub struct Log {
    file: File,
}

impl Log {
    /// Open (creating if absent) the log at `path`, replaying every
    /// existing record through `on_record` before returning.
    pub fn open(path: &Path, mut on_record: impl FnMut(&LogRecord)) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        {
            let read_file = OpenOptions::new().read(true).open(path);
            if let Ok(read_file) = read_file {
                let mut reader = BufReader::new(read_file);
                loop {
                    let body = match read_frame(&mut reader) {
                        Ok(body) => body,
                        Err(_) => break,
                    };
                    let record: LogRecord = bincode::deserialize(&body)
                        .map_err(|e| VaultError::Corruption(e.to_string()))?;
                    on_record(&record);
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        Ok(Self { file })
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let body = bincode::serialize(record).map_err(|e| VaultError::Corruption(e.to_string()))?;
        write_frame(&mut self.file, &body).map_err(|e| VaultError::Corruption(e.to_string()))?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_log_path() -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("vault-root-log-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("roots-{id}.log"))
    }

    #[test]
    fn append_then_replay_reconstructs_records() {
        let path = temp_log_path();
        let key = Key::of(b"replayed");

        {
            let mut log = Log::open(&path, |_| panic!("log should be empty on first open")).unwrap();
            log.append(&LogRecord::Label {
                label: "main".into(),
                key: Some(key),
            })
            .unwrap();
            log.append(&LogRecord::Lease {
                key,
                expiry_unix_secs: 1000,
            })
            .unwrap();
        }

        let mut replayed = Vec::new();
        let _log = Log::open(&path, |record| replayed.push(record.clone())).unwrap();

        assert_eq!(replayed.len(), 2);
        match &replayed[0] {
            LogRecord::Label { label, key: k } => {
                assert_eq!(label, "main");
                assert_eq!(*k, Some(key));
            }
            _ => panic!("wrong variant"),
        }
        match &replayed[1] {
            LogRecord::Lease { key: k, expiry_unix_secs } => {
                assert_eq!(*k, key);
                assert_eq!(*expiry_unix_secs, 1000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn label_removal_is_recorded_with_no_key() {
        let path = temp_log_path();
        {
            let mut log = Log::open(&path, |_| {}).unwrap();
            log.append(&LogRecord::Label {
                label: "gone".into(),
                key: None,
            })
            .unwrap();
        }

        let mut replayed = Vec::new();
        let _log = Log::open(&path, |record| replayed.push(record.clone())).unwrap();
        match &replayed[0] {
            LogRecord::Label { label, key } => {
                assert_eq!(label, "gone");
                assert_eq!(*key, None);
            }
            _ => panic!("wrong variant"),
        }
    }
}
