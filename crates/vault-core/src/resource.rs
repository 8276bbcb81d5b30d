//! `Resource` — an abstraction over a chunk's bytes, regardless of whether
//! they live in memory or on disk.
//!
//! The original design exposes both `AsBytes()` and `GetReader()` on its
//! `Resource` interface: callers that just want the whole blob get it
//! cheaply, callers that want to stream get a fresh sequential reader
//! each time (so one reader being consumed doesn't affect another).

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;

/// A readable chunk of bytes, backed by memory or a file.
pub trait Resource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full contents as a contiguous buffer. Cheap for memory-backed
    /// resources; for file-backed resources this reads (or mmaps) the
    /// whole file.
    fn as_bytes(&self) -> io::Result<Bytes>;

    /// A fresh sequential reader over the resource's bytes. Each call
    /// returns an independent reader positioned at the start.
    fn fresh_reader(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A resource whose bytes already live in memory.
#[derive(Clone)]
pub struct MemResource {
    data: Bytes,
}

impl MemResource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Resource for MemResource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn as_bytes(&self) -> io::Result<Bytes> {
        Ok(self.data.clone())
    }

    fn fresh_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}

/// A resource backed by a file on disk, read via mmap when the whole
/// buffer is requested.
#[derive(Clone)]
pub struct FileResource {
    path: Arc<PathBuf>,
    len: u64,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let len = std::fs::metadata(&path)?.len();
        Ok(Self {
            path: Arc::new(path),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn len(&self) -> u64 {
        self.len
    }

    fn as_bytes(&self) -> io::Result<Bytes> {
        let file = File::open(&*self.path)?;
        if self.len == 0 {
            return Ok(Bytes::new());
        }
        // Safety: the cache never mutates chunk files after they're
        // written, so the mapping is stable for the lifetime of this call.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Bytes::copy_from_slice(&mmap))
    }

    fn fresh_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(&*self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}
