//! In-memory file source for tests
//!
//! Counts every open and close so tests can assert that each handle is
//! released exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::source::{FileSource, ReadHandle};
use super::types::{TransferError, TransferKey};

#[derive(Debug, Default)]
pub struct HandleStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl HandleStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.opened() - self.closed()
    }
}

#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<String, Arc<Vec<u8>>>,
    broken: HashSet<String>,
    fail_close: bool,
    stats: Arc<HandleStats>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, key: &str, data: Vec<u8>) -> Self {
        self.files.insert(key.to_string(), Arc::new(data));
        self
    }

    /// Handles for `key` open fine but every read fails
    pub fn with_broken_file(mut self, key: &str, len: usize) -> Self {
        self.broken.insert(key.to_string());
        self.with_file(key, vec![0; len])
    }

    /// Every close reports an error (the handle is still released)
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn stats(&self) -> Arc<HandleStats> {
        self.stats.clone()
    }
}

#[async_trait::async_trait]
impl FileSource for MemorySource {
    type Handle = MemoryHandle;

    async fn open(&self, key: &TransferKey) -> Result<MemoryHandle, TransferError> {
        let data = self.files.get(key.as_str()).cloned().ok_or_else(|| TransferError::Open {
            key: key.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })?;

        self.stats.opened.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryHandle {
            data,
            broken: self.broken.contains(key.as_str()),
            fail_close: self.fail_close,
            stats: self.stats.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryHandle {
    data: Arc<Vec<u8>>,
    broken: bool,
    fail_close: bool,
    stats: Arc<HandleStats>,
}

#[async_trait::async_trait]
impl ReadHandle for MemoryHandle {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.broken {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "device unplugged"));
        }

        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    async fn file_length(&mut self) -> std::io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    async fn close(self) -> std::io::Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}
