//! File Sources
//!
//! Opens read handles for transfer keys. The registry owns every handle a
//! source hands out and is the only place that closes them.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::types::{TransferError, TransferKey};

// ============================================================================
// Source Traits
// ============================================================================

/// An open, read-only handle to one file
#[async_trait::async_trait]
pub trait ReadHandle: Send + 'static {
    /// Read into `buf` starting at `offset`, stopping early only at end of file.
    ///
    /// Returns the number of bytes read.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Current length of the underlying file
    async fn file_length(&mut self) -> std::io::Result<u64>;

    /// Release the handle
    async fn close(self) -> std::io::Result<()>;
}

/// Trait for backends that can open files by transfer key
#[async_trait::async_trait]
pub trait FileSource: Send + Sync + 'static {
    type Handle: ReadHandle;

    /// Open `key` for reading; the file must already exist
    async fn open(&self, key: &TransferKey) -> Result<Self::Handle, TransferError>;
}

// ============================================================================
// Local Filesystem Source
// ============================================================================

/// Opens files from the local filesystem, optionally confined to a root
#[derive(Debug, Clone, Default)]
pub struct LocalFileSource {
    root: Option<PathBuf>,
}

impl LocalFileSource {
    /// Use transfer keys as local paths verbatim
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve transfer keys beneath `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, key: &TransferKey) -> Result<PathBuf, TransferError> {
        let Some(root) = &self.root else {
            return Ok(PathBuf::from(key.as_str()));
        };

        let relative = Path::new(key.as_str().trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(TransferError::PathRejected(format!(
                "{} escapes the serving root",
                key
            )));
        }

        Ok(root.join(relative))
    }
}

#[async_trait::async_trait]
impl FileSource for LocalFileSource {
    type Handle = LocalReadHandle;

    async fn open(&self, key: &TransferKey) -> Result<LocalReadHandle, TransferError> {
        let path = self.resolve(key)?;
        let open_error = |source: std::io::Error| TransferError::Open {
            key: key.clone(),
            source,
        };

        let file = File::open(&path).await.map_err(open_error)?;
        let metadata = file.metadata().await.map_err(open_error)?;
        if !metadata.is_file() {
            return Err(open_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        tracing::debug!(key = %key, path = %path.display(), "Opened file for reading");

        Ok(LocalReadHandle { file })
    }
}

/// Read handle backed by a tokio file
#[derive(Debug)]
pub struct LocalReadHandle {
    file: File,
}

#[async_trait::async_trait]
impl ReadHandle for LocalReadHandle {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset)).await?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(filled)
    }

    async fn file_length(&mut self) -> std::io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    async fn close(self) -> std::io::Result<()> {
        // Waits for any in-flight operation before the descriptor is dropped
        let file = self.file.into_std().await;
        drop(file);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
