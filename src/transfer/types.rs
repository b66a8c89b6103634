//! Transfer types for the file channel protocol

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Chunk size used when a request carries the `-1` length sentinel: 8KB
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Length value meaning "use the default chunk size"
pub const DEFAULT_LENGTH_SENTINEL: i32 = -1;

/// Largest chunk a single request may ask for: 16MB
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Period of the idle reaper
pub const REAPER_PERIOD: Duration = Duration::from_millis(1000);

/// Inactivity after which an open transfer is evicted
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

// ============================================================================
// Transfer Key
// ============================================================================

/// Identity of an in-flight transfer on a channel (`"{path}/{name}"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferKey(String);

impl TransferKey {
    pub fn new(file_path: &str, file_name: &str) -> Self {
        Self(format!("{}/{}", file_path, file_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Client request for one chunk of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequest {
    /// Directory part of the file location
    pub file_path: String,

    /// File name within `file_path`
    pub file_name: String,

    /// Byte offset to read from
    pub offset: i64,

    /// Requested byte count, or `-1` for the default chunk size
    pub length: i32,
}

/// Validated byte range of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: u64,
    pub length: usize,
}

impl FileRequest {
    pub fn new(file_path: impl Into<String>, file_name: impl Into<String>, offset: i64, length: i32) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            offset,
            length,
        }
    }

    /// Transfer key this request belongs to
    pub fn key(&self) -> TransferKey {
        TransferKey::new(&self.file_path, &self.file_name)
    }

    /// Check the request and resolve the effective chunk range.
    ///
    /// The `-1` sentinel resolves to [`DEFAULT_CHUNK_SIZE`].
    pub fn chunk_range(&self) -> Result<ChunkRange, TransferError> {
        if self.file_name.is_empty() {
            return Err(TransferError::InvalidRequest("file name is empty".to_string()));
        }

        let offset = u64::try_from(self.offset).map_err(|_| {
            TransferError::InvalidRequest(format!("negative offset {}", self.offset))
        })?;

        let length = match self.length {
            DEFAULT_LENGTH_SENTINEL => DEFAULT_CHUNK_SIZE,
            len if len < 0 => {
                return Err(TransferError::InvalidRequest(format!("negative length {}", len)));
            }
            len => len as usize,
        };

        if length > MAX_CHUNK_SIZE {
            return Err(TransferError::InvalidRequest(format!(
                "chunk length {} exceeds maximum {}",
                length, MAX_CHUNK_SIZE
            )));
        }

        Ok(ChunkRange { offset, length })
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// One chunk of file data sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub file_path: String,
    pub file_name: String,
    pub offset: i64,

    /// Effective requested length, always equal to `data.len()`
    pub length: i32,

    /// File length observed when this chunk was read
    pub total_file_length: i64,

    /// Bytes from `offset`, zero-filled past end of file
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Severity of a [`LogEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Human-readable event sent to the client in place of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

// ============================================================================
// Wire Envelopes
// ============================================================================

/// Messages a client sends to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    FileRequest(FileRequest),
}

/// Messages the server sends to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    FileChunk(FileChunk),
    LogEvent(LogEvent),
}

impl From<FileChunk> for ServerMessage {
    fn from(chunk: FileChunk) -> Self {
        Self::FileChunk(chunk)
    }
}

impl From<LogEvent> for ServerMessage {
    fn from(event: LogEvent) -> Self {
        Self::LogEvent(event)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Point-in-time view of one registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub key: TransferKey,
    pub completed_bytes: u64,
    pub idle: Duration,
}

/// Outcome of closing a batch of entries (reaper sweep or channel teardown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries removed from the registry
    pub closed: usize,

    /// Entries whose handle reported an error while closing
    pub failed: usize,
}

// ============================================================================
// Error Types
// ============================================================================

/// Per-request and per-entry transfer errors
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid file request: {0}")]
    InvalidRequest(String),

    #[error("Path rejected: {0}")]
    PathRejected(String),

    #[error("Failed to open {key}: {source}")]
    Open {
        key: TransferKey,
        source: std::io::Error,
    },

    #[error("Failed to read {key}: {source}")]
    Read {
        key: TransferKey,
        source: std::io::Error,
    },

    #[error("Failed to close {key}: {source}")]
    Close {
        key: TransferKey,
        source: std::io::Error,
    },
}

// ============================================================================
// Helpers
// ============================================================================

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
