//! Chunk Request Handler
//!
//! Serves one `FileRequest` against the registry: open-or-reuse the handle,
//! read the requested range, account progress and finish the transfer once
//! the requested byte total reaches the file length.

use tokio::time::Instant;

use super::registry::TransferRegistry;
use super::source::{FileSource, ReadHandle};
use super::types::{FileChunk, FileRequest, TransferError};

/// Result of a successfully served request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedChunk {
    /// Response for the client
    pub chunk: FileChunk,

    /// Requested bytes counted for this transfer so far
    pub completed_bytes: u64,

    /// Whether this request completed the transfer and released its handle
    pub finished: bool,
}

/// Serve a single chunk request.
///
/// The chunk always carries `length` bytes of data; anything past end of file
/// is left zeroed. Progress counts the requested length, not the bytes
/// actually read, so a request past end of file still moves the transfer
/// towards completion.
/// On a read failure the entry stays registered; a later request for the
/// same key retries against the same handle.
pub async fn serve_chunk<S: FileSource>(
    registry: &mut TransferRegistry<S::Handle>,
    source: &S,
    request: &FileRequest,
) -> Result<ServedChunk, TransferError> {
    let range = request.chunk_range()?;
    let key = request.key();

    let entry = registry.get_or_open(&key, source, Instant::now()).await?;
    let read_error = |source: std::io::Error| TransferError::Read {
        key: key.clone(),
        source,
    };

    let mut data = vec![0u8; range.length];
    let read = entry
        .handle_mut()
        .read_at(range.offset, &mut data)
        .await
        .map_err(read_error)?;

    let total_file_length = entry.handle_mut().file_length().await.map_err(read_error)?;
    let completed_bytes = entry.record_read(range.length, Instant::now());

    tracing::trace!(
        key = %key,
        offset = range.offset,
        length = range.length,
        read = read,
        completed_bytes = completed_bytes,
        "Served chunk"
    );

    let chunk = FileChunk {
        file_path: request.file_path.clone(),
        file_name: request.file_name.clone(),
        offset: request.offset,
        length: range.length as i32,
        total_file_length: i64::try_from(total_file_length).unwrap_or(i64::MAX),
        data,
    };

    let finished = completed_bytes >= total_file_length;
    if finished {
        match registry.close(&key).await {
            Ok(_) => tracing::info!(
                key = %key,
                total_file_length = total_file_length,
                "File transfer complete"
            ),
            Err(e) => tracing::error!(key = %key, error = %e, "Failed to close completed transfer"),
        }
    }

    Ok(ServedChunk {
        chunk,
        completed_bytes,
        finished,
    })
}

// ============================================================================
// Tests
// ============================================================================
