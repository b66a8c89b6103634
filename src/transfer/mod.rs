//! Chunked File Transfers
//!
//! Serves byte ranges of local files with:
//! - One cached read handle per transfer key, reused across requests
//! - Completion once the requested byte total reaches the file length
//! - Idle eviction by a periodic reaper
//! - Full release of every handle when the channel closes
//!
//! Request Flow:
//! 1. Client sends a `FileRequest` (path, name, offset, length)
//! 2. Channel opens or reuses the handle for `"{path}/{name}"`
//! 3. Server reads the range and replies with a `FileChunk`
//! 4. Failures are reported as an ERROR `LogEvent` instead

pub mod channel;
pub mod handler;
pub mod registry;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelClosed, ChannelHandle, FileChannel};
pub use handler::{serve_chunk, ServedChunk};
pub use registry::{TransferEntry, TransferRegistry};
pub use source::{FileSource, LocalFileSource, LocalReadHandle, ReadHandle};
pub use types::*;
