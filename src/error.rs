//! Error types for the file channel server
//!
//! Transfer failures ([`crate::transfer::TransferError`]) are answered on the
//! channel itself; the errors here concern the listener and the wire.

use thiserror::Error;

/// Server-wide result type
pub type Result<T> = std::result::Result<T, ServerError>;

/// Listener, framing and configuration errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
