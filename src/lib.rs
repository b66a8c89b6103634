//! File Channel Server Library
//!
//! Serves byte ranges of local files to clients over persistent connections.
//! Each connection owns a channel actor that caches open read handles per
//! transfer and reclaims them on completion, idle timeout or disconnect.
//!
//! # Modules
//!
//! - `transfer`: Transfer registry, chunk handler and the per-connection channel
//! - `codec`: Length-prefixed JSON framing for the wire protocol
//! - `server`: TCP listener wiring connections to channels
//! - `config`: Environment-driven configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod server;
pub mod transfer;

pub use config::Config;
pub use error::{Result, ServerError};
pub use server::FileServer;
