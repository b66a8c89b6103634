//! Configuration management for the file channel server
//!
//! Only the listener address and the serving root are configurable. Chunk
//! size, reaper period and idle timeout are protocol constants.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ServerError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesConfig {
    /// Directory transfer keys are resolved against; keys are used verbatim when unset
    pub root: Option<PathBuf>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 7420,
            },
            files: FilesConfig::default(),
        }
    }
}

impl Config {
    /// Read `SERVER_HOST`, `SERVER_PORT` and `FILE_ROOT`
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let defaults = Config::default();

        let port = match lookup("SERVER_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid SERVER_PORT: {}", raw)))?,
            None => defaults.server.port,
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            files: FilesConfig {
                root: lookup("FILE_ROOT")
                    .filter(|root| !root.is_empty())
                    .map(PathBuf::from),
            },
        })
    }
}
