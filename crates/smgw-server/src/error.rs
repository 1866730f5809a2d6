//! Server error types.

use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (unreadable file, bad index, invalid bind
    /// address). Fatal at startup: fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error. May be transient (peer reset) or fatal
    /// (bind address in use); the message tells which.
    #[error("transport error: {0}")]
    Transport(String),

    /// A peer sent data the protocol layer rejected. Fatal for that
    /// connection only.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Storage failure. Fatal for the node.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<smgw_core::config::ConfigError> for ServerError {
    fn from(err: smgw_core::config::ConfigError) -> Self {
        Self::Storage(err.to_string())
    }
}
