//! Error types for tornet
//!
//! This module defines all error types used throughout the workspace.
//! Only [`Error::Config`] is fatal; everything else is reported by the
//! component that hit it and the surrounding loop moves on.

use thiserror::Error;

/// Result type alias for tornet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tornet
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed interval, count, country list or other startup settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Probe timeout, unreachable endpoint, non-2xx status or unusable body
    #[error("Network error: {0}")]
    Network(String),

    /// Reload/start/stop request to the relay daemon failed
    #[error("Relay control error: {0}")]
    RelayControl(String),

    /// The relay is not running but the operation requires it
    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    /// Local I/O errors (torrc writes, process spawning)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a relay control error
    pub fn relay_control(msg: impl Into<String>) -> Self {
        Self::RelayControl(msg.into())
    }

    /// Create a relay unavailable error
    pub fn relay_unavailable(msg: impl Into<String>) -> Self {
        Self::RelayUnavailable(msg.into())
    }

    /// Whether the caller may log this error and carry on
    ///
    /// Configuration errors are the only class that must stop startup.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
