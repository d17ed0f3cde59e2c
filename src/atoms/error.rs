// Relaymux Atoms: Error Types
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Transport, Protocol…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries secret material (relay auth tokens, AEAD keys) in its message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Upstream websocket transport failure (connect/read/write/close).
    #[error("Transport error: {relay}: {message}")]
    Transport { relay: String, message: String },

    /// Malformed or unknown wire frame; never tears down a session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Schnorr/NIP-04 crypto failure.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Admin HTTP request is malformed or unauthorized.
    #[error("Admin error: {0}")]
    Admin(String),

    /// Engine or process configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    pub fn transport(relay: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { relay: relay.into(), message: message.into() }
    }
}

impl From<String> for RelayError {
    fn from(s: String) -> Self {
        RelayError::Other(s)
    }
}

impl From<&str> for RelayError {
    fn from(s: &str) -> Self {
        RelayError::Other(s.to_string())
    }
}

/// All engine operations should return this type.
pub type RelayResult<T> = Result<T, RelayError>;
