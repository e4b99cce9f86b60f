//! Error types for lspwire-core.
//!
//! Session-level failures (spawn, read) are terminal for a session, while
//! `RequestFailed` and `Timeout` only affect the call that issued the request.

use std::path::PathBuf;

use serde_json::Value;

/// The main error type for lspwire-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The argument vector passed to `start` was empty.
    #[error("cannot start a language server from an empty command")]
    EmptyCommand,

    /// Language server failed to spawn.
    #[error("failed to spawn language server '{command}': {source}")]
    SpawnFailed {
        /// Command that failed to spawn.
        command: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Server answered a request with a JSON-RPC error object.
    #[error("request failed: {code} - {message}")]
    RequestFailed {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional payload attached by the server.
        data: Option<Value>,
    },

    /// No response arrived within the allotted window.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Method of the abandoned request.
        method: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// Server process terminated, or its output stream closed.
    #[error("language server process terminated")]
    ServerTerminated,

    /// Server stdio could not be set up.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol violation while framing or classifying a message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A specialized Result type for lspwire-core operations.
pub type Result<T> = std::result::Result<T, Error>;
