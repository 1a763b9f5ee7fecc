//! NPJWI client error types.
//!
//! These are errors returned to the *caller* of the library. Errors reported
//! by the server inside an `Error` frame are not Rust errors: they are
//! classified by [`crate::classifier`] and surfaced as
//! [`ClientEvent::Error`](crate::events::ClientEvent::Error).

use thiserror::Error;

use crate::protocol::FrameError;

/// NPJWI client errors.
#[derive(Error, Debug)]
pub enum NpjwiError {
    /// No server endpoint has been configured.
    #[error("Client not initialized: no server endpoint configured")]
    NotInitialized,

    /// Operation requires a connected session.
    #[error("Not connected to server")]
    NotConnected,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Endpoint (or environment alias) could not be resolved to a URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Response body could not be turned into a frame.
    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] FrameError),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Exchange did not complete in time.
    #[error("Request timed out")]
    Timeout,

    /// Server answered with a non-success HTTP status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The engine task is no longer running.
    #[error("Engine stopped")]
    EngineStopped,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for NPJWI operations
pub type Result<T> = std::result::Result<T, NpjwiError>;

impl From<reqwest::Error> for NpjwiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NpjwiError::Timeout
        } else {
            NpjwiError::Network(err.to_string())
        }
    }
}

impl From<toml::de::Error> for NpjwiError {
    fn from(err: toml::de::Error) -> Self {
        NpjwiError::Config(format!("Failed to parse config: {err}"))
    }
}
