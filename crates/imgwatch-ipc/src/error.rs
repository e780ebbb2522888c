//! IPC Error types

use crate::ErrorCode;
use thiserror::Error;

/// Errors that can occur during IPC operations
#[derive(Debug, Error)]
pub enum IpcError {
    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message size exceeded maximum
    #[error("Message too large (max 128MB)")]
    RequestTooLarge,

    /// Failed to deserialize message
    #[error("Deserialization failed: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    /// Failed to serialize message
    #[error("Serialization failed: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    /// Request timed out
    #[error("Request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Daemon not running
    #[error("Daemon not running (nothing listening on {0})")]
    DaemonNotRunning(String),

    /// Daemon answered with an error response
    #[error("Daemon error ({code:?}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// Daemon answered with a response of the wrong shape
    #[error("Unexpected response")]
    UnexpectedResponse,
}
