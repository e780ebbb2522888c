//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during indexing operations.
///
/// Errors returned from `ImageService::watch` are fatal to the watch;
/// per-file failures are logged and absorbed by the scanner and reconciler.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// `watch` called while a watch is already running
    #[error("Already watching: {0}")]
    AlreadyWatching(PathBuf),

    /// File name is not a bare base name
    #[error("Invalid image name: {0:?}")]
    InvalidName(String),
}

impl From<notify::Error> for IndexerError {
    fn from(e: notify::Error) -> Self {
        IndexerError::Watcher(e.to_string())
    }
}
