//! Error types for scenedeps

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Caller contract violation (duplicate add, unmatched remove, nil id)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The tracker was used after `close()`
    #[error("Tracker has been closed")]
    Disposed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),
}
