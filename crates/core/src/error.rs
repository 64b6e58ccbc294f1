//! Error types for the headcount core

use thiserror::Error;

/// Result type alias for headcount core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the headcount core
#[derive(Debug, Error)]
pub enum Error {
    /// Job parameters rejected before any processing started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The frame source could not be opened (file unreadable, stream unreachable)
    #[error("Failed to open source '{source_desc}': {reason}")]
    SourceOpen {
        /// Filename or URL that failed to open
        source_desc: String,
        /// Why the open failed
        reason: String,
    },

    /// The frame source failed mid-run (decoder died, pipe broke)
    #[error("Source read error: {0}")]
    SourceRead(String),

    /// The external detection primitive reported a failure
    #[error("Detection failed: {0}")]
    Detection(String),

    /// Lookup of an unknown job id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the source never produced a frame
    pub fn is_source_open(&self) -> bool {
        matches!(self, Error::SourceOpen { .. })
    }
}
