//! Error types for the memory core.

use thiserror::Error;

/// Errors surfaced by the memory subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backend similarity query failed (transport error or timeout).
    /// Propagates to the caller; silently returning empty memories would
    /// misrepresent what the assistant knows.
    #[error("memory retrieval failed: {source}")]
    Retrieval {
        #[source]
        source: anyhow::Error,
    },

    /// An internal cache invariant was violated. The cache layer treats this
    /// as a miss and keeps going; it never reaches the conversational loop.
    #[error("cache inconsistency: {0}")]
    CacheCorruption(String),

    /// Invalid configuration detected at startup. Not recoverable per-call.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A non-query vector store operation (add, clear) failed.
    #[error("vector store operation failed: {0}")]
    Backend(String),
}

impl MemoryError {
    /// Wrap a backend query failure.
    pub fn retrieval(err: impl Into<anyhow::Error>) -> Self {
        Self::Retrieval { source: err.into() }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
