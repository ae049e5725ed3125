//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Reads never produce these: a missing or unreadable entry is a miss.
/// They surface from initialization and from writes.
#[derive(Error, Debug)]
pub enum CacheError {
    /// File-system failure on a cache path
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Value or key parameters could not be serialized
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The source file tied to an entry could not be stat'ed
    #[error("source file unavailable {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization {
            reason: err.to_string(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
