//! Error types for refcache
//!
//! Contract violations (empty keys, zero sizes, teardown with live handles)
//! panic instead of surfacing here. Only recoverable outcomes are errors.

use std::fmt;

/// Result type alias for refcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by a loader callback
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for cache operations
#[derive(Debug)]
pub enum Error {
    /// Loader failed to produce a value for a missing key
    Load {
        /// Key that was being loaded
        key: String,
        /// Error reported by the loader
        source: BoxError,
    },

    /// Stats report could not be rendered
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Load { key, source } => write!(f, "Failed to load '{}': {}", key, source),
            Error::Json(e) => write!(f, "Stats encoding error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load { source, .. } => Some(source.as_ref()),
            Error::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
