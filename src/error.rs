//! Error types for the memoization toolkit
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache cells, storage backends and the registry.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Requested storage backend is not provided by the host
    #[error("{0}")]
    Configuration(String),

    /// Backend failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored entry is not valid cache JSON
    #[error("Corrupt cache entry under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A registered wrapper exists under the key but has a different type
    #[error("Registry entry '{0}' holds a wrapper of a different type")]
    Registry(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

// == Path Error Enum ==
/// Errors raised while writing through a nested path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Traversal reached a scalar where a container was needed
    #[error("Segment '{0}' does not refer to an object or array")]
    NotAContainer(String),

    /// A non-numeric key was used to index an array
    #[error("Segment '{0}' is not a valid array index")]
    InvalidIndex(String),
}

// == Clone Error Enum ==
/// Errors raised when converting an object graph back to JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloneError {
    /// The graph contains a reference cycle
    #[error("Value graph contains a cycle")]
    Cyclic,
}

// == Memo Error Enum ==
/// Error returned to callers of a memoized function.
///
/// `Call` carries the wrapped function's own error unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoError<E> {
    /// The wrapped function failed
    #[error("Wrapped call failed: {0}")]
    Call(E),

    /// Arguments could not be serialized into a call key
    #[error("Arguments could not be serialized: {0}")]
    Arguments(String),

    /// The in-flight invocation ended without settling (it panicked)
    #[error("In-flight call was abandoned before settling")]
    Abandoned,
}

impl<E> MemoError<E> {
    /// Returns the wrapped function's error, if that is what this is.
    pub fn into_call(self) -> Option<E> {
        match self {
            MemoError::Call(err) => Some(err),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
