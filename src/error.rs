//! Cache error types.

use std::fmt;

use thiserror::Error;

use crate::types::Path;

/// Result alias used throughout the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the public cache operations.
///
/// Soft missing fields are not errors; they are reported through
/// [`crate::read::ReadResult::missing`]. Eviction and garbage collection never
/// fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Malformed operation-level cache annotation or invalid cache options.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A raw result does not have the shape of an operation result.
    #[error("malformed result for operation {operation}: {reason}")]
    MalformedResult {
        /// Operation name (or `<anonymous>`).
        operation: String,
        /// What was wrong with the result.
        reason: String,
    },
    /// A non-null field resolved to an undefined value during a read.
    #[error("missing required field at {path} in operation {operation}")]
    MissingRequiredField {
        /// Operation name (or `<anonymous>`).
        operation: String,
        /// Response path of the first offending field.
        path: Path,
    },
}

impl CacheError {
    /// Builds a [`CacheError::Configuration`] from any displayable message.
    pub fn configuration(message: impl Into<String>) -> Self {
        CacheError::Configuration(message.into())
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Configuration(_) => "Configuration",
            CacheError::MalformedResult { .. } => "MalformedResult",
            CacheError::MissingRequiredField { .. } => "MissingRequiredField",
        }
    }
}

/// Convenience wrapper that formats cache errors with their codes.
pub struct CacheErrorWithCode<'a>(pub &'a CacheError);

impl fmt::Display for CacheErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
