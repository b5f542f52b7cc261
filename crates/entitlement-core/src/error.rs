//! Core error types.

use thiserror::Error;

/// Error type for parsing persisted domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A stored trigger id that is not part of the registry.
    #[error("Unknown trigger id: {0}")]
    UnknownTrigger(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
