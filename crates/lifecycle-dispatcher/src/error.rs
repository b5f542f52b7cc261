//! Dispatcher error types.

use thiserror::Error;

/// Failure of the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] onboarding_database::DatabaseError),

    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure delivering a message to the provider. Always transient from the
/// engine's point of view: the flag is released and a later evaluation retries.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the request
    #[error("Provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Missing credentials or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Send failed for another reason
    #[error("Send failed: {0}")]
    Send(String),
}

/// Result type alias using NotifierError.
pub type NotifierResult<T> = Result<T, NotifierError>;

/// Error returned by the engine's exposed operations.
///
/// Notification failures never appear here; they are released and retried.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),
}

/// Result type alias using DispatchError.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display() {
        let err = NotifierError::Provider {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "Provider error: 429 - rate limited");
    }

    #[test]
    fn store_error_is_transparent_in_dispatch_error() {
        let err: DispatchError = StoreError::Unavailable("disk gone".to_string()).into();
        assert_eq!(err.to_string(), "Store unavailable: disk gone");
    }

    #[test]
    fn user_not_found_display() {
        let err = DispatchError::UserNotFound("user-9".to_string());
        assert_eq!(err.to_string(), "User not found: user-9");
    }
}
