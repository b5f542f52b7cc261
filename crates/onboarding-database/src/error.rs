//! Errors raised by the SQLite layer.

use thiserror::Error;

/// Anything that can go wrong reading or writing onboarding state.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The executor thread is gone or refused the call.
    #[error("Executor unavailable: {0}")]
    Connection(String),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// A row that must exist was missing.
    #[error("Missing row: {0}")]
    NotFound(String),

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt stored value: {0}")]
    InvalidData(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_errors_convert() {
        let err: DatabaseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DatabaseError::Sqlite(_)));
    }

    #[test]
    fn invalid_data_display() {
        let err = DatabaseError::InvalidData("claimed_at".to_string());
        assert_eq!(err.to_string(), "Corrupt stored value: claimed_at");
    }
}
