//! Error handling module for wplive.
//!
//! Provides a single error type shared by the loader, the metadata core and the watcher.

use crate::models::TermId;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const MALFORMED_SNAPSHOT: &str = "MALFORMED_SNAPSHOT";
    pub const DUPLICATE_TERM: &str = "DUPLICATE_TERM";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Database error
    Database(String),
    /// A term snapshot that breaks the term graph invariants
    MalformedSnapshot(String),
    /// The same term id appeared twice while building one snapshot
    DuplicateTerm(TermId),
    /// Invalid configuration
    Config(String),
    /// Row not found
    NotFound(String),
}

impl AppError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::MalformedSnapshot(_) => codes::MALFORMED_SNAPSHOT,
            AppError::DuplicateTerm(_) => codes::DUPLICATE_TERM,
            AppError::Config(_) => codes::CONFIG_ERROR,
            AppError::NotFound(_) => codes::NOT_FOUND,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Database(msg) => msg.clone(),
            AppError::MalformedSnapshot(msg) => msg.clone(),
            AppError::DuplicateTerm(id) => format!("Term {} appears more than once", id),
            AppError::Config(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = AppError::DuplicateTerm(7);
        assert_eq!(err.to_string(), "DUPLICATE_TERM: Term 7 appears more than once");

        let err = AppError::MalformedSnapshot("Term 3 has unknown parent 9".to_string());
        assert_eq!(err.error_code(), codes::MALFORMED_SNAPSHOT);
    }
}
