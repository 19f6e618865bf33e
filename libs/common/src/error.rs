//! Error types shared by the ExamMaster services
//!
//! Storage backends report failures through [`DatabaseError`] so callers can
//! tell a uniqueness conflict or a missing row apart from infrastructure
//! trouble.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// A unique constraint rejected the write
    #[error("Conflicting record: {0}")]
    Conflict(String),

    /// The targeted row does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into its domain type
    #[error("Corrupt record: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Classify a query error, surfacing unique violations as [`DatabaseError::Conflict`]
    pub fn from_query(err: SqlxError) -> Self {
        if let SqlxError::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return DatabaseError::Conflict(db_err.message().to_string());
            }
        }
        DatabaseError::Query(err)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
