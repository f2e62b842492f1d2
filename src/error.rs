//! Error types for the SQLite layer.

use thiserror::Error;

/// Main error type for engine, session and printer operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error reported by SQLite (constraint violations, bad SQL, bad bindings)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (database file management)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table or column name that cannot be used as an identifier
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Column missing from a row
    #[error("Unknown column {column}")]
    UnknownColumn { column: String },

    /// Column holds a value of the wrong type
    #[error("Column {column} is not {expected}")]
    Conversion { column: String, expected: &'static str },

    /// Column default that cannot be written as a SQL literal
    #[error("Invalid column default: {0}")]
    InvalidDefault(String),

    /// Named placeholder in text SQL without a bound value
    #[error("A value is required for bind parameter {0:?}")]
    MissingParameter(String),

    /// Update issued without any assignments
    #[error("Update on table {0} has no assignments")]
    EmptyUpdate(String),

    /// Entity has no primary key yet
    #[error("Record in table {0} has not been persisted")]
    NotPersisted(&'static str),

    /// Entity no longer exists in the database
    #[error("Record {id} not found in table {table}")]
    NotFound { table: &'static str, id: i64 },

    /// Result set was already consumed
    #[error("This result object is closed")]
    ResourceClosed,
}

impl StoreError {
    /// Create a Conversion error
    pub fn conversion(column: impl Into<String>, expected: &'static str) -> Self {
        StoreError::Conversion {
            column: column.into(),
            expected,
        }
    }

    /// Create an UnknownColumn error
    pub fn unknown_column(column: impl Into<String>) -> Self {
        StoreError::UnknownColumn {
            column: column.into(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
