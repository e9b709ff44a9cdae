//! Error types for the local store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite query or transaction error
    #[error("SQLite error")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored column could not be parsed back into its domain type
    #[error("Corrupt value '{value}' in column {column}")]
    Corrupt { column: &'static str, value: String },

    /// Integer does not fit in a SQLite INTEGER column
    #[error("Value {0} does not fit in a SQLite integer")]
    OutOfRange(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;
