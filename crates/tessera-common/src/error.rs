//! Error types for TesseraDB.

use thiserror::Error;

/// Result type alias using TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Errors that can occur in TesseraDB operations.
#[derive(Debug, Error)]
pub enum TesseraError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Data errors
    #[error("key not found")]
    NotFound,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("record already exists")]
    Conflict,

    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    // Integrity errors
    #[error("corrupt data: {reason}")]
    Corrupt { reason: String },

    // Transaction errors
    #[error("transaction conflict detected")]
    TxConflict,

    #[error("transaction was aborted")]
    TxAborted,

    // Relational layer errors
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Shorthand for a `Corrupt` error with a formatted reason.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        TesseraError::Corrupt {
            reason: reason.into(),
        }
    }
}
