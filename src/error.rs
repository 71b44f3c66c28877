use std::{array::TryFromSliceError, string::FromUtf8Error, sync::PoisonError};

use bincode::ErrorKind;
use thiserror::Error;

use crate::sql::types::DataType;

/// Custom Result type for aliasdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for aliasdb
///
/// Planning errors (`UnknownAlias`, `UnknownColumn`, `DuplicateAlias`,
/// `PlanFinalized`) are raised before any scan is opened. `TypeMismatch`
/// can only surface while records are being compared.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Internal error (storage, serialization, etc.)
    #[error("internal error {0}")]
    Internal(String),
    /// MVCC write conflict
    #[error("write conflict, try transaction")]
    WriteConflict,
    /// Alias referenced before `query_as` bound it
    #[error("unknown alias {0}")]
    UnknownAlias(String),
    /// Qualified column not present in the schema it was resolved against
    #[error("unknown column {0}")]
    UnknownColumn(String),
    /// Alias bound twice in one transaction, or joined twice into one plan
    #[error("alias {0} is already bound")]
    DuplicateAlias(String),
    /// Alias that is empty or contains a '.'
    #[error("invalid alias {0:?}")]
    InvalidAlias(String),
    /// Values of different variants were compared
    #[error("type mismatch: cannot compare {left} with {right}")]
    TypeMismatch { left: DataType, right: DataType },
    /// `join`/`select` called on a plan that can no longer change shape
    #[error("query plan is finalized")]
    PlanFinalized,
    #[error("table {0} does not exist")]
    UnknownTable(String),
    #[error("table {0} already exists")]
    TableExists(String),
    /// Record or table definition does not conform to its schema
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("invalid config: {0}")]
    Config(String),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Config(value.to_string())
    }
}
