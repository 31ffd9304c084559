//! Record store errors

use crate::backend::StorageError;
use lib_types::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(Address),

    #[error("Write contention on {key}: gave up after {attempts} attempts")]
    Contention { key: String, attempts: usize },
}

/// Result type for record store operations
pub type RecordResult<T> = Result<T, RecordError>;
