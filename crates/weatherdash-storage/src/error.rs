//! Storage error types.

use thiserror::Error;
use weatherdash_core::{AppError, PersistenceError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl StorageError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Sqlite(e) => {
                AppError::Persistence(PersistenceError::Unavailable(e.to_string()))
            }
            StorageError::Io(e) => AppError::Persistence(PersistenceError::Unavailable(e.to_string())),
            StorageError::Serialization(e) => {
                AppError::Persistence(PersistenceError::Serialization(e.to_string()))
            }
            e @ StorageError::Invalid { .. } => {
                AppError::Persistence(PersistenceError::WriteFailed(e.to_string()))
            }
        }
    }
}
