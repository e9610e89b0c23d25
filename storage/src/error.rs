//! Storage errors

use thiserror::Error;

use crate::bucket::Bucket;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend failure; the operation may succeed when retried
    #[error("I/O error on {bucket}: {message}")]
    Io { bucket: Bucket, message: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Not found in {bucket}: {key}")]
    NotFound { bucket: Bucket, key: String },
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io { .. })
    }

    pub fn not_found(bucket: Bucket, key: &[u8]) -> Self {
        StorageError::NotFound {
            bucket,
            key: hex::encode(key),
        }
    }
}

impl From<bcs::Error> for StorageError {
    fn from(e: bcs::Error) -> Self {
        StorageError::Codec(e.to_string())
    }
}

impl From<StorageError> for tessera_types::TesseraError {
    fn from(e: StorageError) -> Self {
        tessera_types::TesseraError::Storage(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
