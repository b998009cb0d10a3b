use thiserror::Error;

use libstorebench_core::BenchError;

/// Error type for backend adapters and dataset loading
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not connected")]
    NotConnected,

    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<BackendError> for BenchError {
    fn from(e: BackendError) -> Self {
        BenchError::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
