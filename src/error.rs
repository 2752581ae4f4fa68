//! Error types for the cloud-backed storage core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("engine error: {0}")]
    Engine(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_) | StorageError::FileNotFound(_))
    }
}
