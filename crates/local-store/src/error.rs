use thiserror::Error;

/// Errors that can occur when reading or writing local state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for local store operations.
pub type Result<T> = std::result::Result<T, StorageError>;
