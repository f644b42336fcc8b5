use thiserror::Error;

/// Flight instrument error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures surfaced by the flight log store and its key-value backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    IoFailure(String),

    #[error("Stored data is not a valid log: {0}")]
    DecodeFailure(String),

    #[error("Failed to encode log: {0}")]
    EncodeFailure(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoFailure(err.to_string())
    }
}

/// Result type for instrument operations
pub type Result<T> = std::result::Result<T, InstrumentError>;
