use thiserror::Error;

/// Errors that can occur in progression operations
#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient resource: {0}")]
    InsufficientResource(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for progression operations
pub type ProgressionResult<T> = Result<T, ProgressionError>;
