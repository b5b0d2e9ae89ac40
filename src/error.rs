//! Error types for the StackMemory context engine.

use thiserror::Error;

/// Storage-related errors
///
/// Every variant names the logical table involved so callers can tell which
/// part of the project store failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend failed on {table}.{operation}: {source}")]
    Backend {
        table: &'static str,
        operation: &'static str,
        #[source]
        source: sled::Error,
    },

    #[error("Corrupt record in {table} (key {key}): {message}")]
    Corrupt {
        table: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to encode record for {table}: {message}")]
    Encode {
        table: &'static str,
        message: String,
    },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Concurrency conflict: {0}")]
    Concurrency(String),

    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to read {source_name}: {source}")]
    InputError {
        source_name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable category name used by the CLI and in structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Concurrency(_) => "concurrency",
            ApiError::DeadlineExceeded { .. } => "deadline",
            ApiError::StorageError(_) => "storage",
            ApiError::ConfigError(_) => "config",
            ApiError::InputError { .. } => "input",
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
