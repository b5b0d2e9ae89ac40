//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a one-line message prefixed with a stable category.
pub fn map_error(e: &ApiError) -> String {
    format!("error[{}]: {}", e.category(), e)
}

/// Process exit code per error category.
pub fn exit_code(e: &ApiError) -> i32 {
    match e {
        ApiError::Validation(_) => 2,
        ApiError::NotFound { .. } => 3,
        ApiError::Concurrency(_) | ApiError::DeadlineExceeded { .. } => 4,
        ApiError::ConfigError(_) => 5,
        ApiError::InputError { .. } => 6,
        ApiError::StorageError(_) => 1,
    }
}
