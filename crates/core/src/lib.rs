//! Shared primitives for all Rust crates in Rolebridge.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across Rolebridge crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated or presented an invalid credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn validation_error_carries_message() {
        let error = AppError::Validation("role id must not be empty".to_owned());
        assert_eq!(
            error.to_string(),
            "validation error: role id must not be empty"
        );
    }

    #[test]
    fn not_found_error_carries_message() {
        let error = AppError::NotFound("member 42".to_owned());
        assert_eq!(error.to_string(), "not found: member 42");
    }
}
