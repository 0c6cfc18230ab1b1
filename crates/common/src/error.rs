use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Errors caused by the caller's input rather than by this service or its upstreams.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidDate(_) | AppError::InvalidRange(_) | AppError::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(AppError::InvalidRange("start after end".into()).is_client_error());
        assert!(AppError::InvalidDate("yesterday".into()).is_client_error());
        assert!(!AppError::Provider("timeout".into()).is_client_error());
        assert!(!AppError::StorageUnavailable("refused".into()).is_client_error());
    }
}
