use comet_common::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport failure, non-2xx status, or an error envelope from the upstream.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Block range {from}..={to} spans {span} blocks past its start, limit is {max}")]
    RangeTooWide { from: u64, to: u64, span: u64, max: u64 },
}

impl ChainError {
    pub fn provider(err: impl std::fmt::Display) -> Self {
        ChainError::Provider(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Provider(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Provider(format!("malformed response: {err}"))
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Provider(msg) => AppError::Provider(msg),
            other @ ChainError::RangeTooWide { .. } => AppError::InvalidRange(other.to_string()),
        }
    }
}
