//! Fetch error types

use std::time::Duration;
use thiserror::Error;

/// Errors that keep a request from producing an HTTP status
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Check if the request is worth repeating later
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::Connection(_) => true,
            FetchError::Network(_) => true,
            FetchError::InvalidRequest(_) => false,
        }
    }
}

/// Statuses that mean "try again later": rate limiting and server errors
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
