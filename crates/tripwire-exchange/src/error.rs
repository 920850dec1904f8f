//! Exchange connector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection, timeout or read failure, or a 5xx from the venue.
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP 401/403 or a venue-specific authentication failure code.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Response body is not valid JSON.
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON is valid but lacks a field the operation needs.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Connector closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExchangeError {
    /// Failures worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
