//! Error types for tripwire-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Invalid symbol pair: {0}")]
    InvalidPair(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
