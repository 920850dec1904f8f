//! Engine error types.

use thiserror::Error;
use tripwire_exchange::ExchangeError;
use tripwire_store::StoreError;
use tripwire_ws::WsError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Ws(#[from] WsError),

    /// Malformed order or button parameters.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Quote currency {quote} is not allowed (allowed: {allowed})")]
    QuoteNotAllowed { quote: String, allowed: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
