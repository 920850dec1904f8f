//! Store error types.

use thiserror::Error;
use tripwire_core::{CoreError, SymbolId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lost a race: the row was already promoted, deleted or claimed.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Symbol {0} is referenced by pending orders")]
    SymbolInUse(SymbolId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
