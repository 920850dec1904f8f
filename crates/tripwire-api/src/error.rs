//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tripwire_engine::EngineError;
use tripwire_exchange::ExchangeError;
use tripwire_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The exchange failed or refused the call.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let message = e.to_string();
        match e {
            EngineError::Validation(_)
            | EngineError::UnknownSymbol(_)
            | EngineError::QuoteNotAllowed { .. } => Self::BadRequest(message),
            EngineError::Store(store) => match store {
                StoreError::NotFound(_) => Self::NotFound(message),
                StoreError::Conflict(_) | StoreError::SymbolInUse(_) => Self::Conflict(message),
                StoreError::UnknownSymbol(_) | StoreError::Core(_) => Self::BadRequest(message),
                StoreError::Io(_) | StoreError::Json(_) => Self::Internal(message),
            },
            EngineError::Exchange(ExchangeError::Closed) => Self::Internal(message),
            EngineError::Exchange(_) | EngineError::Ws(_) => Self::Upstream(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
