//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] tripwire_exchange::ExchangeError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tripwire_ws::WsError),

    #[error("Store error: {0}")]
    Store(#[from] tripwire_store::StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] tripwire_engine::EngineError),

    #[error("Control API error: {0}")]
    Api(#[from] tripwire_api::ApiError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tripwire_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
