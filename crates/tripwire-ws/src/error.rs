//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection {index} closed: code={code}, reason={reason}")]
    ConnectionClosed {
        index: usize,
        code: u16,
        reason: String,
    },

    #[error("Pool open failed on connection {index}: {reason}")]
    PoolOpen { index: usize, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection {0} is not open")]
    NotOpen(usize),

    #[error("No open connection available")]
    NoOpenConnection,

    #[error("Connection index {0} out of range")]
    InvalidIndex(usize),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Whether the error means the peer or the transport went away.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::Tungstenite(_) | Self::NotOpen(_)
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;
