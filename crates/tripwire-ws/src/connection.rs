//! One pooled WebSocket connection.
//!
//! State moves `Disconnected -> Connecting -> Open -> Closing -> Disconnected`.
//! `Open` is only reached after the upgrade handshake, including any auth
//! headers, has succeeded.

use crate::codec::HandshakeAuth;
use crate::error::{WsError, WsResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Backoff settings for lenient reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum reconnection attempts (0 = infinite).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff `base * 2^(attempt-1)`, capped, plus 0-1000ms jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay + rand_jitter())
    }
}

fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

pub(crate) struct Connection {
    index: usize,
    state: RwLock<ConnectionState>,
    sink: TokioMutex<Option<WsSink>>,
    source: TokioMutex<Option<WsSource>>,
}

impl Connection {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: RwLock::new(ConnectionState::Disconnected),
            sink: TokioMutex::new(None),
            source: TokioMutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub(crate) async fn connect(&self, url: &str, auth: &dyn HandshakeAuth) -> WsResult<()> {
        *self.state.write() = ConnectionState::Connecting;
        debug!(index = self.index, %url, "Connecting");

        match self.handshake(url, auth).await {
            Ok(stream) => {
                let (sink, source) = stream.split();
                *self.sink.lock().await = Some(sink);
                *self.source.lock().await = Some(source);
                *self.state.write() = ConnectionState::Open;
                info!(index = self.index, "WebSocket connected");
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn handshake(&self, url: &str, auth: &dyn HandshakeAuth) -> WsResult<WsStream> {
        let mut request = url.into_client_request()?;
        for (name, value) in auth.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::ConnectionFailed(format!("bad header name: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| WsError::ConnectionFailed(format!("bad header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        // TCP_NODELAY on
        let (stream, _response) = connect_async_tls_with_config(request, None, true, None).await?;
        Ok(stream)
    }

    /// Hand the read half to a dispatch loop. Only one loop may own it.
    pub(crate) async fn take_source(&self) -> Option<WsSource> {
        self.source.lock().await.take()
    }

    pub(crate) async fn send(&self, message: Message) -> WsResult<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(WsError::NotOpen(self.index))?;
        sink.send(message)
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    pub(crate) async fn send_text(&self, text: String) -> WsResult<()> {
        if !self.is_open() {
            return Err(WsError::NotOpen(self.index));
        }
        self.send(Message::Text(text)).await
    }

    /// Drop both halves after a failure, without a close handshake.
    pub(crate) async fn mark_lost(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        self.sink.lock().await.take();
        self.source.lock().await.take();
    }

    pub(crate) async fn close(&self) {
        *self.state.write() = ConnectionState::Closing;
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(index = self.index, ?e, "Close frame not delivered");
            }
            if let Err(e) = sink.close().await {
                warn!(index = self.index, ?e, "Failed to close sink");
            }
        }
        self.source.lock().await.take();
        *self.state.write() = ConnectionState::Disconnected;
    }
}
