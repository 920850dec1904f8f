//! Multiplexed WebSocket pool for exchange streaming sessions.
//!
//! Provides:
//! - `SocketPool`: N parallel connections to one endpoint with per-connection
//!   state tracking, spread subscriptions and concurrent handler fan-out
//! - Strict or lenient reconnection per dispatch loop, with exponential backoff
//! - `MessageCodec` / `HandshakeAuth` seams so venues plug in their own
//!   frames and authenticated handshakes
//! - `StreamEvent`: typed union of everything a venue can push

pub mod codec;
pub mod connection;
pub mod error;
pub mod event;
pub mod handler;
pub mod pool;
pub mod subscription;

pub use codec::{HandshakeAuth, MessageCodec, NoAuth};
pub use connection::{ConnectionState, ReconnectConfig};
pub use error::{WsError, WsResult};
pub use event::{
    DepthEvent, EventKind, OrderUpdateEvent, OrderUpdateStatus, StreamEvent, TickerEvent,
};
pub use handler::{BoxFuture, ChannelHandler, StreamHandler};
pub use pool::{Placement, PoolConfig, PoolEvent, ReconnectPolicy, SocketPool};
pub use subscription::SubscriptionRegistry;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
