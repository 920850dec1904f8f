//! Venue seams: frame encoding/decoding and handshake authentication.

use crate::error::WsResult;
use crate::event::StreamEvent;

/// Encodes control frames and decodes inbound text for one venue.
pub trait MessageCodec: Send + Sync {
    /// Frames that subscribe `channels`. Venues that take one channel per
    /// request return one frame per channel.
    fn subscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String>;

    fn unsubscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String>;

    /// Decode one text frame. Frames the venue documents but we do not use
    /// decode to [`StreamEvent::Unknown`]; only malformed JSON is an error.
    fn decode(&self, text: &str) -> WsResult<StreamEvent>;

    /// Reply to an application-level ping, if the venue expects one.
    fn pong_frame(&self, ping: &serde_json::Value) -> Option<String>;
}

/// Supplies extra HTTP headers for the WebSocket upgrade request.
///
/// Called once per connection attempt so timestamped signatures stay fresh.
pub trait HandshakeAuth: Send + Sync {
    fn headers(&self) -> Vec<(String, String)>;
}

/// Unauthenticated handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl HandshakeAuth for NoAuth {
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}
