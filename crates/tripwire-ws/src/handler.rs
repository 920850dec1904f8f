//! Stream handlers registered on a pool.

use crate::event::{EventKind, StreamEvent};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::warn;

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A `(accepts, handle)` pair over decoded events.
///
/// Handlers own their error reporting; the pool only awaits completion.
pub trait StreamHandler: Send + Sync {
    fn accepts(&self, event: &StreamEvent) -> bool;

    fn handle<'a>(&'a self, event: &'a StreamEvent) -> BoxFuture<'a, ()>;
}

/// Forwards accepted events into an mpsc channel.
///
/// Backpressure from the receiver stalls the dispatching connection, which
/// keeps per-connection ordering intact.
pub struct ChannelHandler {
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelHandler {
    pub fn new(kinds: &[EventKind], tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            kinds: kinds.to_vec(),
            tx,
        }
    }
}

impl StreamHandler for ChannelHandler {
    fn accepts(&self, event: &StreamEvent) -> bool {
        self.kinds.contains(&event.kind())
    }

    fn handle<'a>(&'a self, event: &'a StreamEvent) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.tx.send(event.clone()).await.is_err() {
                warn!(kind = ?event.kind(), "Event receiver dropped");
            }
        })
    }
}
