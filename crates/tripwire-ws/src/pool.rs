//! Socket pool: N connections to one stream endpoint.
//!
//! The pool owns the sockets, the channel registry and the handler list.
//! Callers drive each connection with [`SocketPool::dispatch_loop`] and pick a
//! [`ReconnectPolicy`] per loop.

use crate::codec::{HandshakeAuth, MessageCodec};
use crate::connection::{Connection, ConnectionState, ReconnectConfig, WsSource};
use crate::error::{WsError, WsResult};
use crate::event::StreamEvent;
use crate::handler::StreamHandler;
use crate::subscription::SubscriptionRegistry;
use futures_util::future::join_all;
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock as TokioRwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    pub connections: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connections: 1,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Where to place new subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Round-robin across currently open connections.
    Spread,
    Index(usize),
}

/// What a dispatch loop does when its connection goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Return the failure to the caller.
    Strict,
    /// Reopen that connection with backoff, publish [`PoolEvent::Reopened`], keep going.
    Lenient,
}

/// Pool lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Connection `index` was reopened; `channels` were assigned to it before the loss.
    Reopened { index: usize, channels: Vec<String> },
}

pub struct SocketPool {
    config: PoolConfig,
    codec: Arc<dyn MessageCodec>,
    auth: Arc<dyn HandshakeAuth>,
    connections: Vec<Connection>,
    registry: SubscriptionRegistry,
    handlers: RwLock<Vec<(String, Arc<dyn StreamHandler>)>>,
    request_id: AtomicU64,
    events: broadcast::Sender<PoolEvent>,
    shutdown: CancellationToken,
    // Held shared while handlers run; close() takes it exclusively.
    dispatch_gate: TokioRwLock<()>,
}

impl SocketPool {
    pub fn new(
        config: PoolConfig,
        codec: Arc<dyn MessageCodec>,
        auth: Arc<dyn HandshakeAuth>,
    ) -> Self {
        let count = config.connections.max(1);
        let (events, _) = broadcast::channel(64);
        Self {
            connections: (0..count).map(Connection::new).collect(),
            config,
            codec,
            auth,
            registry: SubscriptionRegistry::new(),
            handlers: RwLock::new(Vec::new()),
            request_id: AtomicU64::new(1),
            events,
            shutdown: CancellationToken::new(),
            dispatch_gate: TokioRwLock::new(()),
        }
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub fn state(&self, index: usize) -> Option<ConnectionState> {
        self.connections.get(index).map(Connection::state)
    }

    pub fn open_indices(&self) -> Vec<usize> {
        self.connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_open())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn connection(&self, index: usize) -> WsResult<&Connection> {
        self.connections
            .get(index)
            .ok_or(WsError::InvalidIndex(index))
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Open every connection concurrently.
    ///
    /// If any handshake fails the already-open connections are closed again
    /// and the first failure is returned as [`WsError::PoolOpen`].
    pub async fn open(&self) -> WsResult<()> {
        info!(url = %self.config.url, connections = self.size(), "Opening socket pool");
        let url = self.config.url.as_str();
        let results = join_all(
            self.connections
                .iter()
                .map(|c| c.connect(url, self.auth.as_ref())),
        )
        .await;

        let failure = results
            .into_iter()
            .enumerate()
            .find_map(|(index, r)| r.err().map(|e| (index, e)));

        if let Some((index, e)) = failure {
            error!(index, error = %e, "Socket pool open failed");
            for conn in &self.connections {
                conn.close().await;
            }
            return Err(WsError::PoolOpen {
                index,
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Register a named handler. Re-registering a name replaces the handler.
    pub fn register_handler(&self, name: &str, handler: Arc<dyn StreamHandler>) {
        let mut handlers = self.handlers.write();
        handlers.retain(|(n, _)| n != name);
        handlers.push((name.to_string(), handler));
    }

    /// Subscribe to channels not already carried by the pool.
    pub async fn subscribe(&self, channels: &[String], placement: Placement) -> WsResult<()> {
        let fresh: Vec<String> = channels
            .iter()
            .filter(|c| self.registry.connection_of(c).is_none())
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        match placement {
            Placement::Index(index) => {
                self.connection(index)?;
                groups.insert(index, fresh);
            }
            Placement::Spread => {
                let open = self.open_indices();
                for channel in fresh {
                    let index = self
                        .registry
                        .next_spread(&open)
                        .ok_or(WsError::NoOpenConnection)?;
                    groups.entry(index).or_default().push(channel);
                }
            }
        }

        for (index, group) in groups {
            self.send_subscribe(index, &group).await?;
            for channel in &group {
                self.registry.assign(channel, index);
            }
            debug!(index, channels = ?group, "Subscribed");
        }
        Ok(())
    }

    async fn send_subscribe(&self, index: usize, channels: &[String]) -> WsResult<()> {
        let conn = self.connection(index)?;
        for frame in self.codec.subscribe_frames(channels, self.next_request_id()) {
            conn.send_text(frame).await?;
        }
        Ok(())
    }

    /// Unsubscribe on whichever connection carries each channel.
    ///
    /// Unknown channels are ignored. A channel on a connection that is not
    /// open is forgotten without sending anything.
    pub async fn unsubscribe(&self, channels: &[String]) -> WsResult<()> {
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for channel in channels {
            if let Some(index) = self.registry.remove(channel) {
                groups.entry(index).or_default().push(channel.clone());
            }
        }

        for (index, group) in groups {
            let conn = self.connection(index)?;
            if !conn.is_open() {
                continue;
            }
            for frame in self.codec.unsubscribe_frames(&group, self.next_request_id()) {
                conn.send_text(frame).await?;
            }
            debug!(index, channels = ?group, "Unsubscribed");
        }
        Ok(())
    }

    /// Send a raw text frame on one connection.
    pub async fn send(&self, index: usize, text: String) -> WsResult<()> {
        self.connection(index)?.send_text(text).await
    }

    /// Resubscribe connection `index` to the channels it carried that are
    /// still in `desired`. Channels no longer desired are forgotten.
    /// Returns the channels that were re-sent.
    pub async fn restore(&self, index: usize, desired: &HashSet<String>) -> WsResult<Vec<String>> {
        let previous = self.registry.channels_on(index);
        let (keep, drop): (Vec<String>, Vec<String>) =
            previous.into_iter().partition(|c| desired.contains(c));

        for channel in &drop {
            self.registry.remove(channel);
        }
        if !keep.is_empty() {
            self.send_subscribe(index, &keep).await?;
        }
        info!(index, restored = keep.len(), dropped = drop.len(), "Subscriptions restored");
        Ok(keep)
    }

    /// Read and dispatch frames from connection `index` until shutdown or failure.
    ///
    /// Returns `Ok(())` once [`SocketPool::close`] has been called.
    pub async fn dispatch_loop(&self, index: usize, policy: ReconnectPolicy) -> WsResult<()> {
        let conn = self.connection(index)?;
        let Some(mut source) = conn.take_source().await else {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            return Err(WsError::NotOpen(index));
        };

        loop {
            let failure = match self.pump(index, conn, &mut source).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            conn.mark_lost().await;

            match policy {
                ReconnectPolicy::Strict => {
                    warn!(index, error = %failure, "Connection lost");
                    return Err(failure);
                }
                ReconnectPolicy::Lenient => {
                    warn!(index, error = %failure, "Connection lost, reopening");
                    match self.reopen(index, conn).await? {
                        Some(fresh) => source = fresh,
                        None => return Ok(()),
                    }
                    let channels = self.registry.channels_on(index);
                    // No receivers is fine
                    let _ = self.events.send(PoolEvent::Reopened { index, channels });
                }
            }
        }
    }

    async fn pump(&self, index: usize, conn: &Connection, source: &mut WsSource) -> WsResult<()> {
        loop {
            let msg = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(()),
                msg = source.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => self.on_text(conn, &text).await?,
                Some(Ok(Message::Binary(data))) => {
                    return Err(WsError::Protocol(format!(
                        "unexpected binary frame ({} bytes) on connection {index}",
                        data.len()
                    )));
                }
                Some(Ok(Message::Ping(data))) => conn.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((1000, "Normal close".to_string()));
                    return Err(WsError::ConnectionClosed {
                        index,
                        code,
                        reason,
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        index,
                        code: 1006,
                        reason: "Stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn on_text(&self, conn: &Connection, text: &str) -> WsResult<()> {
        let event = match self.codec.decode(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Undecodable frame skipped");
                return Ok(());
            }
        };

        match &event {
            StreamEvent::Ping(payload) => {
                if let Some(pong) = self.codec.pong_frame(payload) {
                    conn.send(Message::Text(pong)).await?;
                }
                Ok(())
            }
            StreamEvent::Ack(payload) => {
                debug!(%payload, "Ack received");
                Ok(())
            }
            _ => {
                self.fan_out(&event).await;
                Ok(())
            }
        }
    }

    async fn fan_out(&self, event: &StreamEvent) {
        let _gate = self.dispatch_gate.read().await;
        if self.shutdown.is_cancelled() {
            return;
        }
        let accepting: Vec<Arc<dyn StreamHandler>> = self
            .handlers
            .read()
            .iter()
            .filter(|(_, h)| h.accepts(event))
            .map(|(_, h)| h.clone())
            .collect();
        join_all(accepting.iter().map(|h| h.handle(event))).await;
    }

    /// Reconnect one connection with backoff. `None` means shutdown won.
    async fn reopen(&self, index: usize, conn: &Connection) -> WsResult<Option<WsSource>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let max = self.config.reconnect.max_attempts;
            if max > 0 && attempt > max {
                error!(index, attempt, "Max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(format!(
                    "connection {index}: max reconnection attempts reached"
                )));
            }

            let delay = self.config.reconnect.delay(attempt);
            warn!(index, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.cancelled() => return Ok(None),
            }

            match conn.connect(&self.config.url, self.auth.as_ref()).await {
                Ok(()) => {
                    if self.shutdown.is_cancelled() {
                        conn.close().await;
                        return Ok(None);
                    }
                    return Ok(conn.take_source().await);
                }
                Err(e) => error!(index, attempt, error = %e, "Reconnect failed"),
            }
        }
    }

    /// Stop all loops and close every connection.
    ///
    /// No handler starts after this returns; handlers already running are
    /// awaited first.
    pub async fn close(&self) {
        info!("Socket pool shutdown requested");
        self.shutdown.cancel();
        let _gate = self.dispatch_gate.write().await;
        for conn in &self.connections {
            conn.close().await;
        }
    }
}
