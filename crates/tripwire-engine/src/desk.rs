//! Control operations behind the HTTP surface.
//!
//! The desk owns the channel reference counts: the first pending order on a
//! ticker subscribes its price channel, deleting the last one unsubscribes.
//! Promotions happen in the engine and never touch the counts, so every
//! subscribe or unsubscribe decision is taken against the pending orders the
//! store holds at that moment.

use crate::engine::TriggerEngine;
use crate::error::{EngineError, EngineResult};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tripwire_core::{
    parse_pair, ExportDocument, NewButton, NewOrder, Order, OrderId, OrderSide, Price,
    ProcessingOrder, QuickButton, Symbol, SymbolId, SymbolUpdate, Volume,
};
use tripwire_exchange::{AccountInfo, ExchangeConnector};
use tripwire_store::OrderStore;
use tripwire_ws::{BoxFuture, Placement, PoolEvent, SocketPool, WsResult};

/// Where price subscriptions go.
pub trait ChannelSink: Send + Sync {
    fn subscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>>;

    fn unsubscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>>;
}

impl ChannelSink for SocketPool {
    fn subscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(SocketPool::subscribe(self, channels, Placement::Spread))
    }

    fn unsubscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(SocketPool::unsubscribe(self, channels))
    }
}

/// Body of `POST /order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    /// `"BASE/QUOTE"`.
    pub symbol: String,
    pub trigger_price: Price,
    pub price: Price,
    pub order_type: OrderSide,
    pub volume: Volume,
}

/// Pending order with its pair spelled out.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingView {
    #[serde(flatten)]
    pub order: ProcessingOrder,
    pub symbol: String,
}

pub struct OrderDesk {
    exchange: String,
    store: Arc<dyn OrderStore>,
    engine: Arc<TriggerEngine>,
    connector: Arc<ExchangeConnector>,
    sink: Option<Arc<dyn ChannelSink>>,
    order_channel: Option<String>,
    allowed_quotes: Vec<String>,
    channels: Mutex<BTreeMap<String, usize>>,
}

impl OrderDesk {
    pub fn new(
        engine: Arc<TriggerEngine>,
        connector: Arc<ExchangeConnector>,
        sink: Option<Arc<dyn ChannelSink>>,
        allowed_quotes: Vec<String>,
    ) -> Self {
        Self {
            exchange: engine.exchange().to_string(),
            store: Arc::clone(engine.store()),
            engine,
            connector,
            sink,
            order_channel: None,
            allowed_quotes: allowed_quotes.iter().map(|q| q.to_uppercase()).collect(),
            channels: Mutex::new(BTreeMap::new()),
        }
    }

    /// Order-update channel to keep subscribed alongside price channels.
    pub fn with_order_channel(mut self, channel: Option<String>) -> Self {
        self.order_channel = channel;
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn engine(&self) -> &Arc<TriggerEngine> {
        &self.engine
    }

    fn channel_for(&self, symbol: &Symbol) -> String {
        self.connector.dialect().price_channel(&symbol.ticker)
    }

    fn symbol(&self, id: SymbolId) -> EngineResult<Symbol> {
        self.store
            .get_symbol_by_id(id)?
            .ok_or_else(|| EngineError::UnknownSymbol(format!("id {id}")))
    }

    /// Rebuild channel counts from the pending orders in the store.
    fn recount(&self) -> EngineResult<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for id in self.store.active_symbol_ids()? {
            let symbol = self.symbol(id)?;
            *counts.entry(self.channel_for(&symbol)).or_insert(0) +=
                self.store.count_orders_for(id)?;
        }
        *self.channels.lock() = counts.clone();
        Ok(counts)
    }

    /// Channels a restored connection should carry.
    pub fn desired_channels(&self) -> EngineResult<HashSet<String>> {
        let mut desired: HashSet<String> = self.recount()?.into_keys().collect();
        desired.extend(self.order_channel.clone());
        Ok(desired)
    }

    /// Subscribe everything the current store needs. Called once the pool is open.
    pub async fn bootstrap(&self) -> EngineResult<usize> {
        let mut channels: Vec<String> = self.recount()?.into_keys().collect();
        channels.extend(self.order_channel.clone());
        if let Some(sink) = &self.sink {
            if !channels.is_empty() {
                sink.subscribe(&channels).await?;
            }
        }
        info!(exchange = %self.exchange, channels = channels.len(), "Subscriptions bootstrapped");
        Ok(channels.len())
    }

    /// Sync the count for `symbol` after an order was added. Subscribes when
    /// the channel was not carried yet.
    async fn retain_channel(&self, symbol: &Symbol) -> EngineResult<()> {
        let channel = self.channel_for(symbol);
        let pending = self.store.count_orders_for(symbol.id)?;
        let first = self.channels.lock().insert(channel.clone(), pending).is_none();
        if first {
            if let Some(sink) = &self.sink {
                sink.subscribe(std::slice::from_ref(&channel)).await?;
                debug!(exchange = %self.exchange, %channel, "Channel subscribed");
            }
        }
        Ok(())
    }

    /// Sync the count for `symbol` after an order was removed. Unsubscribes
    /// once the store holds no pending order for it.
    async fn release_channel(&self, symbol: &Symbol) -> EngineResult<()> {
        let channel = self.channel_for(symbol);
        let pending = self.store.count_orders_for(symbol.id)?;
        let last = {
            let mut channels = self.channels.lock();
            if pending == 0 {
                channels.remove(&channel).is_some()
            } else {
                channels.insert(channel.clone(), pending);
                false
            }
        };
        if last {
            if let Some(sink) = &self.sink {
                sink.unsubscribe(std::slice::from_ref(&channel)).await?;
                debug!(exchange = %self.exchange, %channel, "Channel unsubscribed");
            }
        }
        Ok(())
    }

    fn check_quote(&self, quote: &str) -> EngineResult<()> {
        if self.allowed_quotes.is_empty() || self.allowed_quotes.iter().any(|q| q == quote) {
            return Ok(());
        }
        Err(EngineError::QuoteNotAllowed {
            quote: quote.to_string(),
            allowed: self.allowed_quotes.join(","),
        })
    }

    pub async fn create_order(&self, request: CreateOrder) -> EngineResult<OrderView> {
        let (base, quote) = parse_pair(&request.symbol)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        self.check_quote(&quote)?;
        if !request.trigger_price.is_positive() || !request.price.is_positive() {
            return Err(EngineError::Validation(
                "trigger_price and price must be positive".to_string(),
            ));
        }
        if !request.volume.is_positive() {
            return Err(EngineError::Validation("volume must be positive".to_string()));
        }
        let symbol = self
            .store
            .get_symbol(&base, &quote)?
            .ok_or_else(|| EngineError::UnknownSymbol(request.symbol.clone()))?;

        let order = self.store.add_order(NewOrder {
            symbol_id: symbol.id,
            trigger_price: request.trigger_price,
            price: request.price,
            order_type: request.order_type,
            volume: request.volume,
            add_timestamp: chrono::Utc::now(),
        })?;
        self.engine.limits().reset(symbol.id);
        self.engine.refresh_pending_gauge();
        info!(
            exchange = %self.exchange,
            order_id = order.id,
            pair = %symbol.pair(),
            side = %order.order_type,
            trigger = %order.trigger_price,
            "Order created"
        );

        self.retain_channel(&symbol).await?;
        Ok(OrderView {
            symbol: symbol.pair(),
            order,
        })
    }

    pub async fn delete_order(&self, id: OrderId) -> EngineResult<Order> {
        let order = self.store.delete_order(id)?;
        self.engine.limits().reset(order.symbol_id);
        self.engine.refresh_pending_gauge();
        info!(exchange = %self.exchange, order_id = id, "Order deleted");

        let symbol = self.symbol(order.symbol_id)?;
        self.release_channel(&symbol).await?;
        Ok(order)
    }

    pub async fn delete_all_orders(&self) -> EngineResult<usize> {
        let removed = self.store.delete_all_orders()?;
        self.engine.limits().reset_all();
        self.engine.refresh_pending_gauge();

        let channels: Vec<String> = std::mem::take(&mut *self.channels.lock())
            .into_keys()
            .collect();
        if let Some(sink) = &self.sink {
            if !channels.is_empty() {
                sink.unsubscribe(&channels).await?;
            }
        }
        info!(exchange = %self.exchange, removed = removed.len(), "All orders deleted");
        Ok(removed.len())
    }

    pub fn list_orders(&self) -> EngineResult<Vec<OrderView>> {
        let symbols = self.symbol_pairs()?;
        Ok(self
            .store
            .list_orders()?
            .into_iter()
            .map(|order| OrderView {
                symbol: pair_of(&symbols, order.symbol_id),
                order,
            })
            .collect())
    }

    pub fn list_processing_orders(&self) -> EngineResult<Vec<ProcessingView>> {
        let symbols = self.symbol_pairs()?;
        Ok(self
            .store
            .list_processing()?
            .into_iter()
            .map(|order| ProcessingView {
                symbol: pair_of(&symbols, order.symbol_id),
                order,
            })
            .collect())
    }

    fn symbol_pairs(&self) -> EngineResult<BTreeMap<SymbolId, String>> {
        Ok(self
            .store
            .list_symbols()?
            .into_iter()
            .map(|s| (s.id, s.pair()))
            .collect())
    }

    pub fn list_symbols(&self) -> EngineResult<Vec<Symbol>> {
        Ok(self.store.list_symbols()?)
    }

    /// Pull the venue catalog into the store. Returns the full symbol list.
    pub async fn sync_symbols(&self) -> EngineResult<Vec<Symbol>> {
        let mut products = Vec::new();
        let mut listing = Box::pin(self.connector.list_products());
        while let Some(product) = listing.next().await {
            products.push(product?);
        }
        let added = self.store.add_symbols(&products)?;
        info!(exchange = %self.exchange, listed = products.len(), added, "Symbols synced");
        self.list_symbols()
    }

    pub fn update_symbol(&self, id: SymbolId, update: &SymbolUpdate) -> EngineResult<Symbol> {
        Ok(self.store.update_symbol(id, update)?)
    }

    pub fn delete_symbol(&self, id: SymbolId) -> EngineResult<Symbol> {
        Ok(self.store.delete_symbol(id)?)
    }

    /// Last price for a ticker, given either natively or as `"BASE/QUOTE"`.
    pub async fn rate(&self, ticker: &str) -> EngineResult<Price> {
        let native = match parse_pair(ticker) {
            Ok((base, quote)) => self.connector.dialect().ticker_for(&base, &quote),
            Err(_) => ticker.to_uppercase(),
        };
        Ok(self.connector.last_price(&native).await?)
    }

    pub async fn user_info(&self) -> EngineResult<AccountInfo> {
        Ok(self.connector.account_info().await?)
    }

    pub fn export_orders(&self) -> EngineResult<ExportDocument> {
        Ok(self.store.export_orders()?)
    }

    /// Import a document as new pending orders. Nothing is written if any
    /// pair is unknown.
    pub async fn import_orders(&self, document: &ExportDocument) -> EngineResult<Vec<Order>> {
        for entry in &document.orders {
            let (_, quote) =
                parse_pair(&entry.symbol).map_err(|e| EngineError::Validation(e.to_string()))?;
            self.check_quote(&quote)?;
        }
        let orders = self.store.import_orders(document)?;
        self.engine.limits().reset_all();
        self.engine.refresh_pending_gauge();

        let touched: BTreeSet<SymbolId> = orders.iter().map(|o| o.symbol_id).collect();
        for id in touched {
            self.retain_channel(&self.symbol(id)?).await?;
        }
        info!(exchange = %self.exchange, imported = orders.len(), "Orders imported");
        Ok(orders)
    }

    pub fn list_buttons(&self) -> EngineResult<Vec<QuickButton>> {
        Ok(self.store.list_buttons()?)
    }

    pub fn add_button(&self, button: NewButton) -> EngineResult<QuickButton> {
        if !button.volume.is_positive() {
            return Err(EngineError::Validation("volume must be positive".to_string()));
        }
        Ok(self.store.add_button(button)?)
    }

    pub fn delete_button(&self, id: u64) -> EngineResult<()> {
        Ok(self.store.delete_button(id)?)
    }
}

fn pair_of(symbols: &BTreeMap<SymbolId, String>, id: SymbolId) -> String {
    symbols
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("#{id}"))
}

/// Restore subscriptions on every reopened connection until `shutdown` fires.
pub fn spawn_resubscriber(
    desk: Arc<OrderDesk>,
    pool: Arc<SocketPool>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut events = pool.events();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(PoolEvent::Reopened { index, channels }) => {
                    tripwire_telemetry::Metrics::ws_reconnect(desk.exchange());
                    let desired = match desk.desired_channels() {
                        Ok(desired) => desired,
                        Err(e) => {
                            warn!(exchange = %desk.exchange(), index, error = %e, "Cannot compute desired channels");
                            continue;
                        }
                    };
                    match pool.restore(index, &desired).await {
                        Ok(kept) => info!(
                            exchange = %desk.exchange(),
                            index,
                            previous = channels.len(),
                            restored = kept.len(),
                            "Connection resubscribed"
                        ),
                        Err(e) => warn!(exchange = %desk.exchange(), index, error = %e, "Resubscribe failed"),
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(exchange = %desk.exchange(), missed, "Pool events lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Keep one fixed channel subscribed on whichever connection carried it
/// across reopens. Used for order-update streams that have no desk behind
/// them.
pub fn spawn_channel_keeper(
    pool: Arc<SocketPool>,
    channel: String,
    exchange: String,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut events = pool.events();
    let desired = HashSet::from([channel]);
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(PoolEvent::Reopened { index, .. }) => {
                    tripwire_telemetry::Metrics::ws_reconnect(&exchange);
                    match pool.restore(index, &desired).await {
                        Ok(kept) => debug!(%exchange, index, restored = kept.len(), "Order channel resubscribed"),
                        Err(e) => warn!(%exchange, index, error = %e, "Order channel resubscribe failed"),
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(%exchange, missed, "Pool events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
