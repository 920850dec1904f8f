//! Order trigger engine.
//!
//! Matches price observations against pending orders, promotes crossed orders
//! through the store and drives each promoted order to an outcome in a
//! supervised placement task.
//!
//! ```text
//! Pending ──promote──▶ Processing ──accepted──▶ Processing(order_id) ──filled──▶ Done
//!                          │  ▲
//!                    damp  │  │ sleep, resubmit
//!                          ▼  │
//!                       (retry) ──exhausted──▶ deleted
//! ```

use crate::config::EngineConfig;
use crate::disposition::Disposition;
use crate::error::EngineResult;
use crate::limits::TriggerLimits;
use crate::notify::Notifier;
use crate::placer::OrderPlacer;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tripwire_core::{OrderStatus, Price, ProcessingOrder, Symbol};
use tripwire_exchange::PlaceOrderRequest;
use tripwire_store::{OrderStore, StoreError};
use tripwire_telemetry::{Metrics, PlacementOutcome};
use tripwire_ws::{OrderUpdateEvent, OrderUpdateStatus};

pub struct TriggerEngine {
    exchange: String,
    store: Arc<dyn OrderStore>,
    placer: Arc<dyn OrderPlacer>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    limits: TriggerLimits,
    tasks: Mutex<JoinSet<()>>,
    shutdown: CancellationToken,
}

impl TriggerEngine {
    pub fn new(
        exchange: impl Into<String>,
        store: Arc<dyn OrderStore>,
        placer: Arc<dyn OrderPlacer>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            store,
            placer,
            notifier,
            config,
            limits: TriggerLimits::new(),
            tasks: Mutex::new(JoinSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn limits(&self) -> &TriggerLimits {
        &self.limits
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of placement tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Handle one price observation.
    ///
    /// Returns how many orders were promoted. Unknown tickers are ignored.
    pub fn observe(
        self: &Arc<Self>,
        ticker: &str,
        bid: Option<Price>,
        ask: Option<Price>,
    ) -> EngineResult<usize> {
        if self.shutdown.is_cancelled() {
            return Ok(0);
        }
        let Some(symbol) = self.store.get_symbol_by_ticker(ticker)? else {
            return Ok(0);
        };

        let ticket = self.limits.ticket(symbol.id);
        let bid_sweep = bid.filter(|b| self.limits.needs_bid_sweep(symbol.id, *b));
        let ask_sweep = ask.filter(|a| self.limits.needs_ask_sweep(symbol.id, *a));
        let mut crossed = Vec::new();

        if let Some(bid) = bid_sweep {
            let orders = self.store.pending_crossing_bid(symbol.id, bid)?;
            for _ in &orders {
                Metrics::trigger(&self.exchange, "bid");
            }
            crossed.extend(orders);
        }
        if let Some(ask) = ask_sweep {
            let orders = self.store.pending_crossing_ask(symbol.id, ask)?;
            for _ in &orders {
                Metrics::trigger(&self.exchange, "ask");
            }
            crossed.extend(orders);
        }

        let mut promoted = 0;
        let mut swept = true;
        for order in crossed {
            match self.store.promote(order.id) {
                Ok(processing) => {
                    info!(
                        exchange = %self.exchange,
                        ticker = %symbol.ticker,
                        order_id = order.id,
                        processing_id = processing.id,
                        side = %order.order_type,
                        trigger = %order.trigger_price,
                        ?bid,
                        ?ask,
                        "Trigger crossed"
                    );
                    self.spawn_placement(processing, symbol.ticker.clone());
                    promoted += 1;
                }
                Err(StoreError::Conflict(reason)) => {
                    debug!(exchange = %self.exchange, order_id = order.id, %reason, "Already promoted");
                    Metrics::promotion_lost(&self.exchange);
                }
                Err(e) => {
                    error!(exchange = %self.exchange, order_id = order.id, error = %e, "Promotion failed");
                    swept = false;
                }
            }
        }

        // A crossed order still pending must be seen again on the next tick.
        if swept {
            if let Some(bid) = bid_sweep {
                self.limits.record_bid(symbol.id, bid, ticket);
            }
            if let Some(ask) = ask_sweep {
                self.limits.record_ask(symbol.id, ask, ticket);
            }
        } else {
            self.limits.reset(symbol.id);
        }

        if promoted > 0 {
            self.refresh_pending_gauge();
        }
        Ok(promoted)
    }

    fn spawn_placement(self: &Arc<Self>, processing: ProcessingOrder, ticker: String) {
        let engine = Arc::clone(self);
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { engine.place(processing, ticker).await });
    }

    /// Submit one processing order, damping as configured, then settle it.
    async fn place(&self, processing: ProcessingOrder, ticker: String) {
        let request = PlaceOrderRequest {
            ticker: ticker.clone(),
            side: processing.order_type,
            kind: self.config.order_kind,
            price: processing.price,
            volume: processing.volume,
            time_in_force: self.config.time_in_force,
        };

        let mut retries = 0u32;
        loop {
            let result = self.placer.place(&request).await;
            let disposition = Disposition::classify(&self.config, &result);
            Metrics::placement(&self.exchange, disposition.outcome());

            let Disposition::Damp { reason } = disposition else {
                self.settle(&processing, &ticker, disposition);
                return;
            };

            if !self.config.damping {
                warn!(
                    exchange = %self.exchange,
                    processing_id = processing.id,
                    %reason,
                    "Damping disabled, order left processing"
                );
                return;
            }
            if retries >= self.config.damp_count {
                self.abandon(&processing, &ticker, retries);
                return;
            }

            retries += 1;
            Metrics::damping_retry(&self.exchange);
            debug!(
                exchange = %self.exchange,
                processing_id = processing.id,
                retry = retries,
                left = self.config.damp_count - retries,
                %reason,
                "Damping"
            );
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!(exchange = %self.exchange, processing_id = processing.id, "Shutdown while damping, order left processing");
                    return;
                }
                () = tokio::time::sleep(self.config.damp_interval()) => {}
            }
        }
    }

    fn settle(&self, processing: &ProcessingOrder, ticker: &str, disposition: Disposition) {
        let id = processing.id;
        let outcome = match disposition {
            Disposition::Accepted {
                order_id: Some(order_id),
            } => {
                info!(exchange = %self.exchange, processing_id = id, %ticker, %order_id, "Order placed");
                self.store.set_exchange_order_id(id, &order_id)
            }
            Disposition::Accepted { order_id: None } => {
                warn!(exchange = %self.exchange, processing_id = id, %ticker, "Order accepted without an id");
                Ok(())
            }
            Disposition::InsufficientBalance { code } => {
                warn!(exchange = %self.exchange, processing_id = id, %ticker, code, "Insufficient balance");
                self.notifier.notify(&format!(
                    "{}: insufficient balance for {} {} {} @ {}",
                    self.exchange, processing.order_type, processing.volume, ticker, processing.price
                ));
                self.store.set_status(id, OrderStatus::InsufficientBalance)
            }
            Disposition::Rejected { code, message } => {
                warn!(exchange = %self.exchange, processing_id = id, %ticker, code, %message, "Order rejected");
                self.store.delete_processing(id)
            }
            Disposition::AuthFailed(reason) => {
                error!(exchange = %self.exchange, processing_id = id, %ticker, %reason, "Order refused, authentication failed");
                self.store.delete_processing(id)
            }
            Disposition::Unresolved(reason) => {
                warn!(exchange = %self.exchange, processing_id = id, %ticker, %reason, "Placement outcome unknown, order left processing");
                Ok(())
            }
            Disposition::Damp { .. } => Ok(()),
        };
        if let Err(e) = outcome {
            error!(exchange = %self.exchange, processing_id = id, error = %e, "Failed to record placement outcome");
        }
    }

    fn abandon(&self, processing: &ProcessingOrder, ticker: &str, retries: u32) {
        Metrics::placement(&self.exchange, PlacementOutcome::DampingExhausted);
        warn!(
            exchange = %self.exchange,
            processing_id = processing.id,
            %ticker,
            retries,
            "Damping exhausted, order abandoned"
        );
        if let Err(e) = self.store.delete_processing(processing.id) {
            error!(exchange = %self.exchange, processing_id = processing.id, error = %e, "Failed to delete abandoned order");
        }
        self.notifier.notify(&format!(
            "{}: gave up on {} {} {} @ {} after {} retries",
            self.exchange, processing.order_type, processing.volume, ticker, processing.price, retries
        ));
    }

    /// Apply an exchange order-status update.
    pub fn apply_order_update(&self, update: &OrderUpdateEvent) -> EngineResult<()> {
        Metrics::order_update(&self.exchange, status_label(&update.status));

        let Some(processing) = self.store.find_processing_by_exchange_id(&update.order_id)? else {
            debug!(exchange = %self.exchange, order_id = %update.order_id, status = ?update.status, "Update for unknown order");
            return Ok(());
        };

        match &update.status {
            OrderUpdateStatus::Filled => {
                self.store.set_status(processing.id, OrderStatus::Done)?;
                info!(exchange = %self.exchange, order_id = %update.order_id, "Order filled");
                self.notifier.notify(&self.fill_message(&processing, "filled"));
            }
            OrderUpdateStatus::PartiallyFilled => {
                info!(exchange = %self.exchange, order_id = %update.order_id, "Order partially filled");
                self.notifier
                    .notify(&self.fill_message(&processing, "partially filled"));
            }
            OrderUpdateStatus::New => {
                debug!(exchange = %self.exchange, order_id = %update.order_id, "Order acknowledged");
            }
            other => {
                info!(exchange = %self.exchange, order_id = %update.order_id, status = ?other, "Order status changed");
            }
        }
        Ok(())
    }

    fn fill_message(&self, processing: &ProcessingOrder, what: &str) -> String {
        let pair = self
            .store
            .get_symbol_by_id(processing.symbol_id)
            .ok()
            .flatten()
            .map(|s: Symbol| s.pair())
            .unwrap_or_else(|| format!("symbol {}", processing.symbol_id));
        format!(
            "{}: {} {} {} @ {} {}",
            self.exchange, processing.order_type, processing.volume, pair, processing.price, what
        )
    }

    /// Report processing orders left without an exchange id by a previous run.
    ///
    /// They are never resubmitted: the venue may already hold them.
    pub fn recover(&self) -> EngineResult<usize> {
        let orphans: Vec<ProcessingOrder> = self
            .store
            .list_processing()?
            .into_iter()
            .filter(|p| p.status == OrderStatus::Processing && p.order_id.is_none())
            .collect();
        for orphan in &orphans {
            warn!(
                exchange = %self.exchange,
                processing_id = orphan.id,
                symbol_id = orphan.symbol_id,
                side = %orphan.order_type,
                price = %orphan.price,
                "Processing order without exchange id from a previous run, check the venue"
            );
        }
        self.refresh_pending_gauge();
        Ok(orphans.len())
    }

    pub fn refresh_pending_gauge(&self) {
        match self.store.list_orders() {
            Ok(orders) => Metrics::pending_orders(&self.exchange, orders.len()),
            Err(e) => debug!(exchange = %self.exchange, error = %e, "Pending gauge not refreshed"),
        }
    }

    /// Wait until every placement task has finished.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            while tasks.join_next().await.is_some() {}
        }
    }

    /// Stop accepting observations and cancel placement tasks.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        tasks.shutdown().await;
        info!(exchange = %self.exchange, cancelled = count, "Trigger engine stopped");
    }
}

fn status_label(status: &OrderUpdateStatus) -> &'static str {
    match status {
        OrderUpdateStatus::New => "new",
        OrderUpdateStatus::PartiallyFilled => "partially_filled",
        OrderUpdateStatus::Filled => "filled",
        OrderUpdateStatus::Canceled => "canceled",
        OrderUpdateStatus::Rejected => "rejected",
        OrderUpdateStatus::Other(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;
    use crate::placer::MockPlacer;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tripwire_core::{NewOrder, OrderSide, Product, Volume};
    use tripwire_store::TableStore;

    const BUSY: i64 = 100_001;
    const BROKE: i64 = 300_001;

    fn store() -> (Arc<TableStore>, Symbol) {
        let store = Arc::new(TableStore::in_memory());
        store
            .add_symbols(&[Product {
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                ticker: "BTCUSDT".to_string(),
            }])
            .unwrap();
        let symbol = store.get_symbol("BTC", "USDT").unwrap().unwrap();
        (store, symbol)
    }

    fn add(store: &TableStore, symbol: &Symbol, side: OrderSide, trigger: Decimal) -> u64 {
        store
            .add_order(NewOrder {
                symbol_id: symbol.id,
                trigger_price: Price::new(trigger),
                price: Price::new(trigger),
                order_type: side,
                volume: Volume::new(dec!(0.5)),
                add_timestamp: Utc::now(),
            })
            .unwrap()
            .id
    }

    fn config(damp_count: u32) -> EngineConfig {
        EngineConfig {
            damping_codes: [BUSY].into_iter().collect(),
            insufficient_balance_codes: [BROKE].into_iter().collect(),
            damp_count,
            damp_interval_ms: 1,
            ..EngineConfig::default()
        }
    }

    fn engine(
        store: Arc<TableStore>,
        placer: Arc<MockPlacer>,
        notifier: MockNotifier,
        config: EngineConfig,
    ) -> Arc<TriggerEngine> {
        Arc::new(TriggerEngine::new(
            "test",
            store,
            placer,
            Arc::new(notifier),
            config,
        ))
    }

    fn p(v: Decimal) -> Option<Price> {
        Some(Price::new(v))
    }

    #[tokio::test]
    async fn test_damping_bound() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(BUSY));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).return_const(());

        let engine = engine(store.clone(), placer.clone(), notifier, config(3));
        assert_eq!(engine.observe("BTCUSDT", p(dec!(99)), None).unwrap(), 1);
        engine.drain().await;

        // first attempt plus three retries
        assert_eq!(placer.call_count(), 4);
        assert!(store.list_processing().unwrap().is_empty());
        assert!(store.list_orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_damping_then_accept() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Sell, dec!(50));
        let placer = Arc::new(
            MockPlacer::replying(0)
                .then(Ok(MockPlacer::reply(BUSY)))
                .then(Err(tripwire_exchange::ExchangeError::Transport(
                    "reset".to_string(),
                ))),
        );
        let engine = engine(store.clone(), placer.clone(), MockNotifier::new(), config(5));

        engine.observe("BTCUSDT", None, p(dec!(51))).unwrap();
        engine.drain().await;

        assert_eq!(placer.call_count(), 3);
        let processing = store.list_processing().unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].order_id.as_deref(), Some("X3"));
        assert_eq!(processing[0].status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_damping_disabled_leaves_order_processing() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(BUSY));
        let engine = engine(
            store.clone(),
            placer.clone(),
            MockNotifier::new(),
            EngineConfig {
                damping: false,
                ..config(3)
            },
        );

        engine.observe("BTCUSDT", p(dec!(90)), None).unwrap();
        engine.drain().await;

        assert_eq!(placer.call_count(), 1);
        let processing = store.list_processing().unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].order_id, None);
    }

    #[tokio::test]
    async fn test_terminal_outcomes() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(BROKE));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|m: &str| m.contains("insufficient balance"))
            .times(1)
            .return_const(());
        let engine = engine(store.clone(), placer.clone(), notifier, config(3));

        engine.observe("BTCUSDT", p(dec!(90)), None).unwrap();
        engine.drain().await;
        let processing = store.list_processing().unwrap();
        assert_eq!(processing[0].status, OrderStatus::InsufficientBalance);

        // any other code drops the processing order
        let (store, symbol) = self::store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(-2010));
        let engine = self::engine(store.clone(), placer, MockNotifier::new(), config(3));
        engine.observe("BTCUSDT", p(dec!(90)), None).unwrap();
        engine.drain().await;
        assert!(store.list_processing().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bid_ask_partition() {
        let (store, symbol) = store();
        let buy_100 = add(&store, &symbol, OrderSide::Buy, dec!(100));
        add(&store, &symbol, OrderSide::Buy, dec!(90));
        let sell_110 = add(&store, &symbol, OrderSide::Sell, dec!(110));
        add(&store, &symbol, OrderSide::Sell, dec!(120));
        let placer = Arc::new(MockPlacer::replying(0));
        let engine = engine(store.clone(), placer.clone(), MockNotifier::new(), config(0));

        assert_eq!(engine.observe("BTCUSDT", p(dec!(95)), p(dec!(95))).unwrap(), 1);
        engine.drain().await;
        let remaining: Vec<u64> = store.list_orders().unwrap().iter().map(|o| o.id).collect();
        assert!(!remaining.contains(&buy_100));
        assert_eq!(remaining.len(), 3);

        // trigger >= 115 matches no BUY; trigger <= 115 matches SELL@110 only
        assert_eq!(engine.observe("BTCUSDT", p(dec!(115)), p(dec!(115))).unwrap(), 1);
        engine.drain().await;
        let remaining: Vec<u64> = store.list_orders().unwrap().iter().map(|o| o.id).collect();
        assert!(!remaining.contains(&sell_110));
        assert_eq!(remaining.len(), 2);
        assert_eq!(placer.call_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observations_promote_once() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(0));
        let engine = engine(store.clone(), placer.clone(), MockNotifier::new(), config(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    // distinct prices so the sweep limits never short-circuit
                    let bid = Price::new(dec!(99) - Decimal::from(i));
                    engine.observe("BTCUSDT", Some(bid), None).unwrap()
                })
            })
            .collect();
        let mut promoted = 0;
        for handle in handles {
            promoted += handle.await.unwrap();
        }
        engine.drain().await;

        assert_eq!(promoted, 1);
        assert_eq!(placer.call_count(), 1);
        assert_eq!(store.list_processing().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_limits_skip_and_reset() {
        let (store, symbol) = store();
        let placer = Arc::new(MockPlacer::replying(0));
        let engine = engine(store.clone(), placer.clone(), MockNotifier::new(), config(0));

        assert_eq!(engine.observe("BTCUSDT", p(dec!(100)), None).unwrap(), 0);
        add(&store, &symbol, OrderSide::Buy, dec!(150));
        // floor is 100, so 120 is skipped even though the new order would match
        assert_eq!(engine.observe("BTCUSDT", p(dec!(120)), None).unwrap(), 0);

        engine.limits().reset(symbol.id);
        assert_eq!(engine.observe("BTCUSDT", p(dec!(120)), None).unwrap(), 1);
        engine.drain().await;
    }

    #[tokio::test]
    async fn test_failed_promotion_does_not_mask_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let store = Arc::new(TableStore::open(data.join("orders.json")).unwrap());
        store
            .add_symbols(&[Product {
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                ticker: "BTCUSDT".to_string(),
            }])
            .unwrap();
        let symbol = store.get_symbol("BTC", "USDT").unwrap().unwrap();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(0));
        let engine = engine(store.clone(), placer.clone(), MockNotifier::new(), config(0));

        // snapshot writes fail while the directory is gone
        std::fs::remove_dir_all(&data).unwrap();
        assert_eq!(engine.observe("BTCUSDT", p(dec!(99)), None).unwrap(), 0);
        assert_eq!(store.list_orders().unwrap().len(), 1);

        std::fs::create_dir_all(&data).unwrap();
        assert_eq!(engine.observe("BTCUSDT", p(dec!(99.5)), None).unwrap(), 1);
        engine.drain().await;
        assert_eq!(placer.call_count(), 1);
        assert!(store.list_orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_ignored() {
        let (store, _) = store();
        let placer = Arc::new(MockPlacer::replying(0));
        let engine = engine(store, placer.clone(), MockNotifier::new(), config(0));
        assert_eq!(engine.observe("DOGEUSDT", p(dec!(1)), p(dec!(1))).unwrap(), 0);
        assert_eq!(placer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_order_updates() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(0));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|m: &str| m.contains("BTC/USDT") && m.ends_with("partially filled"))
            .times(1)
            .return_const(());
        notifier
            .expect_notify()
            .withf(|m: &str| m.ends_with(" filled") && !m.contains("partially"))
            .times(1)
            .return_const(());
        let engine = engine(store.clone(), placer, notifier, config(0));

        engine.observe("BTCUSDT", p(dec!(90)), None).unwrap();
        engine.drain().await;

        let update = |status| OrderUpdateEvent {
            order_id: "X1".to_string(),
            ticker: Some("BTCUSDT".to_string()),
            status,
        };
        engine.apply_order_update(&update(OrderUpdateStatus::New)).unwrap();
        engine
            .apply_order_update(&update(OrderUpdateStatus::PartiallyFilled))
            .unwrap();
        assert_eq!(store.list_processing().unwrap()[0].status, OrderStatus::Processing);

        engine.apply_order_update(&update(OrderUpdateStatus::Filled)).unwrap();
        assert_eq!(store.list_processing().unwrap()[0].status, OrderStatus::Done);

        // unknown ids are ignored
        engine
            .apply_order_update(&OrderUpdateEvent {
                order_id: "nope".to_string(),
                ticker: None,
                status: OrderUpdateStatus::Filled,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_damping() {
        let (store, symbol) = store();
        add(&store, &symbol, OrderSide::Buy, dec!(100));
        let placer = Arc::new(MockPlacer::replying(BUSY));
        let engine = engine(
            store.clone(),
            placer.clone(),
            MockNotifier::new(),
            EngineConfig {
                damp_interval_ms: 60_000,
                ..config(200)
            },
        );

        engine.observe("BTCUSDT", p(dec!(90)), None).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(engine.in_flight(), 1);
        engine.shutdown().await;

        assert!(engine.is_shut_down());
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(placer.call_count(), 1);
        assert_eq!(store.list_processing().unwrap().len(), 1);
        assert_eq!(engine.observe("BTCUSDT", p(dec!(1)), None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recover_reports_orphans() {
        let (store, symbol) = store();
        let id = add(&store, &symbol, OrderSide::Buy, dec!(100));
        store.promote(id).unwrap();
        let engine = engine(
            store,
            Arc::new(MockPlacer::replying(0)),
            MockNotifier::new(),
            config(0),
        );
        assert_eq!(engine.recover().unwrap(), 1);
    }
}
