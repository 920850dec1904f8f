//! Stream handlers that feed the trigger engine.

use crate::engine::TriggerEngine;
use std::sync::Arc;
use tracing::error;
use tripwire_telemetry::Metrics;
use tripwire_ws::{BoxFuture, StreamEvent, StreamHandler};

/// Ticker frames observe `(last, last)`; depth frames observe the extracted
/// best levels.
pub struct PriceHandler {
    engine: Arc<TriggerEngine>,
}

impl PriceHandler {
    pub fn new(engine: Arc<TriggerEngine>) -> Self {
        Self { engine }
    }
}

impl StreamHandler for PriceHandler {
    fn accepts(&self, event: &StreamEvent) -> bool {
        matches!(event, StreamEvent::Ticker(_) | StreamEvent::Depth(_))
    }

    fn handle<'a>(&'a self, event: &'a StreamEvent) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let (ticker, bid, ask) = match event {
                StreamEvent::Ticker(t) => (&t.ticker, Some(t.last), Some(t.last)),
                StreamEvent::Depth(d) => (&d.ticker, d.bid, d.ask),
                _ => return,
            };
            Metrics::price_update(self.engine.exchange(), "stream");
            if let Err(e) = self.engine.observe(ticker, bid, ask) {
                error!(exchange = %self.engine.exchange(), %ticker, error = %e, "Observation failed");
            }
        })
    }
}

pub struct OrderUpdateHandler {
    engine: Arc<TriggerEngine>,
}

impl OrderUpdateHandler {
    pub fn new(engine: Arc<TriggerEngine>) -> Self {
        Self { engine }
    }
}

impl StreamHandler for OrderUpdateHandler {
    fn accepts(&self, event: &StreamEvent) -> bool {
        matches!(event, StreamEvent::OrderUpdate(_))
    }

    fn handle<'a>(&'a self, event: &'a StreamEvent) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let StreamEvent::OrderUpdate(update) = event else {
                return;
            };
            if let Err(e) = self.engine.apply_order_update(update) {
                error!(exchange = %self.engine.exchange(), order_id = %update.order_id, error = %e, "Order update failed");
            }
        })
    }
}
