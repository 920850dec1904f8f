//! Prometheus metrics for the tripwire bot.
//!
//! Every series carries an `exchange` label so pipelines can be told apart.
//!
//! # Panics
//!
//! Registration unwraps: a duplicate metric name is a startup bug and should
//! crash at first use, never at an arbitrary later point.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_gauge_vec, CounterVec, Encoder, IntGaugeVec, TextEncoder,
};

/// Open stream connections per exchange.
pub static WS_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tripwire_ws_connected",
        "Open stream connections",
        &["exchange"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_ws_reconnect_total",
        "Stream connections reopened after a loss",
        &["exchange"]
    )
    .unwrap()
});

/// Labels: source (stream/poll)
pub static PRICE_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_price_updates_total",
        "Price observations received",
        &["exchange", "source"]
    )
    .unwrap()
});

pub static TRIGGERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_triggers_total",
        "Pending orders whose trigger price was crossed",
        &["exchange", "side"]
    )
    .unwrap()
});

pub static PROMOTIONS_LOST_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_promotions_lost_total",
        "Promotions that lost a race to another observation",
        &["exchange"]
    )
    .unwrap()
});

/// Labels: outcome (see [`PlacementOutcome`])
pub static PLACEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_placements_total",
        "Order placement results",
        &["exchange", "outcome"]
    )
    .unwrap()
});

pub static DAMPING_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_damping_retries_total",
        "Placement retries after a damping code",
        &["exchange"]
    )
    .unwrap()
});

pub static ORDER_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_order_updates_total",
        "Order status updates received from the exchange",
        &["exchange", "status"]
    )
    .unwrap()
});

pub static PENDING_ORDERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tripwire_pending_orders",
        "Pending conditional orders",
        &["exchange"]
    )
    .unwrap()
});

/// Labels: result (sent/failed)
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tripwire_notifications_total",
        "Operator notifications",
        &["result"]
    )
    .unwrap()
});

/// Final result of one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    Accepted,
    Damped,
    DampingExhausted,
    InsufficientBalance,
    Rejected,
    AuthFailed,
}

impl PlacementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Damped => "damped",
            Self::DampingExhausted => "damping_exhausted",
            Self::InsufficientBalance => "insufficient_balance",
            Self::Rejected => "rejected",
            Self::AuthFailed => "auth_failed",
        }
    }
}

/// Facade over the metric statics.
pub struct Metrics;

impl Metrics {
    pub fn ws_connections(exchange: &str, open: usize) {
        WS_CONNECTED
            .with_label_values(&[exchange])
            .set(open as i64);
    }

    pub fn ws_reconnect(exchange: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[exchange]).inc();
    }

    pub fn price_update(exchange: &str, source: &str) {
        PRICE_UPDATES_TOTAL
            .with_label_values(&[exchange, source])
            .inc();
    }

    pub fn trigger(exchange: &str, side: &str) {
        TRIGGERS_TOTAL.with_label_values(&[exchange, side]).inc();
    }

    pub fn promotion_lost(exchange: &str) {
        PROMOTIONS_LOST_TOTAL.with_label_values(&[exchange]).inc();
    }

    pub fn placement(exchange: &str, outcome: PlacementOutcome) {
        PLACEMENTS_TOTAL
            .with_label_values(&[exchange, outcome.as_str()])
            .inc();
    }

    pub fn damping_retry(exchange: &str) {
        DAMPING_RETRIES_TOTAL.with_label_values(&[exchange]).inc();
    }

    pub fn order_update(exchange: &str, status: &str) {
        ORDER_UPDATES_TOTAL
            .with_label_values(&[exchange, status])
            .inc();
    }

    pub fn pending_orders(exchange: &str, count: usize) {
        PENDING_ORDERS
            .with_label_values(&[exchange])
            .set(count as i64);
    }

    pub fn notification(sent: bool) {
        let result = if sent { "sent" } else { "failed" };
        NOTIFICATIONS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
