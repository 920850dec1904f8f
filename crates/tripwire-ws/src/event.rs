//! Typed events decoded from venue stream frames.
//!
//! Every codec maps its wire format onto [`StreamEvent`]; handlers match on
//! the variant instead of probing raw JSON.

use serde_json::Value;
use tripwire_core::Price;

/// Last-trade ticker update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerEvent {
    /// Exchange-native ticker, normalised to upper case.
    pub ticker: String,
    pub last: Price,
}

/// Best levels extracted from an order-book frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthEvent {
    pub ticker: String,
    pub bid: Option<Price>,
    pub ask: Option<Price>,
}

/// Exchange order status as reported by an order-update frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderUpdateStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Other(String),
}

impl OrderUpdateStatus {
    /// Parse the status spellings used by Binance (`FILLED`) and AscendEX (`Filled`).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().replace('_', "").as_str() {
            "NEW" => Self::New,
            "PARTIALLYFILLED" => Self::PartiallyFilled,
            "FILLED" => Self::Filled,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            "REJECTED" | "EXPIRED" => Self::Rejected,
            _ => Self::Other(raw.to_string()),
        }
    }
}

/// Status change of an order the account placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdateEvent {
    pub order_id: String,
    pub ticker: Option<String>,
    pub status: OrderUpdateStatus,
}

/// Decoded stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Ticker(TickerEvent),
    Depth(DepthEvent),
    OrderUpdate(OrderUpdateEvent),
    /// Application-level ping that must be answered on the same connection.
    Ping(Value),
    /// Subscription acknowledgement or other request reply.
    Ack(Value),
    Unknown(Value),
}

/// Discriminant of [`StreamEvent`], used by handlers to declare interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ticker,
    Depth,
    OrderUpdate,
    Ping,
    Ack,
    Unknown,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ticker(_) => EventKind::Ticker,
            Self::Depth(_) => EventKind::Depth,
            Self::OrderUpdate(_) => EventKind::OrderUpdate,
            Self::Ping(_) => EventKind::Ping,
            Self::Ack(_) => EventKind::Ack,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Control events are handled by the pool itself and never fanned out.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Ack(_))
    }
}
