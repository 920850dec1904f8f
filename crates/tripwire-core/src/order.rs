//! Conditional orders and their lifecycle.
//!
//! A pending [`Order`] is watched by the trigger engine. When the market
//! crosses its trigger price it is promoted into a [`ProcessingOrder`], which
//! carries a frozen copy of the submission parameters and the exchange outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Volume};
use crate::symbol::SymbolId;

/// Store-assigned identifier of a pending order.
pub type OrderId = u64;

/// Store-assigned identifier of a processing order.
pub type ProcessingOrderId = u64;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl OrderSide {
    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn as_lower(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upper())
    }
}

/// Exchange order kind used when a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Limit,
    Market,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Time-in-force for triggered limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoodTilCancelled => "GTC",
            Self::ImmediateOrCancel => "IOC",
        }
    }
}

/// Lifecycle status of a promoted order.
///
/// `Processing` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Processing,
    Done,
    Error,
    InsufficientBalance,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// A conditional order waiting for its trigger price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol_id: SymbolId,
    pub trigger_price: Price,
    pub price: Price,
    pub order_type: OrderSide,
    pub volume: Volume,
    pub add_timestamp: DateTime<Utc>,
}

impl Order {
    /// Whether a best bid of `bid` crosses this order (bid set: BUY with trigger >= bid).
    pub fn crosses_bid(&self, bid: Price) -> bool {
        self.order_type == OrderSide::Buy && self.trigger_price >= bid
    }

    /// Whether a best ask of `ask` crosses this order (ask set: SELL with trigger <= ask).
    pub fn crosses_ask(&self, ask: Price) -> bool {
        self.order_type == OrderSide::Sell && self.trigger_price <= ask
    }
}

/// Parameters for a new pending order; the store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol_id: SymbolId,
    pub trigger_price: Price,
    pub price: Price,
    pub order_type: OrderSide,
    pub volume: Volume,
    pub add_timestamp: DateTime<Utc>,
}

impl NewOrder {
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            symbol_id: self.symbol_id,
            trigger_price: self.trigger_price,
            price: self.price,
            order_type: self.order_type,
            volume: self.volume,
            add_timestamp: self.add_timestamp,
        }
    }
}

/// A promoted order being submitted to, or already known by, the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOrder {
    pub id: ProcessingOrderId,
    /// Exchange-assigned identifier, set once placement is accepted.
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub symbol_id: SymbolId,
    pub price: Price,
    pub volume: Volume,
    pub order_type: OrderSide,
    pub trigger_price: Price,
    pub created_at: DateTime<Utc>,
}

impl ProcessingOrder {
    /// Freeze the submission parameters of `order`.
    pub fn from_order(id: ProcessingOrderId, order: &Order, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            order_id: None,
            status: OrderStatus::Processing,
            symbol_id: order.symbol_id,
            price: order.price,
            volume: order.volume,
            order_type: order.order_type,
            trigger_price: order.trigger_price,
            created_at,
        }
    }
}
