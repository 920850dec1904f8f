//! Portable JSON form of the pending order book.
//!
//! Symbols are referenced by their `"BASE/QUOTE"` pair rather than by store
//! id, so a document exported from one store can be imported into another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Price, Volume};
use crate::order::OrderSide;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub orders: Vec<ExportedOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedOrder {
    pub symbol: String,
    pub trigger_price: Price,
    pub price: Price,
    pub order_type: OrderSide,
    pub volume: Volume,
    pub add_timestamp: DateTime<Utc>,
}
