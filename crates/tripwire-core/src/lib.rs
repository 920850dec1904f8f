//! Core domain types for the tripwire bot.
//!
//! This crate provides the records shared by every other crate:
//! - `Symbol`: tradable pair as known to one exchange
//! - `Order`, `ProcessingOrder`: conditional order before and after promotion
//! - `Price`, `Volume`: precision-safe numeric types
//! - `ExportDocument`: portable form of the pending order book

pub mod button;
pub mod decimal;
pub mod error;
pub mod export;
pub mod order;
pub mod symbol;

pub use button::{NewButton, QuickButton};
pub use decimal::{Price, Volume};
pub use error::{CoreError, Result};
pub use export::{ExportDocument, ExportedOrder};
pub use order::{
    NewOrder, Order, OrderId, OrderKind, OrderSide, OrderStatus, ProcessingOrder,
    ProcessingOrderId, TimeInForce,
};
pub use symbol::{parse_pair, Product, Symbol, SymbolId, SymbolUpdate};
