//! Persistence contract consumed by the trigger engine and the order desk.

use crate::error::StoreResult;
use std::collections::BTreeSet;
use tripwire_core::{
    ExportDocument, NewButton, NewOrder, Order, OrderId, OrderStatus, Price, ProcessingOrder,
    ProcessingOrderId, Product, QuickButton, Symbol, SymbolId, SymbolUpdate,
};

/// Synchronous store. Every mutating call is durable when it returns.
pub trait OrderStore: Send + Sync {
    // Symbols

    fn get_symbol(&self, base: &str, quote: &str) -> StoreResult<Option<Symbol>>;

    fn get_symbol_by_id(&self, id: SymbolId) -> StoreResult<Option<Symbol>>;

    fn get_symbol_by_ticker(&self, ticker: &str) -> StoreResult<Option<Symbol>>;

    /// Idempotent upsert keyed by base/quote. Returns how many were new.
    fn add_symbols(&self, products: &[Product]) -> StoreResult<usize>;

    fn update_symbol(&self, id: SymbolId, update: &SymbolUpdate) -> StoreResult<Symbol>;

    /// Fails with `SymbolInUse` while a pending or processing order refers to it.
    fn delete_symbol(&self, id: SymbolId) -> StoreResult<Symbol>;

    fn list_symbols(&self) -> StoreResult<Vec<Symbol>>;

    // Pending orders

    fn add_order(&self, order: NewOrder) -> StoreResult<Order>;

    fn list_orders(&self) -> StoreResult<Vec<Order>>;

    /// BUY orders on `symbol` with `trigger_price >= price`.
    fn pending_crossing_bid(&self, symbol: SymbolId, price: Price) -> StoreResult<Vec<Order>>;

    /// SELL orders on `symbol` with `trigger_price <= price`.
    fn pending_crossing_ask(&self, symbol: SymbolId, price: Price) -> StoreResult<Vec<Order>>;

    /// Pending orders on `symbol`.
    fn count_orders_for(&self, symbol: SymbolId) -> StoreResult<usize>;

    /// Distinct symbols referenced by pending orders.
    fn active_symbol_ids(&self) -> StoreResult<BTreeSet<SymbolId>>;

    fn delete_order(&self, id: OrderId) -> StoreResult<Order>;

    /// Remove every pending order, returning what was removed.
    fn delete_all_orders(&self) -> StoreResult<Vec<Order>>;

    // Processing orders

    /// Atomically remove the pending order and insert its processing form.
    /// `Conflict` if the order is already gone.
    fn promote(&self, id: OrderId) -> StoreResult<ProcessingOrder>;

    fn list_processing(&self) -> StoreResult<Vec<ProcessingOrder>>;

    fn find_processing_by_exchange_id(
        &self,
        exchange_order_id: &str,
    ) -> StoreResult<Option<ProcessingOrder>>;

    /// Record the exchange id. `Conflict` if another row already holds it.
    fn set_exchange_order_id(
        &self,
        id: ProcessingOrderId,
        exchange_order_id: &str,
    ) -> StoreResult<()>;

    fn set_status(&self, id: ProcessingOrderId, status: OrderStatus) -> StoreResult<()>;

    fn delete_processing(&self, id: ProcessingOrderId) -> StoreResult<()>;

    // Quick buttons

    fn list_buttons(&self) -> StoreResult<Vec<QuickButton>>;

    fn add_button(&self, button: NewButton) -> StoreResult<QuickButton>;

    fn delete_button(&self, id: u64) -> StoreResult<()>;

    // Export / import

    fn export_orders(&self) -> StoreResult<ExportDocument>;

    /// Insert every document entry as a new pending order. Unknown pairs
    /// abort the import before anything is written.
    fn import_orders(&self, document: &ExportDocument) -> StoreResult<Vec<Order>>;

    /// Persist any buffered state.
    fn flush(&self) -> StoreResult<()>;
}
