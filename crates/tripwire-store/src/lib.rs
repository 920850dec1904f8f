//! Storage for symbols, pending orders, processing orders and quick buttons.
//!
//! `OrderStore` is the contract; `TableStore` keeps everything in memory and,
//! when opened on a path, snapshots to JSON after every mutation.

pub mod error;
pub mod store;
pub mod table;

pub use error::{StoreError, StoreResult};
pub use store::OrderStore;
pub use table::TableStore;
