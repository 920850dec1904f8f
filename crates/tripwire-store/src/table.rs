//! In-process table store, optionally snapshotted to a JSON file.
//!
//! All tables live behind one mutex. A mutation runs against a copy of the
//! tables, the copy is written to disk, and only then does it replace the
//! live state, so a failed write leaves memory and disk in agreement.
//!
//! File snapshots are written to a sibling `.tmp` file and renamed into place.
//! Every mutation rewrites and fsyncs the whole file, which suits the few
//! hundred rows a desk holds. Inside a multi-threaded tokio runtime the write
//! runs under `block_in_place` so the worker's other tasks move elsewhere.

use crate::error::{StoreError, StoreResult};
use crate::store::OrderStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};
use tripwire_core::{
    parse_pair, ExportDocument, ExportedOrder, NewButton, NewOrder, Order, OrderId, OrderStatus,
    Price, ProcessingOrder, ProcessingOrderId, Product, QuickButton, Symbol, SymbolId,
    SymbolUpdate,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    symbols: BTreeMap<SymbolId, Symbol>,
    #[serde(default)]
    orders: BTreeMap<OrderId, Order>,
    #[serde(default)]
    processing: BTreeMap<ProcessingOrderId, ProcessingOrder>,
    #[serde(default)]
    buttons: BTreeMap<u64, QuickButton>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn symbol_by_pair(&self, base: &str, quote: &str) -> Option<&Symbol> {
        self.symbols
            .values()
            .find(|s| s.base.eq_ignore_ascii_case(base) && s.quote.eq_ignore_ascii_case(quote))
    }

    fn insert_order(&mut self, order: NewOrder) -> Order {
        let id = self.allocate_id();
        let order = order.into_order(id);
        self.orders.insert(id, order.clone());
        order
    }
}

enum Backing {
    Memory,
    File(PathBuf),
}

pub struct TableStore {
    tables: Mutex<Tables>,
    backing: Backing,
}

impl TableStore {
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            backing: Backing::Memory,
        }
    }

    /// Load `path` if it exists, otherwise start empty and create it on the
    /// first mutation.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let raw = fs::read(&path)?;
            let tables: Tables = serde_json::from_slice(&raw)?;
            info!(
                path = %path.display(),
                symbols = tables.symbols.len(),
                orders = tables.orders.len(),
                processing = tables.processing.len(),
                "Store loaded"
            );
            tables
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!(path = %path.display(), "Store created");
            Tables::default()
        };
        Ok(Self {
            tables: Mutex::new(tables),
            backing: Backing::File(path),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        Ok(f(&self.tables.lock()))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut live = self.tables.lock();
        let mut draft = live.clone();
        let out = f(&mut draft)?;
        self.persist(&draft)?;
        *live = draft;
        Ok(out)
    }

    fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Backing::File(path) = &self.backing else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(tables)?;
        blocking_io(|| write_snapshot(path, &bytes))
    }
}

fn write_snapshot(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Run blocking file I/O. On a multi-threaded runtime the current worker is
/// handed over first; elsewhere `f` runs inline.
fn blocking_io<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl OrderStore for TableStore {
    fn get_symbol(&self, base: &str, quote: &str) -> StoreResult<Option<Symbol>> {
        self.read(|t| t.symbol_by_pair(base, quote).cloned())
    }

    fn get_symbol_by_id(&self, id: SymbolId) -> StoreResult<Option<Symbol>> {
        self.read(|t| t.symbols.get(&id).cloned())
    }

    fn get_symbol_by_ticker(&self, ticker: &str) -> StoreResult<Option<Symbol>> {
        self.read(|t| t.symbols.values().find(|s| s.ticker == ticker).cloned())
    }

    fn add_symbols(&self, products: &[Product]) -> StoreResult<usize> {
        let added = self.mutate(|t| {
            let mut added = 0;
            for product in products {
                if t.symbol_by_pair(&product.base, &product.quote).is_some() {
                    continue;
                }
                let id = t.allocate_id();
                t.symbols.insert(
                    id,
                    Symbol {
                        id,
                        base: product.base.clone(),
                        quote: product.quote.clone(),
                        ticker: product.ticker.clone(),
                        name: None,
                        short_description: None,
                    },
                );
                added += 1;
            }
            Ok(added)
        })?;
        debug!(offered = products.len(), added, "Symbols upserted");
        Ok(added)
    }

    fn update_symbol(&self, id: SymbolId, update: &SymbolUpdate) -> StoreResult<Symbol> {
        self.mutate(|t| {
            let symbol = t
                .symbols
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("symbol {id}")))?;
            if update.name.is_some() {
                symbol.name = update.name.clone();
            }
            if update.short_description.is_some() {
                symbol.short_description = update.short_description.clone();
            }
            Ok(symbol.clone())
        })
    }

    fn delete_symbol(&self, id: SymbolId) -> StoreResult<Symbol> {
        self.mutate(|t| {
            let referenced = t.orders.values().any(|o| o.symbol_id == id)
                || t.processing.values().any(|p| p.symbol_id == id);
            if referenced {
                return Err(StoreError::SymbolInUse(id));
            }
            t.symbols
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("symbol {id}")))
        })
    }

    fn list_symbols(&self) -> StoreResult<Vec<Symbol>> {
        self.read(|t| t.symbols.values().cloned().collect())
    }

    fn add_order(&self, order: NewOrder) -> StoreResult<Order> {
        self.mutate(|t| {
            if !t.symbols.contains_key(&order.symbol_id) {
                return Err(StoreError::UnknownSymbol(order.symbol_id.to_string()));
            }
            Ok(t.insert_order(order))
        })
    }

    fn list_orders(&self) -> StoreResult<Vec<Order>> {
        self.read(|t| t.orders.values().cloned().collect())
    }

    fn pending_crossing_bid(&self, symbol: SymbolId, price: Price) -> StoreResult<Vec<Order>> {
        self.read(|t| {
            t.orders
                .values()
                .filter(|o| o.symbol_id == symbol && o.crosses_bid(price))
                .cloned()
                .collect()
        })
    }

    fn pending_crossing_ask(&self, symbol: SymbolId, price: Price) -> StoreResult<Vec<Order>> {
        self.read(|t| {
            t.orders
                .values()
                .filter(|o| o.symbol_id == symbol && o.crosses_ask(price))
                .cloned()
                .collect()
        })
    }

    fn count_orders_for(&self, symbol: SymbolId) -> StoreResult<usize> {
        self.read(|t| t.orders.values().filter(|o| o.symbol_id == symbol).count())
    }

    fn active_symbol_ids(&self) -> StoreResult<BTreeSet<SymbolId>> {
        self.read(|t| t.orders.values().map(|o| o.symbol_id).collect())
    }

    fn delete_order(&self, id: OrderId) -> StoreResult<Order> {
        self.mutate(|t| {
            t.orders
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
        })
    }

    fn delete_all_orders(&self) -> StoreResult<Vec<Order>> {
        self.mutate(|t| Ok(std::mem::take(&mut t.orders).into_values().collect()))
    }

    fn promote(&self, id: OrderId) -> StoreResult<ProcessingOrder> {
        self.mutate(|t| {
            let order = t
                .orders
                .remove(&id)
                .ok_or_else(|| StoreError::Conflict(format!("order {id} already promoted or deleted")))?;
            let processing_id = t.allocate_id();
            let processing = ProcessingOrder::from_order(processing_id, &order, Utc::now());
            t.processing.insert(processing_id, processing.clone());
            Ok(processing)
        })
    }

    fn list_processing(&self) -> StoreResult<Vec<ProcessingOrder>> {
        self.read(|t| t.processing.values().cloned().collect())
    }

    fn find_processing_by_exchange_id(
        &self,
        exchange_order_id: &str,
    ) -> StoreResult<Option<ProcessingOrder>> {
        self.read(|t| {
            t.processing
                .values()
                .find(|p| p.order_id.as_deref() == Some(exchange_order_id))
                .cloned()
        })
    }

    fn set_exchange_order_id(
        &self,
        id: ProcessingOrderId,
        exchange_order_id: &str,
    ) -> StoreResult<()> {
        self.mutate(|t| {
            let taken = t
                .processing
                .values()
                .any(|p| p.id != id && p.order_id.as_deref() == Some(exchange_order_id));
            if taken {
                return Err(StoreError::Conflict(format!(
                    "exchange order id {exchange_order_id} already recorded"
                )));
            }
            let row = t
                .processing
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("processing order {id}")))?;
            row.order_id = Some(exchange_order_id.to_string());
            Ok(())
        })
    }

    fn set_status(&self, id: ProcessingOrderId, status: OrderStatus) -> StoreResult<()> {
        self.mutate(|t| {
            let row = t
                .processing
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("processing order {id}")))?;
            if row.status.is_terminal() && row.status != status {
                warn!(id, from = ?row.status, to = ?status, "Terminal processing order changed");
            }
            row.status = status;
            Ok(())
        })
    }

    fn delete_processing(&self, id: ProcessingOrderId) -> StoreResult<()> {
        self.mutate(|t| {
            t.processing
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("processing order {id}")))
        })
    }

    fn list_buttons(&self) -> StoreResult<Vec<QuickButton>> {
        self.read(|t| t.buttons.values().cloned().collect())
    }

    fn add_button(&self, button: NewButton) -> StoreResult<QuickButton> {
        self.mutate(|t| {
            let id = t.allocate_id();
            let button = QuickButton {
                id,
                name: button.name,
                order_type: button.order_type,
                volume: button.volume,
            };
            t.buttons.insert(id, button.clone());
            Ok(button)
        })
    }

    fn delete_button(&self, id: u64) -> StoreResult<()> {
        self.mutate(|t| {
            t.buttons
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("button {id}")))
        })
    }

    fn export_orders(&self) -> StoreResult<ExportDocument> {
        self.read(|t| {
            let orders = t
                .orders
                .values()
                .filter_map(|o| {
                    let symbol = t.symbols.get(&o.symbol_id)?;
                    Some(ExportedOrder {
                        symbol: symbol.pair(),
                        trigger_price: o.trigger_price,
                        price: o.price,
                        order_type: o.order_type,
                        volume: o.volume,
                        add_timestamp: o.add_timestamp,
                    })
                })
                .collect();
            ExportDocument { orders }
        })
    }

    fn import_orders(&self, document: &ExportDocument) -> StoreResult<Vec<Order>> {
        self.mutate(|t| {
            let mut resolved = Vec::with_capacity(document.orders.len());
            for entry in &document.orders {
                let (base, quote) = parse_pair(&entry.symbol)?;
                let symbol = t
                    .symbol_by_pair(&base, &quote)
                    .ok_or_else(|| StoreError::UnknownSymbol(entry.symbol.clone()))?;
                resolved.push(NewOrder {
                    symbol_id: symbol.id,
                    trigger_price: entry.trigger_price,
                    price: entry.price,
                    order_type: entry.order_type,
                    volume: entry.volume,
                    add_timestamp: entry.add_timestamp,
                });
            }
            Ok(resolved.into_iter().map(|o| t.insert_order(o)).collect())
        })
    }

    fn flush(&self) -> StoreResult<()> {
        let tables = self.tables.lock();
        self.persist(&tables)
    }
}
