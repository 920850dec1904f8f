//! Per-symbol sweep limits.
//!
//! After a bid sweep at price `p` every BUY order with `trigger >= p` has been
//! promoted, so a later bid at or above `p` cannot match anything new. The
//! same holds for asks at or below the last swept ask. Limits are dropped
//! whenever the order set of a symbol changes.

use parking_lot::Mutex;
use std::collections::HashMap;
use tripwire_core::{Price, SymbolId};

#[derive(Debug, Default, Clone, Copy)]
struct Limit {
    floor: Option<Price>,
    ceil: Option<Price>,
    generation: u64,
}

/// Token taken before querying the store. A sweep only records its price if
/// no reset happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepTicket(u64);

#[derive(Debug, Default)]
pub struct TriggerLimits {
    inner: Mutex<HashMap<SymbolId, Limit>>,
}

impl TriggerLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self, symbol: SymbolId) -> SweepTicket {
        SweepTicket(self.inner.lock().get(&symbol).map_or(0, |l| l.generation))
    }

    pub fn needs_bid_sweep(&self, symbol: SymbolId, bid: Price) -> bool {
        match self.inner.lock().get(&symbol).and_then(|l| l.floor) {
            Some(floor) => bid < floor,
            None => true,
        }
    }

    pub fn needs_ask_sweep(&self, symbol: SymbolId, ask: Price) -> bool {
        match self.inner.lock().get(&symbol).and_then(|l| l.ceil) {
            Some(ceil) => ask > ceil,
            None => true,
        }
    }

    pub fn record_bid(&self, symbol: SymbolId, bid: Price, ticket: SweepTicket) {
        let mut inner = self.inner.lock();
        let limit = inner.entry(symbol).or_default();
        if limit.generation == ticket.0 {
            limit.floor = Some(limit.floor.map_or(bid, |f| f.min(bid)));
        }
    }

    pub fn record_ask(&self, symbol: SymbolId, ask: Price, ticket: SweepTicket) {
        let mut inner = self.inner.lock();
        let limit = inner.entry(symbol).or_default();
        if limit.generation == ticket.0 {
            limit.ceil = Some(limit.ceil.map_or(ask, |c| c.max(ask)));
        }
    }

    pub fn reset(&self, symbol: SymbolId) {
        let mut inner = self.inner.lock();
        let limit = inner.entry(symbol).or_default();
        limit.floor = None;
        limit.ceil = None;
        limit.generation += 1;
    }

    pub fn reset_all(&self) {
        for limit in self.inner.lock().values_mut() {
            limit.floor = None;
            limit.ceil = None;
            limit.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(v: rust_decimal::Decimal) -> Price {
        Price::new(v)
    }

    #[test]
    fn test_bid_floor_skips_higher_prices() {
        let limits = TriggerLimits::new();
        assert!(limits.needs_bid_sweep(1, p(dec!(100))));

        let ticket = limits.ticket(1);
        limits.record_bid(1, p(dec!(100)), ticket);

        assert!(!limits.needs_bid_sweep(1, p(dec!(100))));
        assert!(!limits.needs_bid_sweep(1, p(dec!(120))));
        assert!(limits.needs_bid_sweep(1, p(dec!(99.5))));
        // other symbols are unaffected
        assert!(limits.needs_bid_sweep(2, p(dec!(120))));
    }

    #[test]
    fn test_ask_ceil_skips_lower_prices() {
        let limits = TriggerLimits::new();
        let ticket = limits.ticket(1);
        limits.record_ask(1, p(dec!(50)), ticket);

        assert!(!limits.needs_ask_sweep(1, p(dec!(50))));
        assert!(!limits.needs_ask_sweep(1, p(dec!(10))));
        assert!(limits.needs_ask_sweep(1, p(dec!(51))));
    }

    #[test]
    fn test_reset_clears_and_invalidates_stale_tickets() {
        let limits = TriggerLimits::new();
        let stale = limits.ticket(1);
        limits.record_bid(1, p(dec!(100)), stale);

        limits.reset(1);
        assert!(limits.needs_bid_sweep(1, p(dec!(150))));

        // a sweep that started before the reset must not restore the floor
        limits.record_bid(1, p(dec!(100)), stale);
        assert!(limits.needs_bid_sweep(1, p(dec!(150))));

        let fresh = limits.ticket(1);
        limits.record_bid(1, p(dec!(100)), fresh);
        assert!(!limits.needs_bid_sweep(1, p(dec!(150))));
    }
}
