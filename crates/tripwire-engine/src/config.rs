//! Trigger engine configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tripwire_core::{OrderKind, TimeInForce};

/// Placement and damping settings for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry placements that come back with a damping code.
    #[serde(default = "default_damping")]
    pub damping: bool,

    /// Venue codes meaning "busy, try again".
    #[serde(default)]
    pub damping_codes: BTreeSet<i64>,

    /// Venue codes meaning the account cannot fund the order.
    #[serde(default)]
    pub insufficient_balance_codes: BTreeSet<i64>,

    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_damp_count")]
    pub damp_count: u32,

    #[serde(default = "default_damp_interval_ms")]
    pub damp_interval_ms: u64,

    #[serde(default)]
    pub order_kind: OrderKind,

    #[serde(default)]
    pub time_in_force: TimeInForce,
}

fn default_damping() -> bool {
    true
}

fn default_damp_count() -> u32 {
    200
}

fn default_damp_interval_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            damping: default_damping(),
            damping_codes: BTreeSet::new(),
            insufficient_balance_codes: BTreeSet::new(),
            damp_count: default_damp_count(),
            damp_interval_ms: default_damp_interval_ms(),
            order_kind: OrderKind::default(),
            time_in_force: TimeInForce::default(),
        }
    }
}

impl EngineConfig {
    pub fn damp_interval(&self) -> Duration {
        Duration::from_millis(self.damp_interval_ms)
    }
}
