//! Tradable pairs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Store-assigned identifier of a symbol.
pub type SymbolId = u64;

/// A tradable pair as known to one exchange.
///
/// `ticker` is the exchange-native name (`BTCUSDT` on Binance, `BTC/USDT` on
/// AscendEX). Only `name` and `short_description` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub base: String,
    pub quote: String,
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
}

impl Symbol {
    /// Human form used by the control surface and export documents.
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A pair as listed by an exchange, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub base: String,
    pub quote: String,
    pub ticker: String,
}

/// Split `"BASE/QUOTE"` into its assets, upper-cased.
pub fn parse_pair(pair: &str) -> Result<(String, String)> {
    let (base, quote) = pair
        .split_once('/')
        .ok_or_else(|| CoreError::InvalidPair(pair.to_string()))?;
    let (base, quote) = (base.trim(), quote.trim());
    if base.is_empty() || quote.is_empty() || quote.contains('/') {
        return Err(CoreError::InvalidPair(pair.to_string()));
    }
    Ok((base.to_uppercase(), quote.to_uppercase()))
}

/// Mutable descriptive fields of a symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
}
