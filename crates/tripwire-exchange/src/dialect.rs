//! Venue REST dialects.
//!
//! A [`Dialect`] knows the paths, parameter names and response shapes of one
//! venue. It builds [`RequestSpec`]s for the generic connector and turns raw
//! JSON back into typed values. It never performs I/O.

use crate::error::{ExchangeError, ExchangeResult};
use crate::transport::HttpMethod;
use serde_json::Value;
use tripwire_core::{OrderKind, OrderSide, Price, Product, TimeInForce, Volume};

/// How a request is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    Public,
    /// API key header only, no signature.
    ApiKey,
    /// API key header plus signature.
    Signed,
}

/// Logical REST call, before URL resolution and signing.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: HttpMethod,
    /// Path relative to the resolved base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub auth: Auth,
    /// Put the timestamp into the signed parameters.
    pub timestamp: bool,
    /// Pin the signing timestamp (used when the body embeds it too).
    pub fixed_timestamp: Option<u64>,
    /// The base URL must include the account group.
    pub requires_group: bool,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: Auth::Public,
            timestamp: false,
            fixed_timestamp: None,
            requires_group: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn api_key(mut self) -> Self {
        self.auth = Auth::ApiKey;
        self
    }

    /// Signed and timestamped.
    pub fn signed(mut self) -> Self {
        self.auth = Auth::Signed;
        self.timestamp = true;
        self
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.fixed_timestamp = Some(timestamp);
        self
    }

    pub fn with_group(mut self) -> Self {
        self.requires_group = true;
        self
    }
}

/// One order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub ticker: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub price: Price,
    pub volume: Volume,
    pub time_in_force: TimeInForce,
}

/// Venue reply normalized so that `code == 0` means accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderResponse {
    pub code: i64,
    pub order_id: Option<String>,
    pub message: Option<String>,
    pub raw: Value,
}

impl PlaceOrderResponse {
    /// Code used when the reply carries neither an order id nor a code.
    pub const UNKNOWN_CODE: i64 = -1;

    pub fn is_accepted(&self) -> bool {
        self.code == 0
    }
}

pub trait Dialect: Send + Sync {
    fn products_request(&self) -> RequestSpec;

    fn parse_products(&self, body: &Value) -> ExchangeResult<Vec<Product>>;

    fn price_request(&self, ticker: &str) -> RequestSpec;

    fn parse_price(&self, body: &Value, ticker: &str) -> ExchangeResult<Price>;

    /// Last price of every listed ticker in one call.
    fn tickers_request(&self) -> RequestSpec;

    fn parse_tickers(&self, body: &Value) -> ExchangeResult<Vec<(String, Price)>>;

    fn place_order_request(&self, order: &PlaceOrderRequest, timestamp: u64) -> RequestSpec;

    fn parse_place_order(&self, body: Value) -> PlaceOrderResponse;

    /// Whether a well-formed body reports a rejected signature or key.
    fn is_auth_failure(&self, body: &Value) -> bool;

    /// Stream channel carrying price updates for `ticker`.
    fn price_channel(&self, ticker: &str) -> String;

    /// Channel for account order updates on the main stream, if the venue
    /// multiplexes them there.
    fn order_channel(&self) -> Option<String>;

    /// Exchange-native ticker for a pair.
    fn ticker_for(&self, base: &str, quote: &str) -> String;
}

/// Read a field that venues send either as a JSON string or a number.
pub(crate) fn price_field(value: &Value, field: &str) -> ExchangeResult<Price> {
    Price::from_json(&value[field])
        .ok_or_else(|| ExchangeError::UnexpectedResponse(format!("missing or invalid `{field}`")))
}

/// Stringify an id that may arrive as a number or a string.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
