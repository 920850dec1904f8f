//! AscendEX (formerly BitMax) adapter.
//!
//! Private endpoints are scoped by an account group: the base URL becomes
//! `{host}/{group}/api/pro/v1` once `/info` has been read. One authenticated
//! stream per group carries depth and `order:cash` channels, and the venue
//! pings at the application level.

use crate::clock::TimestampSource;
use crate::dialect::{id_string, Dialect, PlaceOrderRequest, PlaceOrderResponse, RequestSpec};
use crate::error::{ExchangeError, ExchangeResult};
use crate::resolver::{AccountInfo, UrlResolver};
use crate::signer::HmacPathSigner;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tripwire_core::{parse_pair, OrderKind, Price, Product};
use tripwire_ws::{
    DepthEvent, HandshakeAuth, MessageCodec, OrderUpdateEvent, OrderUpdateStatus, StreamEvent,
    WsError, WsResult,
};

pub const DEFAULT_REST_URL: &str = "https://ascendex.com";

const API_PREFIX: &str = "api/pro/v1";

/// AUTHORIZATION_NEEDED and AUTHENTICATION_FAILED.
const AUTH_FAILURE_CODES: [i64; 2] = [100009, 200001];

pub struct AscendexResolver {
    rest_url: String,
    stream_root: String,
}

impl AscendexResolver {
    /// `stream_url` overrides the WebSocket host; by default it is the REST
    /// host with a `wss` scheme.
    pub fn new(rest_url: Option<String>, stream_url: Option<String>) -> Self {
        let rest_url = rest_url
            .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let stream_root = stream_url
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| match rest_url.strip_prefix("https://") {
                Some(host) => format!("wss://{host}"),
                None => rest_url.replacen("http://", "ws://", 1),
            });
        Self {
            rest_url,
            stream_root,
        }
    }
}

impl Default for AscendexResolver {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl UrlResolver for AscendexResolver {
    fn base_url(&self, group: Option<&str>) -> String {
        match group {
            Some(group) => format!("{}/{group}/{API_PREFIX}", self.rest_url),
            None => format!("{}/{API_PREFIX}", self.rest_url),
        }
    }

    fn needs_group(&self) -> bool {
        true
    }

    fn account_request(&self) -> RequestSpec {
        RequestSpec::get("/info").signed()
    }

    fn parse_account(&self, body: &Value) -> ExchangeResult<AccountInfo> {
        let data = &body["data"];
        let account_group = id_string(&data["accountGroup"]).ok_or_else(|| {
            ExchangeError::UnexpectedResponse(format!("no accountGroup in {body}"))
        })?;
        Ok(AccountInfo {
            account_group: Some(account_group),
            user_uid: id_string(&data["userUID"]),
            raw: data.clone(),
        })
    }

    fn stream_url(&self, account: Option<&AccountInfo>) -> String {
        match account.and_then(|a| a.account_group.as_deref()) {
            Some(group) => format!("{}/{group}/{API_PREFIX}/stream", self.stream_root),
            None => format!("{}/{API_PREFIX}/stream", self.stream_root),
        }
    }
}

#[derive(Debug, Default)]
pub struct AscendexDialect;

fn ticker_entry(entry: &Value) -> Option<(String, Price)> {
    Some((
        entry["symbol"].as_str()?.to_string(),
        Price::from_json(&entry["close"])?,
    ))
}

impl Dialect for AscendexDialect {
    fn products_request(&self) -> RequestSpec {
        RequestSpec::get("/products")
    }

    fn parse_products(&self, body: &Value) -> ExchangeResult<Vec<Product>> {
        let data = body["data"].as_array().ok_or_else(|| {
            ExchangeError::UnexpectedResponse("products reply without `data`".to_string())
        })?;
        Ok(data
            .iter()
            .filter_map(|p| {
                let ticker = p["symbol"].as_str()?;
                let (base, quote) = parse_pair(ticker).ok()?;
                Some(Product {
                    base,
                    quote,
                    ticker: ticker.to_string(),
                })
            })
            .collect())
    }

    fn price_request(&self, ticker: &str) -> RequestSpec {
        RequestSpec::get("/ticker").param("symbol", ticker)
    }

    fn parse_price(&self, body: &Value, ticker: &str) -> ExchangeResult<Price> {
        let data = &body["data"];
        let found = match data {
            Value::Array(entries) => entries
                .iter()
                .filter_map(ticker_entry)
                .find(|(t, _)| t == ticker),
            other => ticker_entry(other),
        };
        found.map(|(_, p)| p).ok_or_else(|| {
            ExchangeError::UnexpectedResponse(format!("no close price for {ticker}"))
        })
    }

    fn tickers_request(&self) -> RequestSpec {
        RequestSpec::get("/ticker")
    }

    fn parse_tickers(&self, body: &Value) -> ExchangeResult<Vec<(String, Price)>> {
        let data = body["data"].as_array().ok_or_else(|| {
            ExchangeError::UnexpectedResponse("ticker reply without `data`".to_string())
        })?;
        Ok(data.iter().filter_map(ticker_entry).collect())
    }

    fn place_order_request(&self, order: &PlaceOrderRequest, timestamp: u64) -> RequestSpec {
        let order_type = match order.kind {
            OrderKind::Limit => "limit",
            OrderKind::Market => "market",
        };
        RequestSpec::post("/cash/order")
            .body(json!({
                "time": timestamp,
                "symbol": order.ticker,
                "orderPrice": order.price.to_string(),
                "orderQty": order.volume.to_string(),
                "orderType": order_type,
                "side": order.side.as_lower(),
                "timeInForce": order.time_in_force.as_str(),
                "postOnly": false,
                "respInst": "ACK",
            }))
            .signed()
            .at(timestamp)
            .with_group()
    }

    fn parse_place_order(&self, body: Value) -> PlaceOrderResponse {
        PlaceOrderResponse {
            code: body["code"]
                .as_i64()
                .unwrap_or(PlaceOrderResponse::UNKNOWN_CODE),
            order_id: id_string(&body["data"]["info"]["orderId"]),
            message: body["message"].as_str().map(str::to_string),
            raw: body,
        }
    }

    fn is_auth_failure(&self, body: &Value) -> bool {
        body["code"]
            .as_i64()
            .is_some_and(|c| AUTH_FAILURE_CODES.contains(&c))
    }

    fn price_channel(&self, ticker: &str) -> String {
        format!("depth:{ticker}")
    }

    fn order_channel(&self) -> Option<String> {
        Some("order:cash".to_string())
    }

    fn ticker_for(&self, base: &str, quote: &str) -> String {
        format!("{}/{}", base.to_uppercase(), quote.to_uppercase())
    }
}

/// Frames keyed by `m`; control requests are `{"op": ..., "ch": ..., "id": ...}`.
#[derive(Debug, Default)]
pub struct AscendexCodec;

impl AscendexCodec {
    fn control(op: &str, channels: &[String], request_id: u64) -> Vec<String> {
        channels
            .iter()
            .enumerate()
            .map(|(i, ch)| json!({"op": op, "ch": ch, "id": format!("{request_id}-{i}")}).to_string())
            .collect()
    }

    fn levels(data: &Value, side: &str) -> Vec<Decimal> {
        data[side]
            .as_array()
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|level| Price::from_json(&level[0]).map(|p| p.inner()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MessageCodec for AscendexCodec {
    fn subscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String> {
        Self::control("sub", channels, request_id)
    }

    fn unsubscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String> {
        Self::control("unsub", channels, request_id)
    }

    fn decode(&self, text: &str) -> WsResult<StreamEvent> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value["m"].as_str().unwrap_or_default().to_string();
        match kind.as_str() {
            "ping" => Ok(StreamEvent::Ping(value)),
            "connected" | "sub" | "unsub" | "auth" | "pong" => Ok(StreamEvent::Ack(value)),
            "depth" | "depth-snapshot" => {
                let ticker = value["symbol"]
                    .as_str()
                    .ok_or_else(|| WsError::Protocol("depth frame without symbol".to_string()))?
                    .to_string();
                let data = &value["data"];
                // Lowest bid and highest ask of the frame
                let bid = Self::levels(data, "bids").into_iter().min().map(Price::new);
                let ask = Self::levels(data, "asks").into_iter().max().map(Price::new);
                Ok(StreamEvent::Depth(DepthEvent { ticker, bid, ask }))
            }
            "order" => {
                let data = &value["data"];
                let order_id = id_string(&data["orderId"])
                    .ok_or_else(|| WsError::Protocol("order frame without orderId".to_string()))?;
                Ok(StreamEvent::OrderUpdate(OrderUpdateEvent {
                    order_id,
                    ticker: data["s"].as_str().map(str::to_string),
                    status: OrderUpdateStatus::parse(data["st"].as_str().unwrap_or_default()),
                }))
            }
            _ => Ok(StreamEvent::Unknown(value)),
        }
    }

    fn pong_frame(&self, _ping: &Value) -> Option<String> {
        Some(json!({"op": "pong"}).to_string())
    }
}

/// Signs the WebSocket upgrade over the `stream` path with a fresh timestamp.
pub struct AscendexHandshake {
    signer: Arc<HmacPathSigner>,
    timestamps: Arc<TimestampSource>,
}

impl AscendexHandshake {
    pub fn new(signer: Arc<HmacPathSigner>, timestamps: Arc<TimestampSource>) -> Self {
        Self { signer, timestamps }
    }
}

impl HandshakeAuth for AscendexHandshake {
    fn headers(&self) -> Vec<(String, String)> {
        self.signer.auth_headers(self.timestamps.next(), "stream")
    }
}
