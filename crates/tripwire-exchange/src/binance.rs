//! Binance spot adapter.
//!
//! REST lives under `/api/v3` with query-string HMAC signing. Market data
//! comes from the combined stream endpoint; account order updates come from a
//! separate user-data stream opened with a listen key that must be kept alive
//! with a periodic PUT.

use crate::connector::ExchangeConnector;
use crate::dialect::{id_string, price_field, Dialect, PlaceOrderRequest, PlaceOrderResponse, RequestSpec};
use crate::error::{ExchangeError, ExchangeResult};
use crate::resolver::{AccountInfo, UrlResolver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tripwire_core::{OrderKind, Price, Product};
use tripwire_ws::{
    MessageCodec, OrderUpdateEvent, OrderUpdateStatus, StreamEvent, TickerEvent, WsError,
    WsResult,
};

pub const DEFAULT_REST_URL: &str = "https://api.binance.com";
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

/// Listen keys expire after 60 minutes without a keepalive.
pub const LISTEN_KEY_KEEPALIVE: Duration = Duration::from_secs(30 * 60);

/// API-key format, key/IP/permission, and signature rejections.
const AUTH_FAILURE_CODES: [i64; 3] = [-2014, -2015, -1022];

pub struct BinanceResolver {
    rest_url: String,
    stream_url: String,
}

impl BinanceResolver {
    pub fn new(rest_url: Option<String>, stream_url: Option<String>) -> Self {
        Self {
            rest_url: rest_url
                .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            stream_url: stream_url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
        }
    }
}

impl Default for BinanceResolver {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl UrlResolver for BinanceResolver {
    fn base_url(&self, _group: Option<&str>) -> String {
        format!("{}/api/v3", self.rest_url)
    }

    fn needs_group(&self) -> bool {
        false
    }

    fn account_request(&self) -> RequestSpec {
        RequestSpec::get("/account").signed()
    }

    fn parse_account(&self, body: &Value) -> ExchangeResult<AccountInfo> {
        if !body.is_object() {
            return Err(ExchangeError::UnexpectedResponse(
                "account reply is not an object".to_string(),
            ));
        }
        Ok(AccountInfo {
            account_group: None,
            user_uid: id_string(&body["uid"]),
            raw: body.clone(),
        })
    }

    fn stream_url(&self, _account: Option<&AccountInfo>) -> String {
        self.stream_url.clone()
    }
}

#[derive(Debug, Default)]
pub struct BinanceDialect;

impl Dialect for BinanceDialect {
    fn products_request(&self) -> RequestSpec {
        RequestSpec::get("/exchangeInfo")
    }

    fn parse_products(&self, body: &Value) -> ExchangeResult<Vec<Product>> {
        let symbols = body["symbols"].as_array().ok_or_else(|| {
            ExchangeError::UnexpectedResponse("exchangeInfo without `symbols`".to_string())
        })?;
        Ok(symbols
            .iter()
            .filter_map(|s| {
                Some(Product {
                    base: s["baseAsset"].as_str()?.to_uppercase(),
                    quote: s["quoteAsset"].as_str()?.to_uppercase(),
                    ticker: s["symbol"].as_str()?.to_string(),
                })
            })
            .collect())
    }

    fn price_request(&self, ticker: &str) -> RequestSpec {
        RequestSpec::get("/ticker/price").param("symbol", ticker)
    }

    fn parse_price(&self, body: &Value, _ticker: &str) -> ExchangeResult<Price> {
        price_field(body, "price")
    }

    fn tickers_request(&self) -> RequestSpec {
        RequestSpec::get("/ticker/price")
    }

    fn parse_tickers(&self, body: &Value) -> ExchangeResult<Vec<(String, Price)>> {
        let entries = body.as_array().ok_or_else(|| {
            ExchangeError::UnexpectedResponse("ticker list is not an array".to_string())
        })?;
        Ok(entries
            .iter()
            .filter_map(|e| Some((e["symbol"].as_str()?.to_string(), Price::from_json(&e["price"])?)))
            .collect())
    }

    fn place_order_request(&self, order: &PlaceOrderRequest, timestamp: u64) -> RequestSpec {
        let mut spec = RequestSpec::post("/order")
            .param("symbol", &order.ticker)
            .param("side", order.side.as_upper())
            .param("quantity", order.volume);
        match order.kind {
            OrderKind::Limit => {
                spec = spec
                    .param("type", "LIMIT")
                    .param("timeInForce", order.time_in_force.as_str())
                    .param("price", order.price);
            }
            OrderKind::Market => {
                spec = spec.param("type", "MARKET");
            }
        }
        spec.signed().at(timestamp)
    }

    fn parse_place_order(&self, body: Value) -> PlaceOrderResponse {
        if let Some(order_id) = id_string(&body["orderId"]) {
            return PlaceOrderResponse {
                code: 0,
                order_id: Some(order_id),
                message: None,
                raw: body,
            };
        }
        PlaceOrderResponse {
            code: body["code"]
                .as_i64()
                .unwrap_or(PlaceOrderResponse::UNKNOWN_CODE),
            order_id: None,
            message: body["msg"].as_str().map(str::to_string),
            raw: body,
        }
    }

    fn is_auth_failure(&self, body: &Value) -> bool {
        body["code"]
            .as_i64()
            .is_some_and(|c| AUTH_FAILURE_CODES.contains(&c))
    }

    fn price_channel(&self, ticker: &str) -> String {
        format!("{}@ticker", ticker.to_lowercase())
    }

    fn order_channel(&self) -> Option<String> {
        None
    }

    fn ticker_for(&self, base: &str, quote: &str) -> String {
        format!("{}{}", base.to_uppercase(), quote.to_uppercase())
    }
}

/// Combined-stream frames: `{"stream": "...", "data": {...}}`.
#[derive(Debug, Default)]
pub struct BinanceCodec;

impl BinanceCodec {
    fn control(method: &str, channels: &[String], request_id: u64) -> Vec<String> {
        if channels.is_empty() {
            return Vec::new();
        }
        vec![json!({"method": method, "params": channels, "id": request_id}).to_string()]
    }
}

impl MessageCodec for BinanceCodec {
    fn subscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String> {
        Self::control("SUBSCRIBE", channels, request_id)
    }

    fn unsubscribe_frames(&self, channels: &[String], request_id: u64) -> Vec<String> {
        Self::control("UNSUBSCRIBE", channels, request_id)
    }

    fn decode(&self, text: &str) -> WsResult<StreamEvent> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("result").is_some() && value.get("id").is_some() {
            return Ok(StreamEvent::Ack(value));
        }

        // User-data frames arrive raw on /ws and wrapped on /stream
        let data = value.get("data").unwrap_or(&value);
        if data["e"] == "executionReport" {
            let order_id = id_string(&data["i"]).ok_or_else(|| {
                WsError::Protocol("executionReport without order id".to_string())
            })?;
            return Ok(StreamEvent::OrderUpdate(OrderUpdateEvent {
                order_id,
                ticker: data["s"].as_str().map(str::to_string),
                status: OrderUpdateStatus::parse(data["X"].as_str().unwrap_or_default()),
            }));
        }

        let stream = value["stream"].as_str().unwrap_or_default();
        if let Some(ticker) = stream.strip_suffix("@ticker") {
            if let Some(last) = Price::from_json(&data["c"]) {
                return Ok(StreamEvent::Ticker(TickerEvent {
                    ticker: ticker.to_uppercase(),
                    last,
                }));
            }
        }
        Ok(StreamEvent::Unknown(value))
    }

    fn pong_frame(&self, _ping: &Value) -> Option<String> {
        None
    }
}

/// Open a user-data stream and return its listen key.
pub async fn create_listen_key(connector: &ExchangeConnector) -> ExchangeResult<String> {
    let body = connector
        .post(RequestSpec::post("/userDataStream").api_key())
        .await?;
    body["listenKey"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ExchangeError::UnexpectedResponse(format!("no listenKey in {body}")))
}

pub async fn keepalive_listen_key(connector: &ExchangeConnector, key: &str) -> ExchangeResult<()> {
    connector
        .put(
            RequestSpec::put("/userDataStream")
                .param("listenKey", key)
                .api_key(),
        )
        .await?;
    Ok(())
}

/// Combined-stream URL carrying the user-data stream for `key`.
pub fn order_stream_url(stream_url: &str, key: &str) -> String {
    format!("{stream_url}?streams={key}")
}

/// Refresh `key` every `interval` until `shutdown` fires.
pub fn spawn_listen_key_keepalive(
    connector: Arc<ExchangeConnector>,
    key: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(exchange = %connector.name(), "Listen key keepalive started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    match keepalive_listen_key(&connector, &key).await {
                        Ok(()) => debug!(exchange = %connector.name(), "Listen key refreshed"),
                        Err(e) => warn!(exchange = %connector.name(), error = %e, "Listen key keepalive failed"),
                    }
                }
            }
        }
        debug!(exchange = %connector.name(), "Listen key keepalive stopped");
    })
}
