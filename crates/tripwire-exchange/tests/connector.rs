//! Connector behaviour against a scripted transport.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::StreamExt;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tripwire_core::{OrderKind, OrderSide, Price, TimeInForce, Volume};
use tripwire_exchange::ascendex::{AscendexDialect, AscendexResolver};
use tripwire_exchange::binance::{BinanceDialect, BinanceResolver};
use tripwire_exchange::{
    ApiCredentials, ExchangeConnector, ExchangeError, HmacPathSigner, HmacQuerySigner,
    HttpResponse, MockTransport, PlaceOrderRequest, TimestampSource,
};

fn ascendex(transport: Arc<MockTransport>) -> Arc<ExchangeConnector> {
    let creds = ApiCredentials::new("key", BASE64.encode(b"secret"));
    Arc::new(ExchangeConnector::new(
        "ascendex",
        transport,
        Arc::new(HmacPathSigner::new(&creds).unwrap()),
        Arc::new(AscendexResolver::default()),
        Arc::new(AscendexDialect),
        Arc::new(TimestampSource::system()),
    ))
}

fn binance(transport: Arc<MockTransport>) -> Arc<ExchangeConnector> {
    let creds = ApiCredentials::new("key", "secret");
    Arc::new(ExchangeConnector::new(
        "binance",
        transport,
        Arc::new(HmacQuerySigner::new(&creds).unwrap()),
        Arc::new(BinanceResolver::default()),
        Arc::new(BinanceDialect),
        Arc::new(TimestampSource::system()),
    ))
}

fn ascendex_responder(req: &tripwire_exchange::HttpRequest) -> tripwire_exchange::ExchangeResult<HttpResponse> {
    if req.url.ends_with("/api/pro/v1/info") {
        return Ok(HttpResponse::json(
            200,
            &json!({"code": 0, "data": {"accountGroup": 4, "userUID": "U9"}}),
        ));
    }
    if req.url.contains("/4/api/pro/v1/cash/order") {
        return Ok(HttpResponse::json(
            200,
            &json!({"code": 0, "data": {"info": {"orderId": "abc"}}}),
        ));
    }
    Ok(HttpResponse::json(200, &json!({"code": 0, "data": []})))
}

#[tokio::test]
async fn test_group_lookup_is_single_flight() {
    let transport = Arc::new(MockTransport::new(ascendex_responder).with_delay(Duration::from_millis(50)));
    let connector = ascendex(transport.clone());

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let c = connector.clone();
            tokio::spawn(async move { c.resolve_base_url(true).await })
        })
        .collect();

    for call in calls {
        assert_eq!(
            call.await.unwrap().unwrap(),
            "https://ascendex.com/4/api/pro/v1"
        );
    }
    assert_eq!(transport.count_matching("/info"), 1);

    assert_eq!(
        connector.stream_url().await.unwrap(),
        "wss://ascendex.com/4/api/pro/v1/stream"
    );
    assert_eq!(
        connector.account_info().await.unwrap().user_uid.as_deref(),
        Some("U9")
    );
    assert_eq!(transport.count_matching("/info"), 1);
}

#[tokio::test]
async fn test_failed_lookup_is_retried_later() {
    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = attempts.clone();
    let transport = Arc::new(MockTransport::new(move |req| {
        if seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            return Err(ExchangeError::Transport("connection reset".to_string()));
        }
        ascendex_responder(req)
    }));
    let connector = ascendex(transport.clone());

    assert!(matches!(
        connector.resolve_base_url(true).await,
        Err(ExchangeError::Transport(_))
    ));
    assert!(connector.resolve_base_url(true).await.is_ok());
    assert_eq!(transport.count_matching("/info"), 2);
}

#[tokio::test]
async fn test_place_order_goes_to_group_url_with_auth_headers() {
    let transport = Arc::new(MockTransport::new(ascendex_responder));
    let connector = ascendex(transport.clone());

    let response = connector
        .place_order(&PlaceOrderRequest {
            ticker: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            price: Price::new(dec!(100)),
            volume: Volume::new(dec!(1)),
            time_in_force: TimeInForce::GoodTilCancelled,
        })
        .await
        .unwrap();
    assert_eq!(response.order_id.as_deref(), Some("abc"));

    let requests = transport.requests();
    let order = requests.iter().find(|r| r.url.contains("cash/order")).unwrap();
    assert_eq!(order.header("x-auth-key"), Some("key"));
    let ts = order.header("x-auth-timestamp").unwrap();
    assert_eq!(order.body.as_ref().unwrap()["time"].to_string(), ts);
}

#[tokio::test]
async fn test_binance_signed_query_and_business_code_passthrough() {
    let transport = Arc::new(MockTransport::new(|_| {
        Ok(HttpResponse::json(
            400,
            &json!({"code": -2010, "msg": "Account has insufficient balance"}),
        ))
    }));
    let connector = binance(transport.clone());

    let response = connector
        .place_order(&PlaceOrderRequest {
            ticker: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            kind: OrderKind::Limit,
            price: Price::new(dec!(2)),
            volume: Volume::new(dec!(3)),
            time_in_force: TimeInForce::GoodTilCancelled,
        })
        .await
        .unwrap();
    assert_eq!(response.code, -2010);

    let request = &transport.requests()[0];
    assert!(request
        .url
        .starts_with("https://api.binance.com/api/v3/order?symbol=BTCUSDT&side=SELL"));
    assert!(request.url.contains("&timestamp="));
    assert!(request.url.contains("&signature="));
    assert_eq!(request.header("X-MBX-APIKEY"), Some("key"));
}

#[tokio::test]
async fn test_error_classification() {
    let transport = Arc::new(MockTransport::new(|req| {
        if req.url.contains("status401") {
            Ok(HttpResponse { status: 401, body: String::new() })
        } else if req.url.contains("status502") {
            Ok(HttpResponse { status: 502, body: "bad gateway".to_string() })
        } else if req.url.contains("garbage") {
            Ok(HttpResponse::ok("<html>"))
        } else {
            Ok(HttpResponse::json(400, &json!({"code": -1022, "msg": "Signature invalid"})))
        }
    }));
    let connector = binance(transport);

    use tripwire_exchange::RequestSpec;
    assert!(matches!(
        connector.request(RequestSpec::get("/status401")).await,
        Err(ExchangeError::Auth(_))
    ));
    assert!(matches!(
        connector.request(RequestSpec::get("/status502")).await,
        Err(ExchangeError::Transport(_))
    ));
    assert!(matches!(
        connector.request(RequestSpec::get("/garbage")).await,
        Err(ExchangeError::Decode(_))
    ));
    assert!(matches!(
        connector.request(RequestSpec::get("/account").signed()).await,
        Err(ExchangeError::Auth(_))
    ));

    connector.close();
    assert!(matches!(
        connector.request(RequestSpec::get("/ping")).await,
        Err(ExchangeError::Closed)
    ));
}

#[tokio::test]
async fn test_list_products_refetches_each_call() {
    let transport = Arc::new(MockTransport::new(|_| {
        Ok(HttpResponse::json(
            200,
            &json!({"symbols": [
                {"symbol": "BTCUSDT", "baseAsset": "BTC", "quoteAsset": "USDT"},
                {"symbol": "ETHBTC", "baseAsset": "ETH", "quoteAsset": "BTC"}
            ]}),
        ))
    }));
    let connector = binance(transport.clone());

    let first: Vec<_> = connector.list_products().collect().await;
    let second: Vec<_> = connector.list_products().collect().await;

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first[1].as_ref().unwrap().ticker, "ETHBTC");
    assert_eq!(transport.count_matching("/exchangeInfo"), 2);
}
