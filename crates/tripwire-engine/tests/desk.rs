//! Order desk operations against an in-memory store and a scripted venue.

use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tripwire_core::{OrderSide, Price, Volume};
use tripwire_engine::{
    poll_once, spawn_price_poll, ChannelSink, CreateOrder, EngineConfig, EngineError,
    LogNotifier, MockPlacer, OrderDesk, TickerSource, TriggerEngine,
};
use tripwire_exchange::binance::{BinanceDialect, BinanceResolver};
use tripwire_exchange::{
    ApiCredentials, ExchangeConnector, ExchangeResult, HmacQuerySigner, HttpRequest, HttpResponse,
    MockTransport, TimestampSource,
};
use tripwire_store::{OrderStore, StoreError, TableStore};
use tripwire_ws::{BoxFuture, WsResult};

#[derive(Default)]
struct RecordingSink {
    log: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl ChannelSink for RecordingSink {
    fn subscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(async move {
            self.log.lock().extend(channels.iter().map(|c| format!("+{c}")));
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, channels: &'a [String]) -> BoxFuture<'a, WsResult<()>> {
        Box::pin(async move {
            self.log.lock().extend(channels.iter().map(|c| format!("-{c}")));
            Ok(())
        })
    }
}

fn venue(req: &HttpRequest) -> ExchangeResult<HttpResponse> {
    if req.url.contains("/exchangeInfo") {
        return Ok(HttpResponse::json(
            200,
            &json!({"symbols": [
                {"symbol": "BTCUSDT", "baseAsset": "BTC", "quoteAsset": "USDT"},
                {"symbol": "ETHUSDT", "baseAsset": "ETH", "quoteAsset": "USDT"},
                {"symbol": "ETHBTC", "baseAsset": "ETH", "quoteAsset": "BTC"}
            ]}),
        ));
    }
    if req.url.contains("/ticker/price?symbol=BTCUSDT") {
        return Ok(HttpResponse::json(200, &json!({"symbol": "BTCUSDT", "price": "101.5"})));
    }
    Ok(HttpResponse::json(200, &json!({})))
}

struct Fixture {
    store: Arc<TableStore>,
    placer: Arc<MockPlacer>,
    sink: Arc<RecordingSink>,
    desk: OrderDesk,
}

async fn fixture() -> Fixture {
    let store = Arc::new(TableStore::in_memory());
    let placer = Arc::new(MockPlacer::replying(0));
    let engine = Arc::new(TriggerEngine::new(
        "binance",
        store.clone(),
        placer.clone(),
        Arc::new(LogNotifier),
        EngineConfig::default(),
    ));
    let connector = Arc::new(ExchangeConnector::new(
        "binance",
        Arc::new(MockTransport::new(venue)),
        Arc::new(HmacQuerySigner::new(&ApiCredentials::new("key", "secret")).unwrap()),
        Arc::new(BinanceResolver::default()),
        Arc::new(BinanceDialect),
        Arc::new(TimestampSource::system()),
    ));
    let sink = Arc::new(RecordingSink::default());
    let desk = OrderDesk::new(
        engine,
        connector,
        Some(sink.clone()),
        vec!["usdt".to_string()],
    );
    desk.sync_symbols().await.unwrap();
    Fixture {
        store,
        placer,
        sink,
        desk,
    }
}

fn order(symbol: &str, side: OrderSide, trigger: rust_decimal::Decimal) -> CreateOrder {
    CreateOrder {
        symbol: symbol.to_string(),
        trigger_price: Price::new(trigger),
        price: Price::new(trigger),
        order_type: side,
        volume: Volume::new(dec!(1)),
    }
}

#[tokio::test]
async fn test_sync_symbols_is_idempotent() {
    let f = fixture().await;
    let again = f.desk.sync_symbols().await.unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(f.store.list_symbols().unwrap().len(), 3);
}

#[tokio::test]
async fn test_channel_refcounting() {
    let f = fixture().await;

    let a = f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    let b = f.desk.create_order(order("btc/usdt", OrderSide::Sell, dec!(120))).await.unwrap();
    assert_eq!(a.symbol, "BTC/USDT");
    assert_eq!(f.sink.log(), vec!["+btcusdt@ticker"]);

    f.desk.delete_order(a.order.id).await.unwrap();
    assert_eq!(f.sink.log(), vec!["+btcusdt@ticker"]);

    f.desk.delete_order(b.order.id).await.unwrap();
    assert_eq!(f.sink.log(), vec!["+btcusdt@ticker", "-btcusdt@ticker"]);
}

#[tokio::test]
async fn test_delete_after_promotion_unsubscribes() {
    let f = fixture().await;
    let engine = f.desk.engine().clone();

    f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    assert_eq!(engine.observe("BTCUSDT", Some(Price::new(dec!(99))), None).unwrap(), 1);
    engine.drain().await;

    // the channel is still carried, so the new order reuses it
    let sell = f.desk.create_order(order("BTC/USDT", OrderSide::Sell, dec!(500))).await.unwrap();
    assert_eq!(f.sink.log(), vec!["+btcusdt@ticker"]);

    f.desk.delete_order(sell.order.id).await.unwrap();
    assert!(f.desk.list_orders().unwrap().is_empty());
    assert_eq!(f.sink.log(), vec!["+btcusdt@ticker", "-btcusdt@ticker"]);
}

#[tokio::test]
async fn test_delete_all_unsubscribes_everything() {
    let f = fixture().await;
    f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    f.desk.create_order(order("ETH/USDT", OrderSide::Buy, dec!(10))).await.unwrap();

    assert_eq!(f.desk.delete_all_orders().await.unwrap(), 2);
    let log = f.sink.log();
    assert!(log.contains(&"-btcusdt@ticker".to_string()));
    assert!(log.contains(&"-ethusdt@ticker".to_string()));
    assert!(f.desk.list_orders().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_order_validation() {
    let f = fixture().await;

    assert!(matches!(
        f.desk.create_order(order("ETH/BTC", OrderSide::Buy, dec!(1))).await,
        Err(EngineError::QuoteNotAllowed { .. })
    ));
    assert!(matches!(
        f.desk.create_order(order("DOGE/USDT", OrderSide::Buy, dec!(1))).await,
        Err(EngineError::UnknownSymbol(_))
    ));
    assert!(matches!(
        f.desk.create_order(order("BTCUSDT", OrderSide::Buy, dec!(1))).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(0))).await,
        Err(EngineError::Validation(_))
    ));
    assert!(f.sink.log().is_empty());
}

#[tokio::test]
async fn test_new_order_resets_sweep_limits() {
    let f = fixture().await;
    let engine = f.desk.engine().clone();

    // establishes a floor of 100 for BTCUSDT
    assert_eq!(engine.observe("BTCUSDT", Some(Price::new(dec!(100))), None).unwrap(), 0);

    f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(150))).await.unwrap();
    assert_eq!(engine.observe("BTCUSDT", Some(Price::new(dec!(120))), None).unwrap(), 1);
    engine.drain().await;

    assert_eq!(f.placer.call_count(), 1);
    let views = f.desk.list_processing_orders().unwrap();
    assert_eq!(views[0].symbol, "BTC/USDT");
    assert_eq!(views[0].order.order_id.as_deref(), Some("X1"));
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let f = fixture().await;
    f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    f.desk.create_order(order("ETH/USDT", OrderSide::Sell, dec!(3000))).await.unwrap();
    let document = f.desk.export_orders().unwrap();

    let g = fixture().await;
    let imported = g.desk.import_orders(&document).await.unwrap();
    assert_eq!(imported.len(), 2);

    let mut original: Vec<_> = document
        .orders
        .iter()
        .map(|o| (o.symbol.clone(), o.trigger_price, o.price, o.order_type, o.volume))
        .collect();
    let mut restored: Vec<_> = g
        .desk
        .export_orders()
        .unwrap()
        .orders
        .into_iter()
        .map(|o| (o.symbol, o.trigger_price, o.price, o.order_type, o.volume))
        .collect();
    original.sort_by(|a, b| a.0.cmp(&b.0));
    restored.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(original, restored);
    assert_eq!(g.sink.log().len(), 2);
}

#[tokio::test]
async fn test_desired_channels_follow_store() {
    let f = fixture().await;
    let desk = f.desk.with_order_channel(Some("order:cash".to_string()));
    let a = desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    desk.create_order(order("ETH/USDT", OrderSide::Buy, dec!(10))).await.unwrap();

    // promotion removes the order without the desk hearing about it
    f.store.promote(a.order.id).unwrap();

    let desired = desk.desired_channels().unwrap();
    assert!(desired.contains("ethusdt@ticker"));
    assert!(desired.contains("order:cash"));
    assert!(!desired.contains("btcusdt@ticker"));
    assert_eq!(desired.len(), 2);
}

#[tokio::test]
async fn test_rate_accepts_pair_or_ticker() {
    let f = fixture().await;
    assert_eq!(f.desk.rate("BTC/USDT").await.unwrap(), Price::new(dec!(101.5)));
    assert_eq!(f.desk.rate("btcusdt").await.unwrap(), Price::new(dec!(101.5)));
}

#[tokio::test]
async fn test_symbol_delete_refused_while_referenced() {
    let f = fixture().await;
    let view = f.desk.create_order(order("BTC/USDT", OrderSide::Buy, dec!(100))).await.unwrap();
    assert!(matches!(
        f.desk.delete_symbol(view.order.symbol_id),
        Err(EngineError::Store(StoreError::SymbolInUse(_)))
    ));
}

struct FixedTickers(Vec<(String, Price)>);

impl TickerSource for FixedTickers {
    fn tickers(&self) -> BoxFuture<'_, ExchangeResult<Vec<(String, Price)>>> {
        let tickers = self.0.clone();
        Box::pin(async move { Ok(tickers) })
    }
}

#[tokio::test]
async fn test_poll_observes_every_ticker() {
    let f = fixture().await;
    f.desk.create_order(order("BTC/USDT", OrderSide::Sell, dec!(100))).await.unwrap();
    f.desk.create_order(order("ETH/USDT", OrderSide::Buy, dec!(10))).await.unwrap();

    let source = FixedTickers(vec![
        ("BTCUSDT".to_string(), Price::new(dec!(105))),
        ("ETHUSDT".to_string(), Price::new(dec!(11))),
        ("XRPUSDT".to_string(), Price::new(dec!(1))),
    ]);
    let engine = f.desk.engine().clone();
    assert_eq!(poll_once(&engine, &source).await.unwrap(), 1);
    engine.drain().await;

    let remaining = f.desk.list_orders().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].symbol, "ETH/USDT");
}

#[tokio::test]
async fn test_price_poll_stops_with_engine() {
    let f = fixture().await;
    let engine = f.desk.engine().clone();
    engine.shutdown().await;

    let handle = spawn_price_poll(
        engine,
        Arc::new(FixedTickers(Vec::new())),
        Duration::from_secs(60),
        CancellationToken::new(),
    );
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poll should stop once the engine is down")
        .unwrap();
}
