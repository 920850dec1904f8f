//! REST ticker polling, the alternative to stream prices.

use crate::engine::TriggerEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tripwire_core::Price;
use tripwire_exchange::{ExchangeConnector, ExchangeResult};
use tripwire_telemetry::Metrics;
use tripwire_ws::BoxFuture;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Source of last prices for every listed ticker.
pub trait TickerSource: Send + Sync {
    fn tickers(&self) -> BoxFuture<'_, ExchangeResult<Vec<(String, Price)>>>;
}

impl TickerSource for ExchangeConnector {
    fn tickers(&self) -> BoxFuture<'_, ExchangeResult<Vec<(String, Price)>>> {
        Box::pin(ExchangeConnector::tickers(self))
    }
}

/// One poll: observe every ticker at its last price. Returns orders promoted.
pub async fn poll_once(engine: &Arc<TriggerEngine>, source: &dyn TickerSource) -> ExchangeResult<usize> {
    let tickers = source.tickers().await?;
    let mut promoted = 0;
    for (ticker, last) in tickers {
        Metrics::price_update(engine.exchange(), "poll");
        match engine.observe(&ticker, Some(last), Some(last)) {
            Ok(n) => promoted += n,
            Err(e) => warn!(exchange = %engine.exchange(), %ticker, error = %e, "Observation failed"),
        }
    }
    Ok(promoted)
}

/// Poll every `interval` until `shutdown` fires or the engine stops. Failed
/// polls are logged and retried on the next tick.
pub fn spawn_price_poll(
    engine: Arc<TriggerEngine>,
    source: Arc<dyn TickerSource>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(exchange = %engine.exchange(), interval_ms = interval.as_millis() as u64, "Price poll started");
        // The engine may be stopped before the pipeline token fires.
        while !engine.is_shut_down() {
            match poll_once(&engine, source.as_ref()).await {
                Ok(0) => {}
                Ok(promoted) => debug!(exchange = %engine.exchange(), promoted, "Poll triggered orders"),
                Err(e) => warn!(exchange = %engine.exchange(), error = %e, "Ticker poll failed"),
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!(exchange = %engine.exchange(), "Price poll stopped");
    })
}
