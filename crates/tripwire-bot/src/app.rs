//! Application orchestrator.
//!
//! Every configured exchange gets its own pipeline: store, connector, socket
//! pools, trigger engine and order desk. Pipelines start and run
//! independently; the control API serves every desk that came up.

use crate::config::{AppConfig, ExchangeSettings, PriceSource};
use crate::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tripwire_api::{run_server, AppState};
use tripwire_engine::{
    spawn_channel_keeper, spawn_price_poll, spawn_resubscriber, ChannelSink, Notifier, OrderDesk,
    OrderPlacer, OrderUpdateHandler, PriceHandler, TickerSource, TriggerEngine,
};
use tripwire_exchange::binance::{create_listen_key, order_stream_url, spawn_listen_key_keepalive};
use tripwire_exchange::transport::DEFAULT_TIMEOUT;
use tripwire_exchange::{
    build_venue, ApiCredentials, ExchangeConnector, ReqwestTransport, Venue, VenueKind,
};
use tripwire_store::{OrderStore, TableStore};
use tripwire_telemetry::Metrics;
use tripwire_ws::{Placement, PoolConfig, ReconnectPolicy, SocketPool};

/// How long a background task gets to finish after cancellation.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        if config.exchanges.is_empty() {
            return Err(AppError::Config("no exchanges configured".to_string()));
        }
        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the application when cancelled, in addition to ctrl-c.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every pipeline, serve the control API and block until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        let notifier = self.config.sms.notifier()?;

        let mut pipelines = Vec::new();
        for settings in &self.config.exchanges {
            let name = settings.name();
            match Pipeline::start(settings, notifier.clone(), self.shutdown.child_token()).await {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => error!(exchange = %name, error = %e, "Pipeline failed to start"),
            }
        }
        if pipelines.is_empty() {
            return Err(AppError::Config("no exchange pipeline started".to_string()));
        }
        info!(pipelines = pipelines.len(), "Pipelines running");

        let state = AppState::new(
            pipelines.iter().map(|p| p.desk.clone()),
            self.config.server.clone(),
        );
        let mut server = tokio::spawn(run_server(
            state,
            self.config.server.clone(),
            self.shutdown.child_token(),
        ));

        let mut server_done = false;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            _ = self.shutdown.cancelled() => info!("Shutdown requested"),
            result = &mut server => {
                server_done = true;
                match result {
                    Ok(Ok(())) => warn!("Control API exited"),
                    Ok(Err(e)) => error!(error = %e, "Control API failed"),
                    Err(e) => error!(error = %e, "Control API task panicked"),
                }
            }
        }

        self.shutdown.cancel();
        for pipeline in pipelines {
            pipeline.shutdown().await;
        }
        if !server_done {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, server).await {
                Ok(Ok(Err(e))) => error!(error = %e, "Control API failed during shutdown"),
                Ok(_) => {}
                Err(_) => warn!("Control API did not stop in time"),
            }
        }
        info!("Shutdown complete");
        Ok(())
    }
}

/// Everything one exchange runs.
struct Pipeline {
    name: String,
    connector: Arc<ExchangeConnector>,
    store: Arc<TableStore>,
    engine: Arc<TriggerEngine>,
    desk: Arc<OrderDesk>,
    pools: Vec<Arc<SocketPool>>,
    tasks: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

impl Pipeline {
    async fn start(
        settings: &ExchangeSettings,
        notifier: Arc<dyn Notifier>,
        token: CancellationToken,
    ) -> AppResult<Self> {
        let name = settings.name();
        info!(exchange = %name, kind = %settings.kind, "Starting pipeline");

        let credentials = ApiCredentials::from_env(&settings.key_var(), &settings.secret_var())?;
        let transport = Arc::new(ReqwestTransport::new(DEFAULT_TIMEOUT)?);
        let venue = build_venue(&name, settings.kind, &credentials, settings.endpoints(), transport)?;
        let connector = venue.connector.clone();

        let store = Arc::new(match &settings.store_path {
            Some(path) => TableStore::open(path)?,
            None => TableStore::in_memory(),
        });
        let placer: Arc<dyn OrderPlacer> = connector.clone();
        let engine = Arc::new(TriggerEngine::new(
            name.clone(),
            store.clone() as Arc<dyn OrderStore>,
            placer,
            notifier,
            settings.engine.clone(),
        ));
        let orphans = engine.recover()?;
        if orphans > 0 {
            warn!(exchange = %name, orphans, "Processing orders without exchange id need manual review");
        }

        let mut pipeline = Self {
            name: name.clone(),
            connector: connector.clone(),
            store,
            engine: engine.clone(),
            desk: Arc::new(OrderDesk::new(engine.clone(), connector.clone(), None, Vec::new())),
            pools: Vec::new(),
            tasks: Vec::new(),
            token,
        };
        // Anything that fails from here on must still release what was opened.
        if let Err(e) = pipeline.wire(settings, &venue).await {
            pipeline.shutdown().await;
            return Err(e);
        }
        info!(exchange = %name, "Pipeline started");
        Ok(pipeline)
    }

    async fn wire(&mut self, settings: &ExchangeSettings, venue: &Venue) -> AppResult<()> {
        let order_channel = if settings.order_updates {
            self.connector.dialect().order_channel()
        } else {
            None
        };

        match settings.price_source {
            PriceSource::Stream => {
                let url = self.connector.stream_url().await?;
                let pool = self
                    .open_pool(settings, venue, url, true, order_channel.is_some())
                    .await?;
                let sink: Arc<dyn ChannelSink> = pool.clone();
                let desk = Arc::new(
                    OrderDesk::new(
                        self.engine.clone(),
                        self.connector.clone(),
                        Some(sink),
                        settings.allowed_quotes.clone(),
                    )
                    .with_order_channel(order_channel),
                );
                desk.bootstrap().await?;
                self.tasks.push(spawn_resubscriber(desk.clone(), pool, self.token.clone()));
                self.desk = desk;
            }
            PriceSource::Poll => {
                self.desk = Arc::new(OrderDesk::new(
                    self.engine.clone(),
                    self.connector.clone(),
                    None,
                    settings.allowed_quotes.clone(),
                ));
                let source: Arc<dyn TickerSource> = self.connector.clone();
                self.tasks.push(spawn_price_poll(
                    self.engine.clone(),
                    source,
                    settings.poll_interval(),
                    self.token.clone(),
                ));
                if let Some(channel) = order_channel {
                    let url = self.connector.stream_url().await?;
                    let pool = self.open_pool(settings, venue, url, false, true).await?;
                    pool.subscribe(std::slice::from_ref(&channel), Placement::Spread)
                        .await?;
                    self.tasks.push(spawn_channel_keeper(
                        pool,
                        channel,
                        self.name.clone(),
                        self.token.clone(),
                    ));
                }
            }
        }

        if settings.order_updates && venue.kind == VenueKind::Binance {
            let key = create_listen_key(&self.connector).await?;
            let url = order_stream_url(&self.connector.stream_url().await?, &key);
            self.open_pool(settings, venue, url, false, true).await?;
            self.tasks.push(spawn_listen_key_keepalive(
                self.connector.clone(),
                key,
                settings.listen_key_keepalive(),
                self.token.clone(),
            ));
        }
        self.engine.refresh_pending_gauge();
        Ok(())
    }

    /// Open a pool on `url`, register the requested handlers and start a
    /// lenient dispatch loop per connection.
    async fn open_pool(
        &mut self,
        settings: &ExchangeSettings,
        venue: &Venue,
        url: String,
        prices: bool,
        orders: bool,
    ) -> AppResult<Arc<SocketPool>> {
        let pool = Arc::new(SocketPool::new(
            PoolConfig {
                url,
                connections: settings.connections,
                reconnect: settings.ws.clone().into(),
            },
            venue.codec.clone(),
            venue.handshake.clone(),
        ));
        if prices {
            pool.register_handler("prices", Arc::new(PriceHandler::new(self.engine.clone())));
        }
        if orders {
            pool.register_handler("orders", Arc::new(OrderUpdateHandler::new(self.engine.clone())));
        }
        pool.open().await?;
        self.pools.push(pool.clone());
        Metrics::ws_connections(&self.name, self.open_connections());

        for index in 0..pool.size() {
            let pool = pool.clone();
            let exchange = self.name.clone();
            self.tasks.push(tokio::spawn(async move {
                match pool.dispatch_loop(index, ReconnectPolicy::Lenient).await {
                    Ok(()) => debug!(%exchange, index, "Dispatch loop stopped"),
                    Err(e) => error!(%exchange, index, error = %e, "Dispatch loop gave up"),
                }
            }));
        }
        Ok(pool)
    }

    fn open_connections(&self) -> usize {
        self.pools.iter().map(|p| p.open_indices().len()).sum()
    }

    /// Best-effort ordered shutdown; each step logs its own failure.
    async fn shutdown(self) {
        info!(exchange = %self.name, in_flight = self.engine.in_flight(), "Stopping pipeline");
        self.token.cancel();
        self.engine.shutdown().await;

        for pool in &self.pools {
            pool.close().await;
        }
        Metrics::ws_connections(&self.name, 0);

        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(TASK_STOP_TIMEOUT, task).await.is_err() {
                warn!(exchange = %self.name, "Task did not stop in time, aborting");
                abort.abort();
            }
        }

        self.connector.close();
        if let Err(e) = self.store.flush() {
            error!(exchange = %self.name, error = %e, "Store flush failed");
        }
        info!(exchange = %self.name, "Pipeline stopped");
    }
}
