//! Generic authenticated REST connector.
//!
//! One [`ExchangeConnector`] serves one venue account. Venue behaviour comes
//! from the injected [`Signer`], [`UrlResolver`] and [`Dialect`]; the
//! connector itself only resolves URLs, signs, sends and classifies failures.
//! Business codes inside well-formed replies are passed through untouched.

use crate::clock::TimestampSource;
use crate::dialect::{Auth, Dialect, PlaceOrderRequest, PlaceOrderResponse, RequestSpec};
use crate::error::{ExchangeError, ExchangeResult};
use crate::resolver::{AccountInfo, UrlResolver};
use crate::signer::{encode_query, SignInput, Signer};
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use tripwire_core::{Price, Product};

pub struct ExchangeConnector {
    name: String,
    transport: Arc<dyn HttpTransport>,
    signer: Arc<dyn Signer>,
    resolver: Arc<dyn UrlResolver>,
    dialect: Arc<dyn Dialect>,
    timestamps: Arc<TimestampSource>,
    /// Written at most once, on the first group-scoped call.
    account: OnceCell<AccountInfo>,
    closed: AtomicBool,
}

impl ExchangeConnector {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        signer: Arc<dyn Signer>,
        resolver: Arc<dyn UrlResolver>,
        dialect: Arc<dyn Dialect>,
        timestamps: Arc<TimestampSource>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            signer,
            resolver,
            dialect,
            timestamps,
            account: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn timestamps(&self) -> &Arc<TimestampSource> {
        &self.timestamps
    }

    /// Issue one logical call and parse the reply as JSON.
    pub async fn request(&self, spec: RequestSpec) -> ExchangeResult<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExchangeError::Closed);
        }
        let base = self.resolve_base_url(spec.requires_group).await?;
        self.send(&base, &spec).await
    }

    pub async fn get(&self, spec: RequestSpec) -> ExchangeResult<Value> {
        self.request(RequestSpec {
            method: HttpMethod::Get,
            ..spec
        })
        .await
    }

    pub async fn post(&self, spec: RequestSpec) -> ExchangeResult<Value> {
        self.request(RequestSpec {
            method: HttpMethod::Post,
            ..spec
        })
        .await
    }

    pub async fn put(&self, spec: RequestSpec) -> ExchangeResult<Value> {
        self.request(RequestSpec {
            method: HttpMethod::Put,
            ..spec
        })
        .await
    }

    pub async fn delete(&self, spec: RequestSpec) -> ExchangeResult<Value> {
        self.request(RequestSpec {
            method: HttpMethod::Delete,
            ..spec
        })
        .await
    }

    async fn send(&self, base: &str, spec: &RequestSpec) -> ExchangeResult<Value> {
        let mut query = spec.query.clone();
        let mut headers = Vec::new();

        if spec.auth != Auth::Public {
            headers.extend(self.signer.key_headers());
        }
        if spec.auth == Auth::Signed {
            let timestamp = spec
                .fixed_timestamp
                .unwrap_or_else(|| self.timestamps.next());
            let parts = self.signer.sign(&SignInput {
                path: &spec.path,
                query: &spec.query,
                body: spec.body.as_ref(),
                timestamp,
                include_timestamp: spec.timestamp,
            });
            query.extend(parts.query);
            headers.extend(parts.headers);
        }

        let mut url = format!("{base}{}", spec.path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&encode_query(&query));
        }

        debug!(exchange = %self.name, method = spec.method.as_str(), path = %spec.path, "REST call");
        let response = self
            .transport
            .execute(HttpRequest {
                method: spec.method,
                url,
                headers,
                body: spec.body.clone(),
            })
            .await?;

        if response.status == 401 || response.status == 403 {
            warn!(exchange = %self.name, status = response.status, path = %spec.path, "Request rejected");
            return Err(ExchangeError::Auth(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }
        if response.status >= 500 {
            return Err(ExchangeError::Transport(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            ExchangeError::Decode(format!("HTTP {} {}: {e}", response.status, spec.path))
        })?;
        if self.dialect.is_auth_failure(&body) {
            warn!(exchange = %self.name, path = %spec.path, "Signature or key rejected");
            return Err(ExchangeError::Auth(body.to_string()));
        }
        Ok(body)
    }

    /// Cached account details, looked up once.
    async fn account(&self) -> ExchangeResult<&AccountInfo> {
        self.account
            .get_or_try_init(|| async {
                let base = self.resolver.base_url(None);
                let body = self.send(&base, &self.resolver.account_request()).await?;
                let info = self.resolver.parse_account(&body)?;
                info!(
                    exchange = %self.name,
                    group = ?info.account_group,
                    "Account resolved"
                );
                Ok::<_, ExchangeError>(info)
            })
            .await
    }

    /// REST base URL. Group-scoped bases trigger a single shared lookup.
    pub async fn resolve_base_url(&self, requires_group: bool) -> ExchangeResult<String> {
        if !requires_group || !self.resolver.needs_group() {
            return Ok(self.resolver.base_url(None));
        }
        let account = self.account().await?;
        Ok(self.resolver.base_url(account.account_group.as_deref()))
    }

    pub async fn stream_url(&self) -> ExchangeResult<String> {
        if self.resolver.needs_group() {
            let account = self.account().await?;
            Ok(self.resolver.stream_url(Some(account)))
        } else {
            Ok(self.resolver.stream_url(None))
        }
    }

    /// Account details. Group venues return the cached lookup, others fetch
    /// fresh.
    pub async fn account_info(&self) -> ExchangeResult<AccountInfo> {
        if self.resolver.needs_group() {
            return self.account().await.cloned();
        }
        let body = self.request(self.resolver.account_request()).await?;
        self.resolver.parse_account(&body)
    }

    /// Tradable pairs. Each call re-fetches the catalog.
    pub fn list_products(&self) -> impl Stream<Item = ExchangeResult<Product>> + Send + '_ {
        stream::once(async move {
            let body = self.request(self.dialect.products_request()).await?;
            self.dialect.parse_products(&body)
        })
        .flat_map(|result| {
            let items: Vec<ExchangeResult<Product>> = match result {
                Ok(products) => products.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
    }

    /// Submit one order. Never retries.
    pub async fn place_order(
        &self,
        order: &PlaceOrderRequest,
    ) -> ExchangeResult<PlaceOrderResponse> {
        let timestamp = self.timestamps.next();
        let body = self
            .request(self.dialect.place_order_request(order, timestamp))
            .await?;
        Ok(self.dialect.parse_place_order(body))
    }

    pub async fn last_price(&self, ticker: &str) -> ExchangeResult<Price> {
        let body = self.request(self.dialect.price_request(ticker)).await?;
        self.dialect.parse_price(&body, ticker)
    }

    pub async fn tickers(&self) -> ExchangeResult<Vec<(String, Price)>> {
        let body = self.request(self.dialect.tickers_request()).await?;
        self.dialect.parse_tickers(&body)
    }

    /// Refuse further requests. In-flight calls complete normally.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(exchange = %self.name, "Connector closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
