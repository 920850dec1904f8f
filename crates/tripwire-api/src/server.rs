//! HTTP server implementation using axum.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use tripwire_core::{ExportDocument, NewButton, SymbolId, SymbolUpdate};
use tripwire_engine::{CreateOrder, OrderDesk};
use tripwire_telemetry::Metrics;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    desks: Arc<BTreeMap<String, Arc<OrderDesk>>>,
    config: ApiConfig,
}

impl AppState {
    pub fn new(desks: impl IntoIterator<Item = Arc<OrderDesk>>, config: ApiConfig) -> Self {
        let desks = desks
            .into_iter()
            .map(|desk| (desk.exchange().to_string(), desk))
            .collect();
        Self {
            desks: Arc::new(desks),
            config,
        }
    }

    fn desk(&self, exchange: &str) -> ApiResult<&Arc<OrderDesk>> {
        self.desks
            .get(exchange)
            .ok_or_else(|| ApiError::NotFound(format!("unknown exchange: {exchange}")))
    }
}

/// `{ "data": ... }` envelope used by every successful reply.
#[derive(Debug, Serialize)]
struct Data<T> {
    data: T,
}

fn data<T: Serialize>(value: T) -> Json<Data<T>> {
    Json(Data { data: value })
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/{exchange}/list/{objects}", get(list_handler))
        .route("/api/{exchange}/rate", get(rate_handler))
        .route("/api/{exchange}/user/info", get(user_info))
        .route("/api/{exchange}/order", post(create_order))
        .route("/api/{exchange}/order/{id}", delete(delete_order))
        .route("/api/{exchange}/orders", delete(delete_all_orders))
        .route("/api/{exchange}/button", post(add_button))
        .route("/api/{exchange}/button/{id}", delete(delete_button))
        .route("/api/{exchange}/update/symbols", post(sync_symbols))
        .route("/api/{exchange}/update/symbol/{id}", post(update_symbol))
        .route("/api/{exchange}/symbol/{id}", delete(delete_symbol))
        .route("/api/{exchange}/export", get(export_orders))
        .route("/api/{exchange}/import", post(import_orders))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(api)
        .layer(cors)
        .with_state(state)
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.config.auth_enabled() && !check_basic_auth(request.headers(), &state.config) {
        return unauthorized_response();
    }
    next.run(request).await
}

/// Check basic authentication.
fn check_basic_auth(headers: &HeaderMap, config: &ApiConfig) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Basic "))
    else {
        return false;
    };
    let Some(decoded) = BASE64
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };
    decoded == format!("{}:{}", config.username, config.password)
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"tripwire\"")],
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let exchanges: Vec<&String> = state.desks.keys().collect();
    Json(json!({ "status": "ok", "exchanges": exchanges }))
}

async fn metrics() -> ApiResult<Response> {
    let body = Metrics::render().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn list_handler(
    State(state): State<AppState>,
    Path((exchange, objects)): Path<(String, String)>,
) -> ApiResult<Response> {
    let desk = state.desk(&exchange)?;
    let response = match objects.as_str() {
        "orders" => data(desk.list_orders()?).into_response(),
        "processing" => data(desk.list_processing_orders()?).into_response(),
        "symbols" => data(desk.list_symbols()?).into_response(),
        "buttons" => data(desk.list_buttons()?).into_response(),
        other => return Err(ApiError::NotFound(format!("unknown object: {other}"))),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct RateQuery {
    ticker: Option<String>,
}

async fn rate_handler(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Query(query): Query<RateQuery>,
) -> ApiResult<Response> {
    let desk = state.desk(&exchange)?;
    let ticker = query
        .ticker
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing ticker".to_string()))?;
    let price = desk.rate(&ticker).await?;
    Ok(data(json!({ "ticker": ticker, "price": price })).into_response())
}

async fn user_info(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> ApiResult<Response> {
    let info = state.desk(&exchange)?.user_info().await?;
    Ok(data(json!({
        "account_group": info.account_group,
        "user_uid": info.user_uid,
        "raw": info.raw,
    }))
    .into_response())
}

async fn create_order(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(request): Json<CreateOrder>,
) -> ApiResult<Response> {
    let view = state.desk(&exchange)?.create_order(request).await?;
    Ok((StatusCode::CREATED, data(view)).into_response())
}

async fn delete_order(
    State(state): State<AppState>,
    Path((exchange, id)): Path<(String, u64)>,
) -> ApiResult<Response> {
    let order = state.desk(&exchange)?.delete_order(id).await?;
    Ok(data(order).into_response())
}

async fn delete_all_orders(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> ApiResult<Response> {
    let removed = state.desk(&exchange)?.delete_all_orders().await?;
    Ok(data(json!({ "removed": removed })).into_response())
}

async fn add_button(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(button): Json<NewButton>,
) -> ApiResult<Response> {
    let button = state.desk(&exchange)?.add_button(button)?;
    Ok((StatusCode::CREATED, data(button)).into_response())
}

async fn delete_button(
    State(state): State<AppState>,
    Path((exchange, id)): Path<(String, u64)>,
) -> ApiResult<Response> {
    state.desk(&exchange)?.delete_button(id)?;
    Ok(data(json!({})).into_response())
}

async fn sync_symbols(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> ApiResult<Response> {
    let symbols = state.desk(&exchange)?.sync_symbols().await?;
    info!(%exchange, symbols = symbols.len(), "Symbols refreshed via API");
    Ok(data(symbols).into_response())
}

async fn update_symbol(
    State(state): State<AppState>,
    Path((exchange, id)): Path<(String, SymbolId)>,
    Json(update): Json<SymbolUpdate>,
) -> ApiResult<Response> {
    let symbol = state.desk(&exchange)?.update_symbol(id, &update)?;
    Ok(data(symbol).into_response())
}

async fn delete_symbol(
    State(state): State<AppState>,
    Path((exchange, id)): Path<(String, SymbolId)>,
) -> ApiResult<Response> {
    let symbol = state.desk(&exchange)?.delete_symbol(id)?;
    Ok(data(symbol).into_response())
}

async fn export_orders(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> ApiResult<Json<ExportDocument>> {
    Ok(Json(state.desk(&exchange)?.export_orders()?))
}

async fn import_orders(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(document): Json<ExportDocument>,
) -> ApiResult<Response> {
    let orders = state.desk(&exchange)?.import_orders(&document).await?;
    debug!(%exchange, imported = orders.len(), "Import via API");
    Ok(data(json!({ "imported": orders.len() })).into_response())
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_server(
    state: AppState,
    config: ApiConfig,
    shutdown: CancellationToken,
) -> ApiResult<()> {
    let app = create_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    info!(%addr, auth = config.auth_enabled(), "Starting control API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Control API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> ApiConfig {
        ApiConfig {
            username: "desk".to_string(),
            password: "s3cret".to_string(),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_basic_auth() {
        let mut headers = HeaderMap::new();
        assert!(!check_basic_auth(&headers, &config()));

        let good = format!("Basic {}", BASE64.encode("desk:s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&good).unwrap());
        assert!(check_basic_auth(&headers, &config()));

        let bad = format!("Basic {}", BASE64.encode("desk:nope"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&bad).unwrap());
        assert!(!check_basic_auth(&headers, &config()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(!check_basic_auth(&headers, &config()));
    }
}
