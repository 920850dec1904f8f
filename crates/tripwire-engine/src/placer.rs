//! Order submission seam.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tripwire_exchange::{ExchangeConnector, ExchangeResult, PlaceOrderRequest, PlaceOrderResponse};
use tripwire_ws::BoxFuture;

/// Something that can submit one order to a venue.
pub trait OrderPlacer: Send + Sync {
    fn place<'a>(
        &'a self,
        request: &'a PlaceOrderRequest,
    ) -> BoxFuture<'a, ExchangeResult<PlaceOrderResponse>>;
}

impl OrderPlacer for ExchangeConnector {
    fn place<'a>(
        &'a self,
        request: &'a PlaceOrderRequest,
    ) -> BoxFuture<'a, ExchangeResult<PlaceOrderResponse>> {
        Box::pin(self.place_order(request))
    }
}

/// Scripted placer for tests.
///
/// Replies are consumed in order; once the script runs out the fallback
/// reply is repeated.
pub struct MockPlacer {
    script: Mutex<VecDeque<ExchangeResult<PlaceOrderResponse>>>,
    fallback: Box<dyn Fn() -> ExchangeResult<PlaceOrderResponse> + Send + Sync>,
    calls: Mutex<Vec<PlaceOrderRequest>>,
}

impl MockPlacer {
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn() -> ExchangeResult<PlaceOrderResponse> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `code`.
    pub fn replying(code: i64) -> Self {
        Self::new(move || Ok(Self::reply(code)))
    }

    /// Bare reply. Accepted replies without an id get `X{call number}` when placed.
    pub fn reply(code: i64) -> PlaceOrderResponse {
        PlaceOrderResponse {
            code,
            order_id: None,
            message: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn then(self, result: ExchangeResult<PlaceOrderResponse>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<PlaceOrderRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl OrderPlacer for MockPlacer {
    fn place<'a>(
        &'a self,
        request: &'a PlaceOrderRequest,
    ) -> BoxFuture<'a, ExchangeResult<PlaceOrderResponse>> {
        Box::pin(async move {
            let number = {
                let mut calls = self.calls.lock();
                calls.push(request.clone());
                calls.len()
            };
            let scripted = self.script.lock().pop_front();
            let mut result = scripted.unwrap_or_else(|| (self.fallback)());
            if let Ok(response) = &mut result {
                if response.code == 0 && response.order_id.is_none() {
                    response.order_id = Some(format!("X{number}"));
                }
            }
            result
        })
    }
}
