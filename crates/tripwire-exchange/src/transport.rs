//! HTTP transport seam.
//!
//! The connector builds fully signed requests and hands them to an
//! [`HttpTransport`]. Production uses reqwest; tests inject [`MockTransport`].

use crate::error::{ExchangeError, ExchangeResult};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;
use tripwire_ws::BoxFuture;

/// Default timeout for REST calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A signed request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL with the exact signed query string already appended.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

pub trait HttpTransport: Send + Sync {
    /// Perform the request. Only connection-level failures are errors; any
    /// HTTP status is returned as a response.
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ExchangeResult<HttpResponse>>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ExchangeResult<HttpResponse>> {
        Box::pin(async move {
            trace!(method = request.method.as_str(), url = %request.url, "HTTP request");
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
                HttpMethod::Put => self.client.put(&request.url),
                HttpMethod::Delete => self.client.delete(&request.url),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(format!("HTTP request failed: {e}")))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| ExchangeError::Transport(format!("Failed to read body: {e}")))?;
            Ok(HttpResponse { status, body })
        })
    }
}

type Responder = Box<dyn Fn(&HttpRequest) -> ExchangeResult<HttpResponse> + Send + Sync>;

/// Scripted transport for tests.
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responder: Responder,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Answer every request with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> ExchangeResult<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            delay: None,
        }
    }

    /// Hold each response for `delay` before returning it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of recorded requests whose URL contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(needle))
            .count()
    }
}

impl HttpTransport for MockTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ExchangeResult<HttpResponse>> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.responder)(&request)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockTransport::new(|req| {
            Ok(HttpResponse::ok(format!("{{\"echo\":\"{}\"}}", req.method.as_str())))
        });

        let resp = mock
            .execute(HttpRequest {
                method: HttpMethod::Put,
                url: "https://example.test/a?x=1".to_string(),
                headers: vec![("X-Key".to_string(), "k".to_string())],
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(resp.body, r#"{"echo":"PUT"}"#);
        assert_eq!(mock.count_matching("/a?x=1"), 1);
        assert_eq!(mock.requests()[0].header("x-key"), Some("k"));
    }
}
