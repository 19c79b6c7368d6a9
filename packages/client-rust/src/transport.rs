//! HTTP transport as a tower service stack.
//!
//! - [`ReqwestTransport`]: the network-facing service
//! - [`TimeoutLayer`]: per-exchange timeout enforcement
//! - [`TracingLayer`]: exchange timing and outcome via `tracing` spans
//! - [`build_transport_pipeline`]: composes the layers around any transport

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;
use sonoran_core::{Method, WireRequest};
use tokio::time::Instant;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceBuilder};
use tracing::{info_span, Instrument};

use crate::error::TransportError;

type TransportFuture = Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send>>;

/// Type-erased transport stack used by bucket workers.
pub type BoxTransport = BoxCloneService<Exchange, TransportResponse, TransportError>;

// ---------------------------------------------------------------------------
// Exchange / TransportResponse
// ---------------------------------------------------------------------------

/// One request to send, with the timeout it must finish within.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: WireRequest,
    pub timeout: Duration,
}

/// Raw HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header, ignoring names or values that are not valid HTTP.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Body as JSON; non-JSON bodies become a string and empty ones `null`.
    #[must_use]
    pub fn json(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

// ---------------------------------------------------------------------------
// ReqwestTransport
// ---------------------------------------------------------------------------

/// Sends exchanges with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns the underlying error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sonoran-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<Exchange> for ReqwestTransport {
    type Response = TransportResponse;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, exchange: Exchange) -> Self::Future {
        let Exchange { request, timeout } = exchange;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        Box::pin(async move {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e, timeout))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::from_reqwest(&e, timeout))?;
            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Fails exchanges that outlive their `timeout` with [`TransportError::Timeout`].
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Exchange> for TimeoutService<S>
where
    S: Service<Exchange, Response = TransportResponse, Error = TransportError> + Send,
    S::Future: Send + 'static,
{
    type Response = TransportResponse;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, exchange: Exchange) -> Self::Future {
        let timeout = exchange.timeout;
        let fut = self.inner.call(exchange);
        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(TransportError::Timeout { timeout }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// TracingLayer
// ---------------------------------------------------------------------------

/// Records duration, status and outcome of every exchange in a `tracing` span.
#[derive(Debug, Clone)]
pub struct TracingLayer;

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Exchange> for TracingService<S>
where
    S: Service<Exchange, Response = TransportResponse, Error = TransportError> + Send,
    S::Future: Send + 'static,
{
    type Response = TransportResponse;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, exchange: Exchange) -> Self::Future {
        let span = info_span!(
            "exchange",
            method = %exchange.request.method,
            path = %exchange.request.url.path(),
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let fut = self.inner.call(exchange);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = match &result {
                    Ok(response) if response.is_success() => "ok",
                    Ok(_) => "http_error",
                    Err(_) => "transport_error",
                };

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                match &result {
                    Ok(response) => {
                        span.record("status", response.status);
                        tracing::info!(status = response.status, duration_ms, outcome, "exchange complete");
                    }
                    Err(err) => tracing::info!(error = %err, duration_ms, outcome, "exchange complete"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Wraps `transport` with the standard layers.
///
/// Layer order (outermost to innermost):
/// 1. `TracingLayer`, so timeouts are recorded too
/// 2. `TimeoutLayer`
#[must_use]
pub fn build_transport_pipeline<S>(transport: S) -> BoxTransport
where
    S: Service<Exchange, Response = TransportResponse, Error = TransportError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(TracingLayer)
            .layer(TimeoutLayer)
            .service(transport),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::{service_fn, ServiceExt};
    use url::Url;

    use super::*;

    fn exchange(timeout: Duration) -> Exchange {
        Exchange {
            request: WireRequest {
                method: Method::Post,
                url: Url::parse("https://api.example.test/general/get_servers").unwrap(),
                headers: Vec::new(),
                body: None,
            },
            timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_exchange_times_out() {
        let slow = service_fn(|_: Exchange| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TransportError>(TransportResponse::new(200, "{}"))
        });
        let svc = build_transport_pipeline(slow);
        let err = svc.oneshot(exchange(Duration::from_secs(1))).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Timeout {
                timeout: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test]
    async fn pipeline_passes_response_through() {
        let ok = service_fn(|_: Exchange| async {
            Ok::<_, TransportError>(TransportResponse::new(200, r#"{"ok":true}"#))
        });
        let response = build_transport_pipeline(ok)
            .oneshot(exchange(Duration::from_secs(30)))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.json(), serde_json::json!({"ok": true}));
    }

    #[test]
    fn body_decoding_falls_back_to_text() {
        assert_eq!(TransportResponse::new(200, "").json(), Value::Null);
        assert_eq!(TransportResponse::new(200, "  \n").json(), Value::Null);
        assert_eq!(
            TransportResponse::new(400, "INVALID REQUEST").json(),
            Value::String("INVALID REQUEST".into())
        );
        assert_eq!(TransportResponse::new(200, "3").json(), serde_json::json!(3));
    }

    #[test]
    fn response_headers_and_classification() {
        let response = TransportResponse::new(429, "").with_header("retry-after", "0.5");
        assert!(response.is_rate_limited());
        assert!(!response.is_success());
        assert_eq!(response.headers.get("retry-after").unwrap(), "0.5");
    }
}
