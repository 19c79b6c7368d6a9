//! Public client facade.
//!
//! [`ClientBuilder`] merges configuration once and produces a
//! [`SonoranClient`], either synchronously with [`ClientBuilder::build`] or
//! with the subscription-version handshake via [`ClientBuilder::connect`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use sonoran_core::{find, find_for, Credentials, Operation, Service};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tower::Service as TowerService;

use crate::bucket::{BucketKey, BucketState};
use crate::config::{ClientConfig, RetryPolicy, ServiceConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, InitError, TransportError};
use crate::events::{ClientEvent, EventKind, SubscriptionId};
use crate::rate_limit::RateLimitState;
use crate::transport::{
    build_transport_pipeline, BoxTransport, Exchange, ReqwestTransport, TransportResponse,
};

// ---------------------------------------------------------------------------
// PendingCall
// ---------------------------------------------------------------------------

/// Result of a queued call.
///
/// Dropping it only discards the result. The call stays queued and is still
/// sent in its turn.
#[derive(Debug)]
#[must_use = "a pending call does nothing unless awaited"]
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Value, DispatchError>>,
}

impl PendingCall {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Value, DispatchError>>) -> Self {
        Self { rx }
    }
}

impl Future for PendingCall {
    type Output = Result<Value, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(DispatchError::Api {
                    status: None,
                    response: Value::Null,
                    transport: Some(TransportError::Request(
                        "bucket worker dropped the call".to_string(),
                    )),
                })
            })
        })
    }
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Two-phase constructor for [`SonoranClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<BoxTransport>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Sets the full configuration for one service.
    #[must_use]
    pub fn service(mut self, service: Service, config: ServiceConfig) -> Self {
        self.config.services.insert(service, config);
        self
    }

    /// Configures `service` with default settings and the given credentials.
    #[must_use]
    pub fn credentials(self, service: Service, id: &str, key: &str) -> Self {
        self.service(
            service,
            ServiceConfig::with_credentials(service, Credentials::new(id, key)),
        )
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn default_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.config.default_rate_limit_delay = delay;
        self
    }

    #[must_use]
    pub fn invalid_request_warning_interval(mut self, interval: u32) -> Self {
        self.config.invalid_request_warning_interval = interval;
        self
    }

    #[must_use]
    pub fn enforce_min_version(mut self, enforce: bool) -> Self {
        self.config.enforce_min_version = enforce;
        self
    }

    /// Replaces the HTTP transport. The standard layers are added around it.
    #[must_use]
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: TowerService<Exchange, Response = TransportResponse, Error = TransportError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(build_transport_pipeline(transport));
        self
    }

    /// Builds the client on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::NoRuntime`] outside a tokio runtime, and
    /// [`InitError::InvalidBaseUrl`] for a base URL that does not parse.
    pub fn build(self) -> Result<SonoranClient, InitError> {
        let runtime = Handle::try_current().map_err(|_| InitError::NoRuntime)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => build_transport_pipeline(
                ReqwestTransport::new().map_err(InitError::HttpClient)?,
            ),
        };
        let dispatcher = Dispatcher::new(self.config, transport, runtime)?;
        Ok(SonoranClient {
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Builds the client and fetches the subscription version of every
    /// configured CAD and CMS service.
    ///
    /// # Errors
    ///
    /// Everything [`build`](Self::build) returns, plus [`InitError::Setup`]
    /// when a version request fails or its response is not a version.
    pub async fn connect(self) -> Result<SonoranClient, InitError> {
        let client = self.build()?;
        for (service, operation) in [
            (Service::Cad, Operation::GetVersion),
            (Service::Cms, Operation::GetSubVersion),
        ] {
            if !client.dispatcher.is_configured(service) {
                continue;
            }
            let value = client
                .call_operation(operation, &[])
                .await
                .map_err(|source| InitError::Setup {
                    service,
                    message: format!("{operation} failed"),
                    source: Some(source),
                })?;
            let version = parse_version(&value).ok_or_else(|| InitError::Setup {
                service,
                message: format!("unexpected version response {value}"),
                source: None,
            })?;
            tracing::info!(%service, version, "subscription version fetched");
            client.dispatcher.set_version(service, version);
        }
        Ok(client)
    }
}

/// Reads a subscription version from a number or a string with leading digits.
fn parse_version(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SonoranClient
// ---------------------------------------------------------------------------

/// Handle to a running client. Clones share queues, limits and observers.
#[derive(Clone)]
pub struct SonoranClient {
    dispatcher: Arc<Dispatcher>,
}

impl SonoranClient {
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Queues a call by wire type string.
    ///
    /// An unqualified `LOOKUP` targets CAD; use [`submit_on`](Self::submit_on)
    /// for the CMS lookup.
    ///
    /// # Errors
    ///
    /// Fails without touching the network for an unknown type, an
    /// unconfigured service, missing credentials, invalid arguments, or an
    /// active rate limit in reject mode.
    pub fn submit(&self, type_name: &str, args: &[Value]) -> Result<PendingCall, DispatchError> {
        let descriptor = find(type_name).ok_or_else(|| unknown_type(type_name))?;
        self.dispatcher.submit(descriptor, args)
    }

    /// Queues a call to the `type_name` operation of `service`.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_on(
        &self,
        service: Service,
        type_name: &str,
        args: &[Value],
    ) -> Result<PendingCall, DispatchError> {
        let descriptor = find_for(service, type_name).ok_or_else(|| unknown_type(type_name))?;
        self.dispatcher.submit(descriptor, args)
    }

    /// Queues a call to a typed operation.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit), minus the unknown-type case.
    pub fn submit_operation(
        &self,
        operation: Operation,
        args: &[Value],
    ) -> Result<PendingCall, DispatchError> {
        self.dispatcher.submit(operation.descriptor(), args)
    }

    /// Queues a call and waits for its result.
    ///
    /// # Errors
    ///
    /// Everything [`submit`](Self::submit) returns, plus rate-limit
    /// rejections, API failures and exhausted transport retries.
    pub async fn call(&self, type_name: &str, args: &[Value]) -> Result<Value, DispatchError> {
        self.submit(type_name, args)?.await
    }

    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_on(
        &self,
        service: Service,
        type_name: &str,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        self.submit_on(service, type_name, args)?.await
    }

    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_operation(
        &self,
        operation: Operation,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        self.submit_operation(operation, args)?.await
    }

    /// Subscription version fetched by `connect`.
    #[must_use]
    pub fn version(&self, service: Service) -> Option<u32> {
        self.dispatcher.version(service)
    }

    /// Active rate limit on `bucket`.
    #[must_use]
    pub fn rate_limit(&self, bucket: &BucketKey) -> Option<RateLimitState> {
        self.dispatcher.rate_limits().get(bucket)
    }

    /// Every active rate limit.
    #[must_use]
    pub fn rate_limits(&self) -> Vec<RateLimitState> {
        self.dispatcher.rate_limits().snapshot()
    }

    /// Invalid responses counted in the current window.
    #[must_use]
    pub fn invalid_request_count(&self) -> u32 {
        self.dispatcher.invalid_requests().count()
    }

    /// Buckets created so far.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.dispatcher.bucket_count()
    }

    #[must_use]
    pub fn bucket_state(&self, bucket: &BucketKey) -> Option<BucketState> {
        self.dispatcher.bucket_state(bucket)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.dispatcher.config()
    }

    /// Registers an observer for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.dispatcher.events().subscribe(kind, handler)
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.events().unsubscribe(id)
    }

    /// Logs every event through `tracing`.
    pub fn trace_events(&self) -> Vec<SubscriptionId> {
        crate::events::TracingObserver.attach(self.dispatcher.events())
    }
}

impl std::fmt::Debug for SonoranClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonoranClient")
            .field("services", &self.config().services.keys().collect::<Vec<_>>())
            .field("buckets", &self.bucket_count())
            .finish_non_exhaustive()
    }
}

fn unknown_type(type_name: &str) -> DispatchError {
    DispatchError::validation(Some("type"), format!("unknown operation type {type_name:?}"))
}
