//! Per-bucket FIFO queues.
//!
//! Every bucket owns one worker task draining an unbounded channel, so calls
//! sharing a bucket are sent one at a time and in submission order. Queued
//! calls always run, even when their caller stopped waiting. The worker
//! retries the call at the head of its queue on rate limits and transient
//! failures; nothing behind it moves until it completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use sonoran_core::{Operation, OperationDescriptor, Service, WireRequest};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tower::{Service as _, ServiceExt};
use tracing::{debug, warn};

use crate::dispatcher::Shared;
use crate::error::DispatchError;
use crate::events::ClientEvent;
use crate::rate_limit::{resume_at, retry_delay, RateLimitState};
use crate::transport::{BoxTransport, Exchange};

// ---------------------------------------------------------------------------
// BucketKey
// ---------------------------------------------------------------------------

/// Identity of a FIFO queue: operation path template plus service.
///
/// Operations sharing a path on the same service share a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    path: &'static str,
    service: Service,
}

impl BucketKey {
    #[must_use]
    pub fn new(path: &'static str, service: Service) -> Self {
        Self { path, service }
    }

    /// Bucket used by `descriptor`.
    #[must_use]
    pub fn for_operation(descriptor: &OperationDescriptor) -> Self {
        Self::new(descriptor.path, descriptor.service)
    }

    #[must_use]
    pub fn path(&self) -> &'static str {
        self.path
    }

    #[must_use]
    pub fn service(&self) -> Service {
        self.service
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.service)
    }
}

/// Where a bucket is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// Nothing queued.
    Idle,
    /// Calls queued, waiting behind an earlier call or an active rate limit.
    WaitingForTurn,
    /// An exchange is on the wire.
    InFlight,
}

#[derive(Debug)]
struct Status {
    state: BucketState,
    queued: usize,
}

// ---------------------------------------------------------------------------
// QueuedCall
// ---------------------------------------------------------------------------

/// A resolved call waiting in a bucket.
#[derive(Debug)]
pub(crate) struct QueuedCall {
    pub operation: Operation,
    pub request: WireRequest,
    pub timeout: Duration,
    pub reject_on_rate_limit: bool,
    pub reply: oneshot::Sender<Result<Value, DispatchError>>,
}

// ---------------------------------------------------------------------------
// BucketHandle
// ---------------------------------------------------------------------------

/// Sending half of a bucket; cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct BucketHandle {
    tx: mpsc::UnboundedSender<QueuedCall>,
    status: Arc<Mutex<Status>>,
}

impl BucketHandle {
    /// Creates the bucket and spawns its worker on `runtime`.
    pub(crate) fn spawn(
        key: BucketKey,
        shared: Arc<Shared>,
        transport: BoxTransport,
        runtime: &Handle,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(Status {
            state: BucketState::Idle,
            queued: 0,
        }));
        debug!(bucket = %key, "creating bucket");
        let worker = BucketWorker {
            key,
            shared,
            transport,
            rx,
            status: Arc::clone(&status),
        };
        runtime.spawn(worker.run());
        Self { tx, status }
    }

    /// Appends `call` to the queue. Returns `false` if the worker is gone,
    /// in which case the call is dropped and its caller sees a closed reply.
    pub(crate) fn enqueue(&self, call: QueuedCall) -> bool {
        let mut status = self.status.lock();
        if self.tx.send(call).is_err() {
            return false;
        }
        status.queued += 1;
        if status.state == BucketState::Idle {
            status.state = BucketState::WaitingForTurn;
        }
        true
    }

    pub(crate) fn state(&self) -> BucketState {
        self.status.lock().state
    }

    /// Calls queued or in flight.
    pub(crate) fn depth(&self) -> usize {
        self.status.lock().queued
    }
}

// ---------------------------------------------------------------------------
// BucketWorker
// ---------------------------------------------------------------------------

struct BucketWorker {
    key: BucketKey,
    shared: Arc<Shared>,
    transport: BoxTransport,
    rx: mpsc::UnboundedReceiver<QueuedCall>,
    status: Arc<Mutex<Status>>,
}

impl BucketWorker {
    async fn run(mut self) {
        while let Some(call) = self.rx.recv().await {
            let result = self.execute(&call).await;
            // A dropped receiver means nobody is waiting for the result.
            let _ = call.reply.send(result);

            let mut status = self.status.lock();
            status.queued = status.queued.saturating_sub(1);
            status.state = if status.queued == 0 {
                BucketState::Idle
            } else {
                BucketState::WaitingForTurn
            };
        }
        debug!(bucket = %self.key, "bucket worker stopped");
    }

    fn set_state(&self, state: BucketState) {
        self.status.lock().state = state;
    }

    async fn execute(&mut self, call: &QueuedCall) -> Result<Value, DispatchError> {
        let retry = self.shared.config.retry;
        let mut attempt = 0u32;

        loop {
            if let Some(limit) = self.shared.rate_limits.get(&self.key) {
                if call.reject_on_rate_limit {
                    return Err(limit.rejection());
                }
                debug!(
                    bucket = %self.key,
                    remaining = ?limit.remaining(Instant::now()),
                    "waiting for rate limit to lift"
                );
                self.set_state(BucketState::WaitingForTurn);
                tokio::time::sleep_until(limit.resume_at).await;
                continue;
            }

            self.set_state(BucketState::InFlight);
            self.shared.events.emit(&ClientEvent::Request {
                bucket: self.key.clone(),
                operation: call.operation,
                request: call.request.clone(),
                attempt,
            });

            let exchange = Exchange {
                request: call.request.clone(),
                timeout: call.timeout,
            };
            let started = Instant::now();
            let outcome = match self.transport.ready().await {
                Ok(transport) => transport.call(exchange).await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(response) => {
                    self.shared.events.emit(&ClientEvent::Response {
                        bucket: self.key.clone(),
                        operation: call.operation,
                        status: response.status,
                        elapsed: started.elapsed(),
                    });
                    if let Some(warning) = self.shared.invalid_requests.record(
                        response.status,
                        call.operation,
                        self.key.service(),
                    ) {
                        warn!(
                            count = warning.count,
                            operation = %warning.operation,
                            service = %warning.service,
                            remaining = ?warning.remaining,
                            "too many invalid requests in the current window"
                        );
                        self.shared
                            .events
                            .emit(&ClientEvent::InvalidRequestWarning(warning));
                    }

                    if response.is_rate_limited() {
                        let delay =
                            retry_delay(&response.headers, self.shared.config.default_rate_limit_delay);
                        let limit = self.shared.rate_limits.set(RateLimitState {
                            bucket: self.key.clone(),
                            operation: call.operation,
                            resume_at: resume_at(Instant::now(), delay),
                            retry_after: delay,
                        });
                        warn!(bucket = %self.key, operation = %call.operation, ?delay, "rate limited");
                        self.shared
                            .events
                            .emit(&ClientEvent::RateLimited(limit.clone()));
                        if call.reject_on_rate_limit {
                            return Err(limit.rejection());
                        }
                        continue;
                    }

                    let body = response.json();
                    if response.is_success() {
                        return Ok(body);
                    }
                    return Err(DispatchError::Api {
                        status: Some(response.status),
                        response: body,
                        transport: None,
                    });
                }
                Err(err) if err.is_transient() && attempt < retry.max_retries => {
                    attempt += 1;
                    let backoff = retry.backoff(attempt);
                    warn!(
                        bucket = %self.key,
                        operation = %call.operation,
                        error = %err,
                        attempt,
                        ?backoff,
                        "transient failure, retrying"
                    );
                    self.set_state(BucketState::WaitingForTurn);
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(DispatchError::Api {
                        status: None,
                        response: Value::Null,
                        transport: Some(err),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sonoran_core::find;

    use super::*;

    #[test]
    fn key_display_joins_path_and_service() {
        let key = BucketKey::for_operation(find("GET_ACCOUNT").unwrap());
        assert_eq!(key.to_string(), "general/get_account:cad");
        assert_eq!(key.service(), Service::Cad);
    }

    #[test]
    fn same_path_on_other_service_is_another_bucket() {
        let cad = BucketKey::new("general/lookup", Service::Cad);
        let cms = BucketKey::new("general/lookup", Service::Cms);
        assert_ne!(cad, cms);
    }
}
