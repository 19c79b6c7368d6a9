//! Client event bus.
//!
//! Observers register a handler for one [`EventKind`] and receive every
//! matching [`ClientEvent`] synchronously on the emitting task. Handlers should
//! return quickly; anything slow belongs on a channel the handler feeds.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sonoran_core::{Operation, WireRequest};

use crate::bucket::BucketKey;
use crate::rate_limit::{InvalidRequestWarning, RateLimitState};

/// Discriminant used to subscribe to a family of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Request,
    Response,
    RateLimited,
    InvalidRequestWarning,
}

/// Something observable that happened inside the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// An exchange is about to be sent.
    Request {
        bucket: BucketKey,
        operation: Operation,
        /// The resolved wire request being sent.
        request: WireRequest,
        /// 0 for the first send, then one per transient retry.
        attempt: u32,
    },
    /// An exchange produced an HTTP response.
    Response {
        bucket: BucketKey,
        operation: Operation,
        status: u16,
        elapsed: Duration,
    },
    /// A bucket became rate limited.
    RateLimited(RateLimitState),
    /// Invalid responses crossed another warning interval.
    InvalidRequestWarning(InvalidRequestWarning),
}

impl ClientEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Request { .. } => EventKind::Request,
            ClientEvent::Response { .. } => EventKind::Response,
            ClientEvent::RateLimited(_) => EventKind::RateLimited,
            ClientEvent::InvalidRequestWarning(_) => EventKind::InvalidRequestWarning,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Registry of event handlers owned by one client.
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a handler. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Delivers `event` to every handler subscribed to its kind.
    ///
    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe without deadlocking. A panicking handler is logged and
    /// skipped; the remaining handlers and the emitter carry on.
    pub fn emit(&self, event: &ClientEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(?kind, "event handler panicked");
            }
        }
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TracingObserver
// ---------------------------------------------------------------------------

/// Forwards client events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Subscribes to every event kind on `bus`.
    pub fn attach(self, bus: &EventBus) -> Vec<SubscriptionId> {
        [
            EventKind::Request,
            EventKind::Response,
            EventKind::RateLimited,
            EventKind::InvalidRequestWarning,
        ]
        .into_iter()
        .map(|kind| bus.subscribe(kind, move |event| self.log(event)))
        .collect()
    }

    #[allow(clippy::unused_self)]
    fn log(self, event: &ClientEvent) {
        match event {
            ClientEvent::Request {
                bucket,
                operation,
                request,
                attempt,
            } => tracing::debug!(
                %bucket,
                %operation,
                method = %request.method,
                path = %request.url.path(),
                attempt,
                "sending request"
            ),
            ClientEvent::Response {
                bucket,
                operation,
                status,
                elapsed,
            } => tracing::debug!(%bucket, %operation, status, ?elapsed, "received response"),
            ClientEvent::RateLimited(state) => tracing::warn!(
                bucket = %state.bucket,
                operation = %state.operation,
                retry_after = ?state.retry_after,
                "bucket rate limited"
            ),
            ClientEvent::InvalidRequestWarning(warning) => tracing::warn!(
                count = warning.count,
                operation = %warning.operation,
                service = %warning.service,
                remaining = ?warning.remaining,
                "invalid request threshold reached"
            ),
        }
    }
}
