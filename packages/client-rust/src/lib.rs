//! Sonoran client: rate-limit aware request dispatch for the Sonoran CAD,
//! CMS and radio APIs.
//!
//! Calls are resolved and validated synchronously, then queued on a FIFO
//! bucket keyed by operation path and service. Each bucket sends one request
//! at a time and honors server rate limits before sending the next.

pub mod bucket;
pub mod client;
pub mod config;
pub(crate) mod dispatcher;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod telemetry;
pub mod transport;

pub use bucket::{BucketKey, BucketState};
pub use client::{ClientBuilder, PendingCall, SonoranClient};
pub use config::{ClientConfig, RetryPolicy, ServiceConfig};
pub use error::{DispatchError, InitError, TransportError};
pub use events::{ClientEvent, EventBus, EventKind, SubscriptionId, TracingObserver};
pub use rate_limit::{InvalidRequestWarning, RateLimitRegistry, RateLimitState};
pub use transport::{
    build_transport_pipeline, BoxTransport, Exchange, ReqwestTransport, TransportResponse,
};

pub use sonoran_core::{Credentials, Operation, Service};
