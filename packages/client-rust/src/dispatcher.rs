//! Request dispatcher.
//!
//! Validates and resolves a call synchronously, then hands it to the FIFO
//! bucket for its operation, creating the bucket on first use.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use sonoran_core::{resolve, OperationDescriptor, ResolveContext, Service};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use url::Url;

use crate::bucket::{BucketHandle, BucketKey, BucketState, QueuedCall};
use crate::client::PendingCall;
use crate::config::{ClientConfig, ServiceConfig};
use crate::error::{DispatchError, InitError};
use crate::events::EventBus;
use crate::rate_limit::{InvalidRequestTracker, RateLimitRegistry};
use crate::transport::BoxTransport;

/// State every bucket worker reads.
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub rate_limits: RateLimitRegistry,
    pub invalid_requests: InvalidRequestTracker,
    pub events: EventBus,
}

/// A configured service with its base URL parsed once.
#[derive(Debug)]
struct ServiceRuntime {
    config: ServiceConfig,
    base_url: Url,
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    services: BTreeMap<Service, ServiceRuntime>,
    buckets: DashMap<BucketKey, BucketHandle>,
    versions: DashMap<Service, u32>,
    /// Prototype cloned into every new bucket worker.
    transport: Mutex<BoxTransport>,
    runtime: Handle,
}

impl Dispatcher {
    pub(crate) fn new(
        config: ClientConfig,
        transport: BoxTransport,
        runtime: Handle,
    ) -> Result<Self, InitError> {
        let mut services = BTreeMap::new();
        for (service, service_config) in &config.services {
            let base_url =
                Url::parse(&service_config.base_url).map_err(|source| InitError::InvalidBaseUrl {
                    service: *service,
                    url: service_config.base_url.clone(),
                    source,
                })?;
            if base_url.cannot_be_a_base() {
                return Err(InitError::InvalidBaseUrl {
                    service: *service,
                    url: service_config.base_url.clone(),
                    source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
                });
            }
            services.insert(
                *service,
                ServiceRuntime {
                    config: service_config.clone(),
                    base_url,
                },
            );
        }

        let invalid_requests = InvalidRequestTracker::new(
            config.invalid_request_window,
            config.invalid_request_warning_interval,
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                rate_limits: RateLimitRegistry::new(),
                invalid_requests,
                events: EventBus::new(),
            }),
            services,
            buckets: DashMap::new(),
            versions: DashMap::new(),
            transport: Mutex::new(transport),
            runtime,
        })
    }

    /// Validates, resolves and enqueues a call.
    ///
    /// Every failure here happens before any network traffic.
    pub(crate) fn submit(
        &self,
        descriptor: &'static OperationDescriptor,
        args: &[Value],
    ) -> Result<PendingCall, DispatchError> {
        let service = descriptor.service;
        let runtime = self.services.get(&service).ok_or_else(|| {
            DispatchError::configuration(format!("{} is not configured", service.display_name()))
        })?;
        self.check_version(descriptor)?;

        let ctx = ResolveContext {
            base_url: &runtime.base_url,
            credentials: runtime.config.credentials.as_ref(),
            headers: &runtime.config.headers,
            default_room_id: runtime.config.default_room_id,
        };
        let request = resolve(descriptor, args, &ctx)?;

        let key = BucketKey::for_operation(descriptor);
        let reject = runtime.config.reject_on_rate_limit;
        if reject {
            if let Some(limit) = self.shared.rate_limits.get(&key) {
                tracing::debug!(bucket = %key, "rejecting call against rate-limited bucket");
                return Err(limit.rejection());
            }
        }

        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                let transport = self.transport.lock().clone();
                BucketHandle::spawn(key.clone(), Arc::clone(&self.shared), transport, &self.runtime)
            })
            .clone();

        let (reply, rx) = oneshot::channel();
        let queued = bucket.enqueue(QueuedCall {
            operation: descriptor.operation,
            request,
            timeout: runtime.config.timeout,
            reject_on_rate_limit: reject,
            reply,
        });
        if !queued {
            self.buckets.remove(&key);
            return Err(DispatchError::configuration("client runtime has shut down"));
        }
        tracing::debug!(bucket = %key, depth = bucket.depth(), operation = %descriptor.name(), "call queued");
        Ok(PendingCall::new(rx))
    }

    fn check_version(&self, descriptor: &OperationDescriptor) -> Result<(), DispatchError> {
        if !self.shared.config.enforce_min_version {
            return Ok(());
        }
        let Some(version) = self.version(descriptor.service) else {
            return Ok(());
        };
        if version < u32::from(descriptor.min_version) {
            return Err(DispatchError::validation(
                None,
                format!(
                    "{} requires {} subscription version {}, current version is {version}",
                    descriptor.name(),
                    descriptor.service.display_name(),
                    descriptor.min_version
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub(crate) fn is_configured(&self, service: Service) -> bool {
        self.services
            .get(&service)
            .is_some_and(|s| s.config.credentials.as_ref().is_some_and(|c| c.is_complete()))
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub(crate) fn rate_limits(&self) -> &RateLimitRegistry {
        &self.shared.rate_limits
    }

    pub(crate) fn invalid_requests(&self) -> &InvalidRequestTracker {
        &self.shared.invalid_requests
    }

    pub(crate) fn set_version(&self, service: Service, version: u32) {
        self.versions.insert(service, version);
    }

    pub(crate) fn version(&self, service: Service) -> Option<u32> {
        self.versions.get(&service).map(|v| *v)
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn bucket_state(&self, key: &BucketKey) -> Option<BucketState> {
        self.buckets.get(key).map(|b| b.state())
    }
}
