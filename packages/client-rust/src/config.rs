use std::collections::BTreeMap;
use std::time::Duration;

use sonoran_core::{Credentials, Service};

/// Per-service connection settings.
///
/// A service is usable only once it has a `ServiceConfig` in
/// [`ClientConfig::services`]; calls to any other service fail with a
/// configuration error.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL every operation path is joined onto.
    pub base_url: String,
    pub credentials: Option<Credentials>,
    /// Sent with every request after the convention's own headers.
    pub headers: Vec<(String, String)>,
    /// Upper bound on a single network exchange.
    pub timeout: Duration,
    /// Fail calls against a rate-limited bucket instead of waiting.
    pub reject_on_rate_limit: bool,
    /// Room used by radio channel updates that name none.
    pub default_room_id: Option<u64>,
}

impl ServiceConfig {
    /// Defaults for `service`: production base URL, no credentials.
    #[must_use]
    pub fn for_service(service: Service) -> Self {
        Self {
            base_url: service.default_base_url().to_string(),
            credentials: None,
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            reject_on_rate_limit: true,
            default_room_id: None,
        }
    }

    /// Defaults for `service` with `credentials` set.
    #[must_use]
    pub fn with_credentials(service: Service, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::for_service(service)
        }
    }
}

/// Retry policy for transient transport failures.
///
/// Only timeouts and connection failures are retried; an HTTP response of any
/// status is never retried by this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Retry `n` waits `n * backoff_step`.
    pub backoff_step: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff_step: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_millis(250),
        }
    }
}

/// Client-wide configuration, merged once when the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub services: BTreeMap<Service, ServiceConfig>,
    pub retry: RetryPolicy,
    /// Used when a rate-limit response carries no usable delay header.
    pub default_rate_limit_delay: Duration,
    /// Fixed window for counting unauthorized and rate-limited responses.
    pub invalid_request_window: Duration,
    /// Every `n`-th invalid response in the window emits a warning event.
    pub invalid_request_warning_interval: u32,
    /// Refuse operations above the subscription version fetched by `connect`.
    pub enforce_min_version: bool,
}

impl ClientConfig {
    /// Settings for `service`, if it is configured.
    #[must_use]
    pub fn service(&self, service: Service) -> Option<&ServiceConfig> {
        self.services.get(&service)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            services: BTreeMap::new(),
            retry: RetryPolicy::default(),
            default_rate_limit_delay: Duration::from_secs(1),
            invalid_request_window: Duration::from_secs(600),
            invalid_request_warning_interval: 10,
            enforce_min_version: false,
        }
    }
}
