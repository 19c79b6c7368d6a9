//! Error types surfaced by the client.

use std::time::Duration;

use serde_json::Value;
use sonoran_core::{Operation, ResolveError, Service};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failure of a single network exchange, before any HTTP status is known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("exchange timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Whether the retry policy may repeat the exchange.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout { .. } | TransportError::Connect(_))
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { timeout }
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Outcome of a failed call.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The client is not set up to make this call. Never reaches the network.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The call itself is malformed. Never reaches the network.
    #[error("invalid {}: {message}", .field.unwrap_or("request"))]
    Validation {
        field: Option<&'static str>,
        message: String,
    },

    /// The bucket is rate limited and the service is in reject mode.
    #[error("bucket {bucket} is rate limited for another {retry_after:?}")]
    RateLimited {
        bucket: String,
        resume_at: Instant,
        retry_after: Duration,
        /// Operation whose response started the limit.
        cause: Operation,
    },

    /// The backend answered with a failure, or the exchange could not complete.
    #[error("api request failed{}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        response: Value,
        #[source]
        transport: Option<TransportError>,
    },
}

impl DispatchError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        DispatchError::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn validation(field: Option<&'static str>, message: impl Into<String>) -> Self {
        DispatchError::Validation {
            field,
            message: message.into(),
        }
    }

    /// HTTP status carried by an `Api` error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingCredentials { .. } | ResolveError::UnusableBaseUrl { .. } => {
                DispatchError::configuration(err.to_string())
            }
            ResolveError::MissingField { field } | ResolveError::InvalidField { field, .. } => {
                DispatchError::validation(Some(field), err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InitError
// ---------------------------------------------------------------------------

/// Errors from building or connecting a client.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no tokio runtime is running")]
    NoRuntime,
    #[error("invalid base url {url:?} for {service}")]
    InvalidBaseUrl {
        service: Service,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client")]
    HttpClient(#[source] reqwest::Error),
    #[error("failed to set up {service}: {message}")]
    Setup {
        service: Service,
        message: String,
        #[source]
        source: Option<DispatchError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_and_connects_are_transient() {
        assert!(TransportError::Timeout {
            timeout: Duration::from_secs(1)
        }
        .is_transient());
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(!TransportError::Request("bad".into()).is_transient());
        assert!(!TransportError::Body("eof".into()).is_transient());
    }

    #[test]
    fn resolve_errors_split_by_kind() {
        let missing = DispatchError::from(ResolveError::MissingField { field: "roomId" });
        assert!(matches!(
            missing,
            DispatchError::Validation {
                field: Some("roomId"),
                ..
            }
        ));
        assert_eq!(missing.to_string(), "invalid roomId: roomId is required");

        let creds = DispatchError::from(ResolveError::MissingCredentials {
            service: Service::Radio,
        });
        assert!(matches!(creds, DispatchError::Configuration { .. }));
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = DispatchError::Api {
            status: Some(400),
            response: Value::Null,
            transport: None,
        };
        assert_eq!(err.to_string(), "api request failed with status 400");
        assert_eq!(err.status(), Some(400));

        let err = DispatchError::Api {
            status: None,
            response: Value::Null,
            transport: Some(TransportError::Connect("refused".into())),
        };
        assert_eq!(err.to_string(), "api request failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
