//! Payload resolver.
//!
//! Turns an operation descriptor plus positional arguments into a
//! [`WireRequest`]. Resolution is pure: nothing here touches the network, so
//! every validation failure surfaces before a request is queued.
//!
//! - [`body`]: body convention (CAD, CMS)
//! - [`path`]: path convention (radio)

pub mod body;
pub mod path;

use serde_json::Value;
use url::Url;

use crate::catalogue::{Method, OperationDescriptor};
use crate::service::{Credentials, Service};
use crate::shaping::{shaping, Shaping};

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Service-level inputs to resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub base_url: &'a Url,
    pub credentials: Option<&'a Credentials>,
    /// Extra headers appended after the convention's defaults.
    pub headers: &'a [(String, String)],
    /// Room used by radio channel updates when the caller names none.
    pub default_room_id: Option<u64>,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    pub fn new(base_url: &'a Url, credentials: Option<&'a Credentials>) -> Self {
        Self {
            base_url,
            credentials,
            headers: &[],
            default_room_id: None,
        }
    }

    /// Complete credentials, or the error naming the service that lacks them.
    pub(crate) fn require_credentials(
        &self,
        service: Service,
    ) -> Result<&'a Credentials, ResolveError> {
        self.credentials
            .filter(|c| c.is_complete())
            .ok_or(ResolveError::MissingCredentials { service })
    }
}

/// Fully resolved HTTP request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    /// Ordered; later entries win on duplicate names.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl WireRequest {
    /// Effective value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Errors raised while resolving a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("community id or api key not configured for {service}")]
    MissingCredentials { service: Service },
    #[error("base url {url} cannot carry path segments")]
    UnusableBaseUrl { url: String },
}

impl ResolveError {
    /// Field the error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ResolveError::MissingField { field } | ResolveError::InvalidField { field, .. } => {
                Some(*field)
            }
            ResolveError::MissingCredentials { .. } | ResolveError::UnusableBaseUrl { .. } => None,
        }
    }
}

/// Resolves `descriptor` called with `args` into a wire request.
///
/// # Errors
///
/// Returns [`ResolveError::MissingCredentials`] when the operation needs
/// credentials the context lacks, and a field error when a path-convention
/// argument is missing or malformed.
pub fn resolve(
    descriptor: &OperationDescriptor,
    args: &[Value],
    ctx: &ResolveContext<'_>,
) -> Result<WireRequest, ResolveError> {
    let strategy = shaping(descriptor.operation);
    tracing::trace!(operation = %descriptor.name(), ?strategy, "resolving request");
    match strategy {
        Shaping::Path(route) => path::resolve(descriptor, route, args, ctx),
        strategy => body::resolve(descriptor, strategy, args, ctx),
    }
}

/// Appends `segments` to the base URL's path, percent-encoding each one.
pub(crate) fn join_url<'s>(
    base: &Url,
    template: &str,
    segments: impl IntoIterator<Item = &'s str>,
) -> Result<Url, ResolveError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| ResolveError::UnusableBaseUrl {
                url: base.to_string(),
            })?;
        path.pop_if_empty();
        path.extend(template.split('/'));
        path.extend(segments);
    }
    Ok(url)
}
