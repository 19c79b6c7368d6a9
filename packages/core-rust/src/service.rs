//! Backend services and the credentials used to address them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three independently addressed Sonoran backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Dispatch / computer-aided dispatch.
    Cad,
    /// Community management.
    Cms,
    /// Radio.
    Radio,
}

impl Service {
    /// All services, in catalogue order.
    pub const ALL: [Service; 3] = [Service::Cad, Service::Cms, Service::Radio];

    /// Short lowercase name, used in bucket keys and log fields.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Service::Cad => "cad",
            Service::Cms => "cms",
            Service::Radio => "radio",
        }
    }

    /// Human-readable product name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Service::Cad => "Sonoran CAD",
            Service::Cms => "Sonoran CMS",
            Service::Radio => "Sonoran Radio",
        }
    }

    /// Production base URL, used when no override is configured.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Service::Cad => "https://api.sonorancad.com",
            Service::Cms => "https://api.sonorancms.com",
            Service::Radio => "https://api.sonoranradio.com",
        }
    }

    /// Wire convention spoken by this service.
    #[must_use]
    pub fn convention(self) -> Convention {
        match self {
            Service::Cad | Service::Cms => Convention::Body,
            Service::Radio => Convention::Path,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Credential placement and payload-shaping convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Credentials and shaped fields travel inside a JSON body.
    Body,
    /// Credentials and identifying fields are URL path segments.
    Path,
}

/// Community id / API key pair for one service.
///
/// Set once when the client is built and read-only afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: String,
    pub key: String,
}

impl Credentials {
    #[must_use]
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
        }
    }

    /// Both halves are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.key.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}
