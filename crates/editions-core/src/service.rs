//! Service identifiers, the adapter contract, and per-service policies.
//!
//! # Services
//!
//! | Service | Cache document key | Default interval |
//! |---------|--------------------|------------------|
//! | [`ServiceId::OpenLibraryWorkEditions`] | `Open Library WorkEditions` | 1s |
//! | [`ServiceId::OpenLibrarySearch`] | `Open Library Search` | 1s |
//! | [`ServiceId::LibraryThingThingIsbn`] | `LibraryThing ThingISBN` | 1s |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::ServiceFetcher;
use crate::{Isbn, ResultSet, ValidationError};

/// Bibliographic metadata services that can report other editions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceId {
    OpenLibraryWorkEditions,
    OpenLibrarySearch,
    LibraryThingThingIsbn,
}

impl ServiceId {
    pub const ALL: [Self; 3] = [
        Self::OpenLibraryWorkEditions,
        Self::OpenLibrarySearch,
        Self::LibraryThingThingIsbn,
    ];

    /// Display name, also used as the key in the persisted cache document.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenLibraryWorkEditions => "Open Library WorkEditions",
            Self::OpenLibrarySearch => "Open Library Search",
            Self::LibraryThingThingIsbn => "LibraryThing ThingISBN",
        }
    }

    /// Short name accepted in configuration.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::OpenLibraryWorkEditions => "ol-editions",
            Self::OpenLibrarySearch => "ol-search",
            Self::LibraryThingThingIsbn => "thingisbn",
        }
    }
}

impl Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|service| {
                service.slug().eq_ignore_ascii_case(wanted)
                    || service.as_str().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ValidationError::InvalidService {
                value: wanted.to_owned(),
            })
    }
}

/// Service-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Transport failed or the service's circuit is open.
    Unavailable,
    /// The service told us to slow down.
    RateLimited,
    /// The query was cancelled before it started.
    Aborted,
    Internal,
}

/// Structured error for a single service query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ServiceErrorKind,
    message: String,
    retryable: bool,
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn aborted() -> Self {
        Self {
            kind: ServiceErrorKind::Aborted,
            message: String::from("query aborted before it started"),
            retryable: true,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_aborted(&self) -> bool {
        matches!(self.kind, ServiceErrorKind::Aborted)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ServiceErrorKind::Unavailable => "service.unavailable",
            ServiceErrorKind::RateLimited => "service.rate_limited",
            ServiceErrorKind::Aborted => "service.aborted",
            ServiceErrorKind::Internal => "service.internal",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ServiceError {}

/// Boxed future returned by [`EditionService::resolve`].
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<ResultSet, ServiceError>> + Send + 'a>>;

/// Adapter contract for an edition-reporting service.
///
/// An adapter turns one identifier into the set of identifiers the service
/// considers editions of the same work. It may issue several sequential or
/// paginated fetches through the supplied [`ServiceFetcher`].
///
/// Parse problems are reported inside the [`ResultSet`]: a malformed
/// top-level response or an empty traversal is a fault, a malformed entry
/// inside a usable response is a warning. Transport failures are returned as
/// [`ServiceError`], except on continuation pages, where everything gathered
/// so far is returned together with a fault.
pub trait EditionService: Send + Sync {
    fn id(&self) -> ServiceId;

    fn resolve<'a>(&'a self, isbn: &'a Isbn, fetcher: &'a ServiceFetcher) -> ResolveFuture<'a>;
}

/// Scheduling policy for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    pub service: ServiceId,
    /// Minimum spacing between query starts. Queries to one service never
    /// overlap regardless of this value.
    pub query_interval: Duration,
}

impl ServicePolicy {
    pub fn open_library_default(service: ServiceId) -> Self {
        Self {
            service,
            query_interval: Duration::from_secs(1),
        }
    }

    pub fn library_thing_default() -> Self {
        Self {
            service: ServiceId::LibraryThingThingIsbn,
            query_interval: Duration::from_secs(1),
        }
    }

    pub fn default_for(service: ServiceId) -> Self {
        match service {
            ServiceId::OpenLibraryWorkEditions | ServiceId::OpenLibrarySearch => {
                Self::open_library_default(service)
            }
            ServiceId::LibraryThingThingIsbn => Self::library_thing_default(),
        }
    }

    pub fn with_interval(service: ServiceId, query_interval: Duration) -> Self {
        Self {
            service,
            query_interval,
        }
    }
}
