use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn, Instrument};

use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::{ServiceError, ServiceId};

/// A fetch that reached the service, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Body(String),
    Status {
        status: u16,
        status_text: String,
        retry_after: Option<String>,
    },
}

impl FetchOutcome {
    /// The fault message for a non-success outcome, `None` for a body.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Body(_) => None,
            Self::Status {
                status,
                status_text,
                retry_after: Some(retry_after),
            } => Some(format!(
                "HTTP {status} {status_text} (retry after {retry_after})"
            )),
            Self::Status {
                status,
                status_text,
                retry_after: None,
            } => Some(format!("HTTP {status} {status_text}")),
        }
    }
}

/// Fetch handle given to an adapter for one service.
///
/// Wraps the caller's [`HttpClient`] with the service's circuit breaker,
/// progress events around every request, and request defaults.
#[derive(Clone)]
pub struct ServiceFetcher {
    service: ServiceId,
    client: Arc<dyn HttpClient>,
    breaker: Arc<CircuitBreaker>,
    progress: ProgressReporter,
    user_agent: String,
    timeout_ms: u64,
}

impl ServiceFetcher {
    pub fn new(
        service: ServiceId,
        client: Arc<dyn HttpClient>,
        breaker: Arc<CircuitBreaker>,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            service,
            client,
            breaker,
            progress,
            user_agent: concat!("editions/", env!("CARGO_PKG_VERSION")).to_owned(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// Whether the service's circuit would let a request through.
    pub fn is_available(&self) -> bool {
        self.breaker.is_available()
    }

    /// GET `url` and decode the outcome.
    ///
    /// Transport failures and an open circuit are errors; HTTP statuses are
    /// returned as [`FetchOutcome::Status`] for the adapter to turn into a
    /// fault. 429 and 5xx count against the circuit breaker.
    pub async fn get_text(&self, url: &str) -> Result<FetchOutcome, ServiceError> {
        if !self.breaker.allow_request() {
            return Err(ServiceError::unavailable(format!(
                "{} circuit breaker is open; skipping upstream call",
                self.service
            )));
        }

        let request = HttpRequest::get(url)
            .with_header("user-agent", &self.user_agent)
            .with_timeout_ms(self.timeout_ms);

        self.progress.emit(ProgressEvent::FetchStarted {
            service: self.service,
            url: url.to_owned(),
        });
        let started = Instant::now();
        let span = tracing::debug_span!("fetch", service = %self.service, url);
        let result = self.client.execute(request).instrument(span).await;
        let elapsed = started.elapsed();
        self.progress.emit(ProgressEvent::FetchFinished {
            service: self.service,
            url: url.to_owned(),
            elapsed,
        });

        let response = result.map_err(|error| {
            self.breaker.record_failure();
            warn!(service = %self.service, url, "transport error: {}", error.message());
            ServiceError::unavailable(format!(
                "{} transport error: {}",
                self.service,
                error.message()
            ))
        })?;

        debug!(service = %self.service, url, status = response.status, ?elapsed, "fetch finished");
        Ok(self.classify(response))
    }

    /// [`get_text`](Self::get_text) for the first request of a query, where a
    /// 429 is a [`RateLimited`](crate::ServiceErrorKind::RateLimited) error
    /// instead of a status outcome.
    pub async fn get_entry_text(&self, url: &str) -> Result<FetchOutcome, ServiceError> {
        match self.get_text(url).await? {
            limited @ FetchOutcome::Status { status: 429, .. } => {
                let message = limited.failure_message().unwrap_or_default();
                warn!(service = %self.service, url, "rate limited: {message}");
                Err(ServiceError::rate_limited(format!(
                    "{} rate limited: {message}",
                    self.service
                )))
            }
            outcome => Ok(outcome),
        }
    }

    fn classify(&self, response: HttpResponse) -> FetchOutcome {
        if response.is_success() {
            self.breaker.record_success();
            return FetchOutcome::Body(response.body);
        }

        if response.status == 429 || response.status >= 500 {
            self.breaker.record_failure();
        }
        FetchOutcome::Status {
            status: response.status,
            status_text: response.status_text,
            retry_after: response.retry_after,
        }
    }
}
