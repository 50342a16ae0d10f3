//! Progress events and per-service accounting.
//!
//! The orchestrator reports every observable step through a caller-supplied
//! callback. Events fire in this order within one invocation:
//!
//! | Event | When |
//! |-------|------|
//! | [`ProgressEvent::AbortHandle`] | once, before any work |
//! | [`ProgressEvent::QueryPlan`] | once, after services are assigned |
//! | [`ProgressEvent::ServiceCacheHit`] | per identifier answered from a cache |
//! | [`ProgressEvent::ServiceQueryStarted`] / [`ProgressEvent::ServiceQueryFinished`] | per live query |
//! | [`ProgressEvent::FetchStarted`] / [`ProgressEvent::FetchFinished`] | per HTTP fetch inside a query |
//! | [`ProgressEvent::Rejection`] | per live query that failed outright |
//!
//! A [`ProgressReporter`] also folds every event into a [`ProgressSummary`],
//! so callers can render final counts without tracking events themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{Diagnostic, Isbn, ServiceId};

/// Hands the caller a way to cancel an in-progress resolution.
///
/// Cancellation is cooperative: queries that have not started resolve to
/// their own identifier, queries already fetching run to completion.
#[derive(Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Debug for AbortHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    AbortHandle(AbortHandle),
    QueryPlan {
        per_service: BTreeMap<ServiceId, BTreeSet<Isbn>>,
    },
    ServiceCacheHit {
        service: ServiceId,
        isbn: Isbn,
    },
    ServiceQueryStarted {
        service: ServiceId,
        isbn: Isbn,
    },
    ServiceQueryFinished {
        service: ServiceId,
        isbn: Isbn,
        isbns: BTreeSet<Isbn>,
        warnings: Vec<Diagnostic>,
        faults: Vec<Diagnostic>,
        elapsed: Duration,
    },
    FetchStarted {
        service: ServiceId,
        url: String,
    },
    FetchFinished {
        service: ServiceId,
        url: String,
        elapsed: Duration,
    },
    Rejection {
        reason: String,
    },
}

/// Counts for one service over a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTally {
    pub planned: usize,
    pub cache_hits: usize,
    pub queries: usize,
    pub warnings: usize,
    pub faults: usize,
    pub fetches: usize,
    pub fetch_durations: Vec<Duration>,
}

impl ServiceTally {
    pub fn total_fetch_time(&self) -> Duration {
        self.fetch_durations.iter().sum()
    }
}

/// Everything a caller needs to render a final run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub services: BTreeMap<ServiceId, ServiceTally>,
    pub rejections: usize,
    /// Queries skipped because the run was aborted before they started.
    pub aborted: usize,
}

impl ProgressSummary {
    pub fn record(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::AbortHandle(_) => {}
            ProgressEvent::QueryPlan { per_service } => {
                for (service, isbns) in per_service {
                    self.tally(*service).planned += isbns.len();
                }
            }
            ProgressEvent::ServiceCacheHit { service, .. } => self.tally(*service).cache_hits += 1,
            ProgressEvent::ServiceQueryStarted { service, .. } => self.tally(*service).queries += 1,
            ProgressEvent::ServiceQueryFinished {
                service,
                warnings,
                faults,
                ..
            } => {
                let tally = self.tally(*service);
                tally.warnings += warnings.len();
                tally.faults += faults.len();
            }
            ProgressEvent::FetchStarted { service, .. } => self.tally(*service).fetches += 1,
            ProgressEvent::FetchFinished {
                service, elapsed, ..
            } => self.tally(*service).fetch_durations.push(*elapsed),
            ProgressEvent::Rejection { .. } => self.rejections += 1,
        }
    }

    pub fn total_warnings(&self) -> usize {
        self.services.values().map(|tally| tally.warnings).sum()
    }

    pub fn total_faults(&self) -> usize {
        self.services.values().map(|tally| tally.faults).sum()
    }

    pub fn total_cache_hits(&self) -> usize {
        self.services.values().map(|tally| tally.cache_hits).sum()
    }

    fn tally(&mut self, service: ServiceId) -> &mut ServiceTally {
        self.services.entry(service).or_default()
    }
}

/// Caller-supplied progress callback.
pub type ProgressFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Fans events out to the caller's callback and the run summary.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<ProgressFn>,
    summary: Arc<Mutex<ProgressSummary>>,
}

impl ProgressReporter {
    pub fn new(sink: Option<ProgressFn>) -> Self {
        Self {
            sink,
            summary: Arc::default(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event);
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }

    pub(crate) fn note_aborted(&self) {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .aborted += 1;
    }

    pub fn summary(&self) -> ProgressSummary {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
