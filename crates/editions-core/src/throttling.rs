//! Global concurrency cap and per-service pacing.
//!
//! A [`ConcurrencyLimit`] bounds how many service queries are in flight across
//! all services. A [`ServiceThrottle`] runs one service's queries strictly one
//! at a time and spaces their starts by the service's query interval.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use crate::{ServiceError, ServicePolicy};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Hard cap on simultaneously running queries.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    permits: Arc<Semaphore>,
}

impl ConcurrencyLimit {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServiceError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::internal("concurrency limiter was closed"))
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Held while a query to one service runs; dropping it lets the next one go.
#[derive(Debug)]
pub struct ServiceTurn {
    _turn: OwnedMutexGuard<()>,
}

/// Serializes and paces one service's queries.
#[derive(Clone)]
pub struct ServiceThrottle {
    limiter: Option<Arc<DirectRateLimiter>>,
    turn: Arc<Mutex<()>>,
}

impl ServiceThrottle {
    /// A zero interval only serializes; it does not pace.
    pub fn new(interval: Duration) -> Self {
        let limiter = quota_for_interval(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self {
            limiter,
            turn: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_policy(policy: &ServicePolicy) -> Self {
        Self::new(policy.query_interval)
    }

    /// Wait until it is this caller's turn and the interval since the
    /// previous start has elapsed.
    pub async fn acquire(&self) -> ServiceTurn {
        let turn = self.turn.clone().lock_owned().await;
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        ServiceTurn { _turn: turn }
    }
}

fn quota_for_interval(interval: Duration) -> Option<Quota> {
    if interval.is_zero() {
        return None;
    }
    Quota::with_period(interval).map(|quota| quota.allow_burst(NonZeroU32::MIN))
}
