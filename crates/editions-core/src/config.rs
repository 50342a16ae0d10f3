//! Resolver configuration.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `EDITIONS_GLOBAL_CONCURRENCY` | queries in flight across all services | 10 |
//! | `EDITIONS_REQUEST_TIMEOUT_MS` | per-request timeout | 10000 |
//! | `EDITIONS_USER_AGENT` | HTTP user agent | `editions/<version>` |
//! | `EDITIONS_FAULT_TTL_SECS` | how long faulted results stay cached | 86400 |
//! | `EDITIONS_SEED` | fixed seed for service assignment | random |
//! | `EDITIONS_SERVICES` | comma-separated enabled services | all |

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::{EditionsError, ServiceId, ServicePolicy, ValidationError};

pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Enabled services, in preference order for failover ties.
    pub services: Vec<ServiceId>,
    pub global_concurrency: usize,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    /// Cache lifetime of a result that carried faults. Clean results never
    /// expire.
    pub fault_ttl: Duration,
    /// Seed for service assignment and failover order. `None` seeds randomly.
    pub seed: Option<u64>,
    pub policies: BTreeMap<ServiceId, ServicePolicy>,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            services: ServiceId::ALL.to_vec(),
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            user_agent: concat!("editions/", env!("CARGO_PKG_VERSION")).to_owned(),
            fault_ttl: DEFAULT_FAULT_TTL,
            seed: None,
            policies: ServiceId::ALL
                .into_iter()
                .map(|service| (service, ServicePolicy::default_for(service)))
                .collect(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `EDITIONS_*` environment variables.
    pub fn from_env() -> Result<Self, EditionsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EditionsError> {
        let mut config = Self::default();

        if let Some(value) = lookup("EDITIONS_GLOBAL_CONCURRENCY") {
            config.global_concurrency = parse_var("EDITIONS_GLOBAL_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("EDITIONS_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_var("EDITIONS_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("EDITIONS_USER_AGENT") {
            let value = value.trim();
            if !value.is_empty() {
                config.user_agent = value.to_owned();
            }
        }
        if let Some(value) = lookup("EDITIONS_FAULT_TTL_SECS") {
            config.fault_ttl =
                Duration::from_secs(parse_var("EDITIONS_FAULT_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("EDITIONS_SEED") {
            config.seed = Some(parse_var("EDITIONS_SEED", &value)?);
        }
        if let Some(value) = lookup("EDITIONS_SERVICES") {
            config.services = parse_services(&value)?;
        }

        Ok(config)
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = ServiceId>) -> Self {
        self.services = services.into_iter().collect();
        self
    }

    pub fn with_global_concurrency(mut self, limit: usize) -> Self {
        self.global_concurrency = limit;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fault_ttl(mut self, fault_ttl: Duration) -> Self {
        self.fault_ttl = fault_ttl;
        self
    }

    pub fn with_policy(mut self, policy: ServicePolicy) -> Self {
        self.policies.insert(policy.service, policy);
        self
    }

    /// Set every service's query interval at once.
    pub fn with_query_interval(mut self, interval: Duration) -> Self {
        for service in ServiceId::ALL {
            self.policies
                .insert(service, ServicePolicy::with_interval(service, interval));
        }
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn policy_for(&self, service: ServiceId) -> ServicePolicy {
        self.policies
            .get(&service)
            .cloned()
            .unwrap_or_else(|| ServicePolicy::default_for(service))
    }

    /// Enabled services with duplicates removed, first occurrence kept.
    pub fn enabled_services(&self) -> Vec<ServiceId> {
        let mut enabled = Vec::with_capacity(self.services.len());
        for service in &self.services {
            if !enabled.contains(service) {
                enabled.push(*service);
            }
        }
        enabled
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: &str) -> Result<T, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidConfig {
            key,
            value: value.to_owned(),
        })
}

fn parse_services(value: &str) -> Result<Vec<ServiceId>, ValidationError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ServiceId::from_str)
        .collect()
}
