//! Fetch orchestration across services.
//!
//! One invocation runs in three passes:
//!
//! 1. **Plan**: a distinct input identifier that some enabled service's cache
//!    already resolves is answered from that cache and left out of the plan.
//!    Every other identifier is assigned to a service picked uniformly at
//!    random. The remaining services, shuffled, are its failover chain.
//! 2. **Cache pass**: cached answers are merged into the result and shared
//!    with every other service's cache.
//! 3. **Live pass**: everything else runs concurrently behind the global
//!    concurrency limit and the service's turn-taking throttle, through the
//!    service's memoizing equivalence cache.
//!
//! Identifiers whose query fails outright degrade to themselves and are
//! reported once as a rejection. Aborted identifiers degrade to themselves
//! silently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use fastrand::Rng;
use futures_util::future::{join_all, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::default_adapters;
use crate::cache::{EquivalenceCache, Expiry, Lookup, LookupFn};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{ResolverConfig, DEFAULT_GLOBAL_CONCURRENCY};
use crate::document::CacheDocument;
use crate::fetch::ServiceFetcher;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::progress::{AbortHandle, ProgressEvent, ProgressFn, ProgressReporter, ProgressSummary};
use crate::throttling::{ConcurrencyLimit, ServiceThrottle};
use crate::{
    Diagnostic, EditionService, EditionsError, Isbn, ServiceError, ServiceErrorKind, ServiceId,
    ServicePolicy,
};

type IsbnSet = BTreeSet<Isbn>;

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Every edition found, in canonical form, including the inputs.
    pub isbns: IsbnSet,
    pub summary: ProgressSummary,
}

/// Resolves identifiers to editions across the configured services.
///
/// Circuit breakers and query pacing live on the resolver, so they carry over
/// between invocations. Caches live in the [`CacheDocument`] passed to each
/// invocation.
pub struct EditionResolver {
    config: ResolverConfig,
    client: Arc<dyn HttpClient>,
    adapters: BTreeMap<ServiceId, Arc<dyn EditionService>>,
    breakers: BTreeMap<ServiceId, Arc<CircuitBreaker>>,
    throttles: BTreeMap<ServiceId, ServiceThrottle>,
}

impl EditionResolver {
    pub fn new(config: ResolverConfig, client: Arc<dyn HttpClient>) -> Self {
        Self::with_adapters(config, client, default_adapters())
    }

    /// Use `adapters` instead of the public endpoints. A later adapter for the
    /// same service replaces an earlier one.
    pub fn with_adapters(
        config: ResolverConfig,
        client: Arc<dyn HttpClient>,
        adapters: Vec<Arc<dyn EditionService>>,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect::<BTreeMap<_, _>>();
        let breakers = adapters
            .keys()
            .map(|service| {
                let breaker = CircuitBreaker::new(*service, config.circuit_breaker);
                (*service, Arc::new(breaker))
            })
            .collect();
        let throttles = adapters
            .keys()
            .map(|service| {
                let throttle = ServiceThrottle::from_policy(&config.policy_for(*service));
                (*service, throttle)
            })
            .collect();

        Self {
            config,
            client,
            adapters,
            breakers,
            throttles,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn circuit_breaker(&self, service: ServiceId) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(&service)
    }

    /// Enabled services that have an adapter.
    pub fn enabled_services(&self) -> Vec<ServiceId> {
        self.config
            .enabled_services()
            .into_iter()
            .filter(|service| self.adapters.contains_key(service))
            .collect()
    }

    pub async fn resolve(
        &self,
        isbns: &[Isbn],
        document: &mut CacheDocument,
        progress: ProgressReporter,
    ) -> Result<Resolution, EditionsError> {
        self.resolve_with_abort(isbns, document, progress, AbortHandle::new())
            .await
    }

    /// [`resolve`](Self::resolve) under a caller-held abort handle.
    pub async fn resolve_with_abort(
        &self,
        isbns: &[Isbn],
        document: &mut CacheDocument,
        progress: ProgressReporter,
        abort: AbortHandle,
    ) -> Result<Resolution, EditionsError> {
        let services = self.enabled_services();
        if services.is_empty() {
            return Err(EditionsError::NoServices);
        }

        let run = Run {
            lanes: self.open_lanes(&services, document, &progress, abort.token())?,
            limit: ConcurrencyLimit::new(self.config.global_concurrency),
            progress: progress.clone(),
            token: abort.token().clone(),
        };
        progress.emit(ProgressEvent::AbortHandle(abort));

        let inputs = isbns.iter().map(Isbn::canonical).collect::<IsbnSet>();
        let mut rng = self.config.seed.map_or_else(Rng::new, Rng::with_seed);
        let Plan { known, assignments } = run.plan(&inputs, &services, &mut rng);
        let mut per_service = BTreeMap::<ServiceId, IsbnSet>::new();
        for assignment in &assignments {
            per_service
                .entry(assignment.service)
                .or_default()
                .insert(assignment.isbn.clone());
        }
        debug!(
            identifiers = inputs.len(),
            already_known = known.len(),
            services = per_service.len(),
            "query plan ready"
        );
        progress.emit(ProgressEvent::QueryPlan { per_service });

        let mut editions = IsbnSet::new();
        for (holder, isbn, found) in known {
            editions.extend(run.hit(holder, &isbn, found));
        }
        let mut live = Vec::new();
        for assignment in assignments {
            let cached = run
                .lanes
                .get(&assignment.service)
                .and_then(|lane| lane.cache.check_cache(&assignment.isbn));
            match cached {
                Some(found) => {
                    editions.extend(run.hit(assignment.service, &assignment.isbn, found));
                }
                None => live.push(assignment),
            }
        }

        let queried = live.len();
        let answers = join_all(live.into_iter().map(|assignment| self.query(&run, assignment))).await;
        for answer in answers {
            editions.extend(answer);
        }

        for (service, lane) in &run.lanes {
            document.insert(service.as_str().to_owned(), lane.cache.export()?);
        }

        let summary = progress.summary();
        info!(
            identifiers = inputs.len(),
            editions = editions.len(),
            queried,
            cache_hits = summary.total_cache_hits(),
            warnings = summary.total_warnings(),
            faults = summary.total_faults(),
            rejections = summary.rejections,
            aborted = summary.aborted,
            "edition resolution finished"
        );

        Ok(Resolution {
            isbns: editions,
            summary,
        })
    }

    fn open_lanes(
        &self,
        services: &[ServiceId],
        document: &CacheDocument,
        progress: &ProgressReporter,
        token: &CancellationToken,
    ) -> Result<BTreeMap<ServiceId, Lane>, EditionsError> {
        let mut lanes = BTreeMap::new();
        for service in services {
            let (Some(adapter), Some(breaker), Some(throttle)) = (
                self.adapters.get(service),
                self.breakers.get(service),
                self.throttles.get(service),
            ) else {
                continue;
            };

            let fetcher = ServiceFetcher::new(
                *service,
                self.client.clone(),
                breaker.clone(),
                progress.clone(),
            )
            .with_user_agent(self.config.user_agent.clone())
            .with_timeout_ms(self.config.request_timeout_ms);
            let lookup = self.lookup(adapter.clone(), fetcher, progress, token);

            let cache = EquivalenceCache::from_export(lookup, document.get(service.as_str()))
                .map_err(|source| EditionsError::MalformedCache {
                    service: service.as_str().to_owned(),
                    source,
                })?;
            debug!(
                service = %service,
                known = cache.known_identifiers(),
                "cache loaded"
            );

            lanes.insert(
                *service,
                Lane {
                    cache,
                    breaker: breaker.clone(),
                    throttle: throttle.clone(),
                },
            );
        }
        Ok(lanes)
    }

    /// The memoized call for one service: query the adapter, report it, and
    /// choose how long the answer stays cached.
    fn lookup(
        &self,
        adapter: Arc<dyn EditionService>,
        fetcher: ServiceFetcher,
        progress: &ProgressReporter,
        token: &CancellationToken,
    ) -> LookupFn<Isbn, IsbnSet, ServiceError> {
        let progress = progress.clone();
        let token = token.clone();
        let fault_ttl = self.config.fault_ttl;

        Arc::new(move |isbn: Isbn| {
            let adapter = adapter.clone();
            let fetcher = fetcher.clone();
            let progress = progress.clone();
            let token = token.clone();
            async move {
                if token.is_cancelled() {
                    return Err(ServiceError::aborted());
                }
                let service = adapter.id();
                progress.emit(ProgressEvent::ServiceQueryStarted {
                    service,
                    isbn: isbn.clone(),
                });
                let started = Instant::now();
                let outcome = adapter.resolve(&isbn, &fetcher).await;
                let elapsed = started.elapsed();

                match outcome {
                    Ok(result) => {
                        for fault in &result.faults {
                            warn!(
                                service = %service,
                                isbn = %isbn,
                                url = fault.url.as_deref().unwrap_or_default(),
                                "query fault: {}",
                                fault.message
                            );
                        }
                        progress.emit(ProgressEvent::ServiceQueryFinished {
                            service,
                            isbn,
                            isbns: result.isbns.clone(),
                            warnings: result.warnings.clone(),
                            faults: result.faults.clone(),
                            elapsed,
                        });
                        let expiry = if result.is_faulted() {
                            Expiry::after(fault_ttl)
                        } else {
                            Expiry::Never
                        };
                        Ok(Lookup {
                            value: result.isbns,
                            expiry,
                        })
                    }
                    Err(error) => {
                        progress.emit(ProgressEvent::ServiceQueryFinished {
                            service,
                            isbn,
                            isbns: IsbnSet::new(),
                            warnings: Vec::new(),
                            faults: vec![Diagnostic::new(error.to_string())],
                            elapsed,
                        });
                        Err(error)
                    }
                }
            }
            .boxed()
        })
    }

    /// Live query for one assignment, failing over along its chain while
    /// services are unavailable.
    async fn query(&self, run: &Run, assignment: Assignment) -> IsbnSet {
        let Assignment {
            isbn,
            service,
            failover,
        } = assignment;

        let _permit = tokio::select! {
            biased;
            _ = run.token.cancelled() => return run.aborted(service, &isbn),
            permit = run.limit.acquire() => match permit {
                Ok(permit) => permit,
                Err(error) => return run.reject(service, &isbn, &error),
            },
        };

        let mut last_error = None;
        for candidate in std::iter::once(service).chain(failover) {
            let Some(lane) = run.lanes.get(&candidate) else {
                continue;
            };
            if !lane.breaker.is_available() {
                debug!(service = %candidate, isbn = %isbn, "circuit open, failing over");
                last_error = Some(ServiceError::unavailable(format!(
                    "{candidate} circuit breaker is open"
                )));
                continue;
            }

            let _turn = tokio::select! {
                biased;
                _ = run.token.cancelled() => return run.aborted(candidate, &isbn),
                turn = lane.throttle.acquire() => turn,
            };

            // Another query may have answered this identifier while we waited.
            if let Some((holder, found)) = run.first_hit(&isbn) {
                return run.hit(holder, &isbn, found);
            }

            match lane.cache.call(&isbn).await {
                Ok(found) => return run.share(candidate, found),
                Err(error) if error.is_aborted() => return run.aborted(candidate, &isbn),
                Err(error)
                    if matches!(
                        error.kind(),
                        ServiceErrorKind::Unavailable | ServiceErrorKind::RateLimited
                    ) =>
                {
                    debug!(service = %candidate, isbn = %isbn, %error, "service unavailable, failing over");
                    last_error = Some(error);
                }
                Err(error) => return run.reject(candidate, &isbn, &error),
            }
        }

        let error = last_error
            .unwrap_or_else(|| ServiceError::unavailable("no enabled service is available"));
        run.reject(service, &isbn, &error)
    }
}

/// One service's resources for a single invocation.
struct Lane {
    cache: EquivalenceCache<ServiceError>,
    breaker: Arc<CircuitBreaker>,
    throttle: ServiceThrottle,
}

#[derive(Debug)]
struct Assignment {
    isbn: Isbn,
    service: ServiceId,
    failover: Vec<ServiceId>,
}

#[derive(Debug, Default)]
struct Plan {
    /// Identifiers some cache already resolves, with the service holding them.
    known: Vec<(ServiceId, Isbn, IsbnSet)>,
    assignments: Vec<Assignment>,
}

struct Run {
    lanes: BTreeMap<ServiceId, Lane>,
    limit: ConcurrencyLimit,
    progress: ProgressReporter,
    token: CancellationToken,
}

impl Run {
    fn plan(&self, inputs: &IsbnSet, services: &[ServiceId], rng: &mut Rng) -> Plan {
        let mut plan = Plan::default();
        for isbn in inputs {
            if let Some((holder, found)) = self.first_hit(isbn) {
                plan.known.push((holder, isbn.clone(), found));
                continue;
            }
            let service = services[rng.usize(..services.len())];
            let mut failover = services
                .iter()
                .copied()
                .filter(|other| *other != service)
                .collect::<Vec<_>>();
            rng.shuffle(&mut failover);
            plan.assignments.push(Assignment {
                isbn: isbn.clone(),
                service,
                failover,
            });
        }
        plan
    }

    fn first_hit(&self, isbn: &Isbn) -> Option<(ServiceId, IsbnSet)> {
        self.lanes.iter().find_map(|(service, lane)| {
            lane.cache
                .check_cache(isbn)
                .map(|found| (*service, found))
        })
    }

    fn hit(&self, service: ServiceId, isbn: &Isbn, found: IsbnSet) -> IsbnSet {
        debug!(service = %service, isbn = %isbn, editions = found.len(), "cache hit");
        self.progress.emit(ProgressEvent::ServiceCacheHit {
            service,
            isbn: isbn.clone(),
        });
        self.share(service, found)
    }

    /// Merge `found` into every other service's cache and return the union of
    /// everything those caches now hold for it.
    fn share(&self, from: ServiceId, found: IsbnSet) -> IsbnSet {
        let mut merged = found.clone();
        for (service, lane) in &self.lanes {
            if *service != from {
                merged.extend(lane.cache.absorb(&found));
            }
        }
        merged
    }

    fn aborted(&self, service: ServiceId, isbn: &Isbn) -> IsbnSet {
        debug!(service = %service, isbn = %isbn, "aborted before querying");
        self.progress.note_aborted();
        IsbnSet::from([isbn.clone()])
    }

    fn reject(&self, service: ServiceId, isbn: &Isbn, error: &ServiceError) -> IsbnSet {
        warn!(service = %service, isbn = %isbn, code = error.code(), "query rejected: {}", error.message());
        self.progress.emit(ProgressEvent::Rejection {
            reason: format!("{service} could not resolve {isbn}: {error}"),
        });
        IsbnSet::from([isbn.clone()])
    }
}

/// Options for [`resolve_editions`].
pub struct ResolveOptions<'a> {
    /// Services to query. Empty is an error.
    pub services: Vec<ServiceId>,
    /// Read before and written back after the run. `None` runs with an empty,
    /// discarded document.
    pub cache_document: Option<&'a mut CacheDocument>,
    /// `None` uses [`ReqwestHttpClient`].
    pub client: Option<Arc<dyn HttpClient>>,
    pub on_progress: Option<ProgressFn>,
    pub global_concurrency: usize,
    pub seed: Option<u64>,
    /// Overrides of the default per-service policies.
    pub policies: Vec<ServicePolicy>,
}

impl Default for ResolveOptions<'_> {
    fn default() -> Self {
        Self {
            services: ServiceId::ALL.to_vec(),
            cache_document: None,
            client: None,
            on_progress: None,
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            seed: None,
            policies: Vec::new(),
        }
    }
}

/// Every known edition of every identifier in `identifiers`.
pub async fn resolve_editions<I, S>(
    identifiers: I,
    options: ResolveOptions<'_>,
) -> Result<IsbnSet, EditionsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let isbns = identifiers
        .into_iter()
        .map(|identifier| Isbn::parse(identifier.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = ResolverConfig::default()
        .with_services(options.services)
        .with_global_concurrency(options.global_concurrency);
    config.seed = options.seed;
    for policy in options.policies {
        config = config.with_policy(policy);
    }

    let client = options
        .client
        .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
    let resolver = EditionResolver::new(config, client);
    let progress = ProgressReporter::new(options.on_progress);

    let mut scratch = CacheDocument::new();
    let document = match options.cache_document {
        Some(document) => document,
        None => &mut scratch,
    };
    let resolution = resolver.resolve(&isbns, document, progress).await?;
    Ok(resolution.isbns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;
    use crate::service::ResolveFuture;
    use crate::ResultSet;
    use std::time::Duration;

    /// Answers from a fixed table without fetching.
    struct TableService {
        id: ServiceId,
        table: BTreeMap<Isbn, Result<ResultSet, ServiceError>>,
    }

    impl EditionService for TableService {
        fn id(&self) -> ServiceId {
            self.id
        }

        fn resolve<'a>(&'a self, isbn: &'a Isbn, _: &'a ServiceFetcher) -> ResolveFuture<'a> {
            let answer = self.table.get(isbn).cloned().unwrap_or_else(|| {
                let mut empty = ResultSet::new();
                empty.fault("not in table");
                Ok(empty)
            });
            Box::pin(async move { answer })
        }
    }

    fn isbn(value: &str) -> Isbn {
        Isbn::parse(value).expect("valid identifier")
    }

    fn found(values: &[&str]) -> Result<ResultSet, ServiceError> {
        let mut result = ResultSet::new();
        for value in values {
            result.add(isbn(value));
        }
        Ok(result)
    }

    fn resolver(adapters: Vec<Arc<dyn EditionService>>, services: Vec<ServiceId>) -> EditionResolver {
        let config = ResolverConfig::default()
            .with_services(services)
            .with_query_interval(Duration::ZERO)
            .with_seed(7);
        EditionResolver::with_adapters(config, Arc::new(ScriptedHttpClient::new()), adapters)
    }

    #[tokio::test]
    async fn no_enabled_services_is_an_error() {
        let resolver = resolver(default_adapters(), Vec::new());
        let error = resolver
            .resolve(&[isbn("A")], &mut CacheDocument::new(), ProgressReporter::default())
            .await
            .expect_err("nothing to query");
        assert!(matches!(error, EditionsError::NoServices));
    }

    #[tokio::test]
    async fn faulted_results_expire_and_clean_results_do_not() {
        let service = ServiceId::OpenLibrarySearch;
        let mut faulted = ResultSet::only(isbn("F2"));
        faulted.fault("page two failed");
        let adapter = TableService {
            id: service,
            table: BTreeMap::from([(isbn("C1"), found(&["C2"])), (isbn("F1"), Ok(faulted))]),
        };
        let resolver = resolver(vec![Arc::new(adapter)], vec![service]);
        let mut document = CacheDocument::new();

        resolver
            .resolve(
                &[isbn("C1"), isbn("F1")],
                &mut document,
                ProgressReporter::default(),
            )
            .await
            .expect("resolved");

        let entries = document[service.as_str()]
            .as_array()
            .cloned()
            .expect("exported entries");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].get("expires_at").is_none());
        assert!(entries[1]["expires_at"].is_string());
    }

    #[tokio::test]
    async fn other_service_errors_reject_without_failover() {
        let adapter = TableService {
            id: ServiceId::LibraryThingThingIsbn,
            table: BTreeMap::from([(
                isbn("A"),
                Err(ServiceError::internal("adapter bug")),
            )]),
        };
        let resolver = resolver(
            vec![Arc::new(adapter)],
            vec![ServiceId::LibraryThingThingIsbn],
        );
        let progress = ProgressReporter::default();

        let resolution = resolver
            .resolve(&[isbn("A")], &mut CacheDocument::new(), progress)
            .await
            .expect("degrades");

        assert_eq!(resolution.isbns, IsbnSet::from([isbn("A")]));
        assert_eq!(resolution.summary.rejections, 1);
    }

    #[tokio::test]
    async fn identifiers_a_cache_already_resolves_are_left_out_of_the_plan() {
        let service = ServiceId::LibraryThingThingIsbn;
        let adapter = TableService {
            id: service,
            table: BTreeMap::from([(isbn("C"), found(&["D"]))]),
        };
        let resolver = resolver(vec![Arc::new(adapter)], vec![service]);
        let mut document = CacheDocument::from([(
            String::from(service.as_str()),
            serde_json::json!([{ "argument": "A", "value": ["A", "B"] }]),
        )]);
        let plans = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = plans.clone();
        let progress = ProgressReporter::new(Some(Arc::new(move |event: &ProgressEvent| {
            if let ProgressEvent::QueryPlan { per_service } = event {
                sink.lock().expect("sink").push(per_service.clone());
            }
        })));

        let resolution = resolver
            .resolve(&[isbn("B"), isbn("C")], &mut document, progress)
            .await
            .expect("resolved");

        assert_eq!(resolution.isbns, IsbnSet::from([isbn("A"), isbn("B"), isbn("C"), isbn("D")]));
        let plans = plans.lock().expect("plans").clone();
        assert_eq!(plans, vec![BTreeMap::from([(service, IsbnSet::from([isbn("C")]))])]);
        let tally = &resolution.summary.services[&service];
        assert_eq!(tally.planned, 1);
        assert_eq!(tally.cache_hits, 1);
    }

    #[tokio::test]
    async fn rate_limited_service_fails_over_without_caching_the_refusal() {
        use crate::adapters::{OpenLibrarySearchAdapter, ThingIsbnAdapter};
        use crate::http_client::HttpResponse;

        let query = isbn("9780553380163");
        let search = OpenLibrarySearchAdapter::new("https://ol.test");
        let thing_isbn = ThingIsbnAdapter::new("https://lt.test");
        let client = Arc::new(
            ScriptedHttpClient::new()
                .respond_status(
                    search.search_url(&query),
                    HttpResponse::status(429, "Too Many Requests"),
                )
                .respond(
                    thing_isbn.lookup_url(&query),
                    "<idlist><isbn>9780553380163</isbn><isbn>9780553380255</isbn></idlist>",
                ),
        );
        let services = vec![ServiceId::OpenLibrarySearch, ServiceId::LibraryThingThingIsbn];
        let config = ResolverConfig::default()
            .with_services(services.clone())
            .with_query_interval(Duration::ZERO);
        let adapters: Vec<Arc<dyn EditionService>> =
            vec![Arc::new(search.clone()), Arc::new(thing_isbn.clone())];
        let resolver = EditionResolver::with_adapters(config, client.clone(), adapters);
        let progress = ProgressReporter::default();
        let token = CancellationToken::new();
        let run = Run {
            lanes: resolver
                .open_lanes(&services, &CacheDocument::new(), &progress, &token)
                .expect("lanes open"),
            limit: ConcurrencyLimit::new(1),
            progress: progress.clone(),
            token,
        };

        let editions = resolver
            .query(
                &run,
                Assignment {
                    isbn: query.clone(),
                    service: ServiceId::OpenLibrarySearch,
                    failover: vec![ServiceId::LibraryThingThingIsbn],
                },
            )
            .await;

        assert_eq!(editions, IsbnSet::from([query.clone(), isbn("9780553380255")]));
        assert_eq!(
            client.recorded_urls(),
            vec![search.search_url(&query), thing_isbn.lookup_url(&query)]
        );
        assert_eq!(progress.summary().rejections, 0);
        assert!(run.lanes[&ServiceId::OpenLibrarySearch].cache.raw().is_empty());
    }

    #[tokio::test]
    async fn seeded_plans_are_reproducible() {
        let services = ServiceId::ALL.to_vec();
        let inputs = ["A", "B", "C", "D", "E", "F"]
            .into_iter()
            .map(isbn)
            .collect::<IsbnSet>();

        let plan_for = |seed: u64| {
            let run = Run {
                lanes: BTreeMap::new(),
                limit: ConcurrencyLimit::new(1),
                progress: ProgressReporter::default(),
                token: CancellationToken::new(),
            };
            run.plan(&inputs, &services, &mut Rng::with_seed(seed))
                .assignments
                .into_iter()
                .map(|assignment| (assignment.service, assignment.failover))
                .collect::<Vec<_>>()
        };

        assert_eq!(plan_for(11), plan_for(11));
        for (service, failover) in plan_for(11) {
            assert_eq!(failover.len(), 2);
            assert!(!failover.contains(&service));
        }
    }
}
