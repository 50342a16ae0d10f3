use std::sync::Arc;

use editions_core::{
    CircuitBreaker, CircuitBreakerConfig, EditionService, HttpResponse, Isbn,
    OpenLibraryEditionsAdapter, OpenLibrarySearchAdapter, ProgressReporter, ScriptedHttpClient,
    ServiceErrorKind, ServiceFetcher, ServiceId, ThingIsbnAdapter,
};

const QUERY: &str = "9780553380163";
const EDITION_13: &str = "9780553380255";
const EDITION_10: &str = "0553380168";

#[derive(Clone)]
struct ServiceCase {
    id: ServiceId,
    service: Arc<dyn EditionService>,
    /// First URL the adapter fetches for [`QUERY`].
    entry_url: String,
    /// A complete, valid exchange reporting both editions.
    routes: Vec<(String, String)>,
}

fn service_cases() -> Vec<ServiceCase> {
    let editions = OpenLibraryEditionsAdapter::new("https://ol.test");
    let search = OpenLibrarySearchAdapter::new("https://ol.test");
    let thing_isbn = ThingIsbnAdapter::new("https://lt.test");
    let query = Isbn::parse(QUERY).expect("valid query");

    vec![
        ServiceCase {
            id: ServiceId::OpenLibraryWorkEditions,
            entry_url: editions.record_url(&query),
            routes: vec![
                (
                    editions.record_url(&query),
                    String::from(r#"{"works": [{"key": "/works/OL27448W"}]}"#),
                ),
                (
                    editions.editions_url("/works/OL27448W"),
                    format!(
                        r#"{{"entries": [{{"isbn_13": ["{EDITION_13}"]}}, {{"isbn_10": ["{EDITION_10}"]}}]}}"#
                    ),
                ),
            ],
            service: Arc::new(editions),
        },
        ServiceCase {
            id: ServiceId::OpenLibrarySearch,
            entry_url: search.search_url(&query),
            routes: vec![(
                search.search_url(&query),
                format!(
                    r#"{{"numFound": 1, "start": 0, "docs": [{{"isbn": ["{EDITION_13}", "{EDITION_10}"]}}]}}"#
                ),
            )],
            service: Arc::new(search),
        },
        ServiceCase {
            id: ServiceId::LibraryThingThingIsbn,
            entry_url: thing_isbn.lookup_url(&query),
            routes: vec![(
                thing_isbn.lookup_url(&query),
                format!("<idlist><isbn>{EDITION_13}</isbn><isbn>{EDITION_10}</isbn></idlist>"),
            )],
            service: Arc::new(thing_isbn),
        },
    ]
}

fn fetcher(id: ServiceId, client: ScriptedHttpClient) -> ServiceFetcher {
    ServiceFetcher::new(
        id,
        Arc::new(client),
        Arc::new(CircuitBreaker::new(id, CircuitBreakerConfig::default())),
        ProgressReporter::default(),
    )
}

fn query() -> Isbn {
    Isbn::parse(QUERY).expect("valid query")
}

#[tokio::test]
async fn adapters_report_their_own_service() {
    for case in service_cases() {
        assert_eq!(case.service.id(), case.id, "adapter for '{}'", case.id);
    }
}

#[tokio::test]
async fn valid_responses_yield_normalized_editions_without_diagnostics() {
    for case in service_cases() {
        let client = case
            .routes
            .iter()
            .fold(ScriptedHttpClient::new(), |client, (url, body)| {
                client.respond(url.clone(), body.clone())
            });

        let result = case
            .service
            .resolve(&query(), &fetcher(case.id, client))
            .await
            .unwrap_or_else(|error| panic!("service '{}' failed: {error}", case.id));

        assert!(
            result.isbns.contains(&Isbn::parse(EDITION_13).expect("valid")),
            "service '{}': ISBN-13 edition",
            case.id
        );
        assert!(
            result.isbns.contains(&Isbn::parse(EDITION_10).expect("valid")),
            "service '{}': ISBN-10 edition",
            case.id
        );
        assert!(result.faults.is_empty(), "service '{}': faults", case.id);
        assert!(result.warnings.is_empty(), "service '{}': warnings", case.id);
    }
}

#[tokio::test]
async fn malformed_top_level_response_is_one_fault_and_no_editions() {
    for case in service_cases() {
        let client = ScriptedHttpClient::new().respond(case.entry_url.clone(), "%%garbage%%");

        let result = case
            .service
            .resolve(&query(), &fetcher(case.id, client))
            .await
            .unwrap_or_else(|error| panic!("service '{}' failed: {error}", case.id));

        assert!(result.isbns.is_empty(), "service '{}': editions", case.id);
        assert_eq!(result.faults.len(), 1, "service '{}': faults", case.id);
    }
}

#[tokio::test]
async fn non_success_status_is_a_fault_not_an_error() {
    for case in service_cases() {
        let client = ScriptedHttpClient::new().respond_status(
            case.entry_url.clone(),
            HttpResponse::status(503, "Service Unavailable"),
        );

        let result = case
            .service
            .resolve(&query(), &fetcher(case.id, client))
            .await
            .unwrap_or_else(|error| panic!("service '{}' failed: {error}", case.id));

        assert!(result.isbns.is_empty(), "service '{}': editions", case.id);
        assert_eq!(
            result.faults[0].message,
            "HTTP 503 Service Unavailable",
            "service '{}': fault message",
            case.id
        );
    }
}

#[tokio::test]
async fn too_many_requests_on_the_first_request_is_a_rate_limited_error() {
    for case in service_cases() {
        let client = ScriptedHttpClient::new().respond_status(
            case.entry_url.clone(),
            HttpResponse::status(429, "Too Many Requests").with_retry_after("60"),
        );

        let error = case
            .service
            .resolve(&query(), &fetcher(case.id, client))
            .await
            .expect_err("rate limit propagates");

        assert_eq!(
            error.kind(),
            ServiceErrorKind::RateLimited,
            "service '{}': error kind",
            case.id
        );
        assert!(
            error.message().contains("retry after 60"),
            "service '{}': message",
            case.id
        );
    }
}

#[tokio::test]
async fn transport_failure_on_the_first_request_is_an_unavailable_error() {
    for case in service_cases() {
        let client = ScriptedHttpClient::new().fail(case.entry_url.clone(), "connection reset");

        let error = case
            .service
            .resolve(&query(), &fetcher(case.id, client))
            .await
            .expect_err("transport failure propagates");

        assert_eq!(
            error.kind(),
            ServiceErrorKind::Unavailable,
            "service '{}': error kind",
            case.id
        );
        assert!(error.retryable(), "service '{}': retryable", case.id);
    }
}

#[tokio::test]
async fn open_circuit_refuses_to_fetch() {
    for case in service_cases() {
        let client = Arc::new(ScriptedHttpClient::new());
        let breaker = Arc::new(CircuitBreaker::new(
            case.id,
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        ));
        breaker.record_failure();
        let fetcher = ServiceFetcher::new(
            case.id,
            client.clone(),
            breaker,
            ProgressReporter::default(),
        );

        let error = case
            .service
            .resolve(&query(), &fetcher)
            .await
            .expect_err("circuit is open");

        assert_eq!(error.kind(), ServiceErrorKind::Unavailable);
        assert_eq!(client.request_count(), 0, "service '{}': fetches", case.id);
    }
}
