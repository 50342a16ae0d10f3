use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::schema::{Schema, Validated};
use super::LIBRARY_THING_BASE_URL;
use crate::fetch::{FetchOutcome, ServiceFetcher};
use crate::service::ResolveFuture;
use crate::{EditionService, Isbn, ResultSet, ServiceError, ServiceId};

macro_rules! selector {
    ($name:ident, $css:literal) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(ID_LIST, "idlist");
selector!(ID_LIST_ISBN, "idlist > isbn");

/// ThingISBN response, `<idlist><isbn>…</isbn>…</idlist>`.
#[derive(Debug)]
struct IdList(Vec<String>);

impl Schema for IdList {
    fn validate(body: &str) -> Validated<Self> {
        let document = Html::parse_document(body);
        if document.select(&ID_LIST).next().is_none() {
            return Validated::Invalid(String::from("response has no idlist element"));
        }
        let isbns = document
            .select(&ID_LIST_ISBN)
            .map(|element| element.text().collect::<String>().trim().to_owned())
            .collect::<Vec<_>>();
        if isbns.is_empty() {
            return Validated::Invalid(String::from("idlist is empty"));
        }
        Validated::Valid(Self(isbns))
    }
}

/// Editions grouped under one work by LibraryThing.
#[derive(Debug, Clone)]
pub struct ThingIsbnAdapter {
    base_url: String,
}

impl Default for ThingIsbnAdapter {
    fn default() -> Self {
        Self::new(LIBRARY_THING_BASE_URL)
    }
}

impl ThingIsbnAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn lookup_url(&self, isbn: &Isbn) -> String {
        format!("{}/api/thingISBN/{}", self.base_url, isbn.as_str())
    }

    async fn resolve_isbn(
        &self,
        isbn: &Isbn,
        fetcher: &ServiceFetcher,
    ) -> Result<ResultSet, ServiceError> {
        let mut result = ResultSet::new();
        let url = self.lookup_url(isbn);

        let body = match fetcher.get_entry_text(&url).await? {
            FetchOutcome::Body(body) => body,
            failed => {
                let message = failed.failure_message().unwrap_or_default();
                result.fault_at(&url, message);
                return Ok(result);
            }
        };

        match IdList::validate(&body) {
            Validated::Valid(IdList(isbns)) => {
                for reported in &isbns {
                    if reported.is_empty() {
                        result.warn("empty isbn element");
                    } else {
                        result.add_reported(reported);
                    }
                }
            }
            Validated::Invalid(reason) => result.fault_at(&url, reason),
        }
        Ok(result)
    }
}

impl EditionService for ThingIsbnAdapter {
    fn id(&self) -> ServiceId {
        ServiceId::LibraryThingThingIsbn
    }

    fn resolve<'a>(&'a self, isbn: &'a Isbn, fetcher: &'a ServiceFetcher) -> ResolveFuture<'a> {
        Box::pin(async move { self.resolve_isbn(isbn, fetcher).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use crate::progress::ProgressReporter;

    const URL: &str = "https://lt.test/api/thingISBN/0441172717";

    fn fetcher(client: ScriptedHttpClient) -> ServiceFetcher {
        let service = ServiceId::LibraryThingThingIsbn;
        ServiceFetcher::new(
            service,
            Arc::new(client),
            Arc::new(CircuitBreaker::new(service, CircuitBreakerConfig::default())),
            ProgressReporter::default(),
        )
    }

    fn isbn(value: &str) -> Isbn {
        Isbn::parse(value).expect("valid identifier")
    }

    async fn resolve(client: ScriptedHttpClient) -> ResultSet {
        ThingIsbnAdapter::new("https://lt.test")
            .resolve(&isbn("0441172717"), &fetcher(client))
            .await
            .expect("resolved")
    }

    #[tokio::test]
    async fn reads_every_isbn_in_the_idlist() {
        let client = ScriptedHttpClient::new().respond(
            URL,
            r#"<?xml version="1.0" encoding="utf-8"?>
<idlist><isbn>0441172717</isbn><isbn>0340960191</isbn><isbn>044100590X</isbn></idlist>"#,
        );

        let result = resolve(client).await;
        let expected = ["0441172717", "0340960191", "044100590X"]
            .into_iter()
            .map(isbn)
            .collect();
        assert_eq!(result.isbns, expected);
        assert!(!result.is_faulted());
    }

    #[tokio::test]
    async fn empty_idlist_is_a_fault() {
        let client = ScriptedHttpClient::new().respond(URL, "<idlist></idlist>");

        let result = resolve(client).await;
        assert!(result.is_empty());
        assert_eq!(result.faults[0].message, "idlist is empty");
    }

    #[tokio::test]
    async fn unrecognised_document_is_a_fault() {
        let client = ScriptedHttpClient::new().respond(URL, "<error>unknown id</error>");

        let result = resolve(client).await;
        assert!(result.is_empty());
        assert_eq!(result.faults.len(), 1);
        assert_eq!(result.faults[0].url.as_deref(), Some(URL));
    }

    #[tokio::test]
    async fn unavailable_status_is_a_fault() {
        let client = ScriptedHttpClient::new()
            .respond_status(URL, HttpResponse::status(503, "Service Unavailable"));

        let result = resolve(client).await;
        assert!(result.is_empty());
        assert_eq!(result.faults[0].message, "HTTP 503 Service Unavailable");
    }

    #[tokio::test]
    async fn unparseable_entries_become_warnings() {
        let client = ScriptedHttpClient::new()
            .respond(URL, "<idlist><isbn>0441172717</isbn><isbn>n/a</isbn></idlist>");

        let result = resolve(client).await;
        assert_eq!(result.isbns.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }
}
