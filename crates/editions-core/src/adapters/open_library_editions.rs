use serde::Deserialize;
use serde_json::Value;

use super::schema::{json_document, json_entry, Schema, Validated};
use super::{absolute_url, paginate, DEFAULT_MAX_PAGES, OPEN_LIBRARY_BASE_URL};
use crate::fetch::{FetchOutcome, ServiceFetcher};
use crate::service::ResolveFuture;
use crate::{EditionService, Isbn, ResultSet, ServiceError, ServiceId};

/// Open Library edition record, `/isbn/{isbn}.json`.
#[derive(Debug, Deserialize)]
struct EditionRecord {
    #[serde(default)]
    works: Vec<WorkRef>,
    #[serde(default)]
    isbn_10: Vec<String>,
    #[serde(default)]
    isbn_13: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WorkRef {
    key: String,
}

impl Schema for EditionRecord {
    fn validate(body: &str) -> Validated<Self> {
        json_document::<Self>(body).and_check(|record| {
            record
                .works
                .is_empty()
                .then(|| String::from("edition record names no works"))
        })
    }
}

/// One page of `{work}/editions.json`.
#[derive(Debug, Deserialize)]
struct EditionsPage {
    entries: Vec<Value>,
    #[serde(default)]
    links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

impl Schema for EditionsPage {
    fn validate(body: &str) -> Validated<Self> {
        json_document(body)
    }
}

#[derive(Debug, Deserialize)]
struct EditionEntry {
    #[serde(default)]
    isbn_10: Vec<String>,
    #[serde(default)]
    isbn_13: Vec<String>,
}

/// Editions of the works an ISBN belongs to, from Open Library.
///
/// Looks up the edition record for the ISBN, then pages through the edition
/// listing of every work the record names.
#[derive(Debug, Clone)]
pub struct OpenLibraryEditionsAdapter {
    base_url: String,
    max_pages: usize,
}

impl Default for OpenLibraryEditionsAdapter {
    fn default() -> Self {
        Self::new(OPEN_LIBRARY_BASE_URL)
    }
}

impl OpenLibraryEditionsAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Page cap per work.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// URL of the edition record for `isbn`.
    pub fn record_url(&self, isbn: &Isbn) -> String {
        format!("{}/isbn/{}.json", self.base_url, isbn.as_str())
    }

    /// URL of the first edition listing page of `work_key` (`/works/OL…W`).
    pub fn editions_url(&self, work_key: &str) -> String {
        absolute_url(&self.base_url, &format!("{work_key}/editions.json"))
    }

    async fn resolve_isbn(
        &self,
        isbn: &Isbn,
        fetcher: &ServiceFetcher,
    ) -> Result<ResultSet, ServiceError> {
        let mut result = ResultSet::new();
        let record_url = self.record_url(isbn);

        let body = match fetcher.get_entry_text(&record_url).await? {
            FetchOutcome::Body(body) => body,
            failed => {
                let message = failed.failure_message().unwrap_or_default();
                result.fault_at(&record_url, message);
                return Ok(result);
            }
        };

        let record = match EditionRecord::validate(&body) {
            Validated::Valid(record) => record,
            Validated::Invalid(reason) => {
                result.fault_at(&record_url, reason);
                return Ok(result);
            }
        };

        for reported in record.isbn_10.iter().chain(&record.isbn_13) {
            result.add_reported(reported);
        }

        for work in &record.works {
            let editions_url = self.editions_url(&work.key);
            let listing = paginate(fetcher, editions_url.clone(), self.max_pages, |body| {
                self.parse_page(body)
            })
            .await;
            match listing {
                Ok(listing) => result.merge(listing),
                Err(error) => {
                    result.fault_at(&editions_url, format!("editions listing failed: {error}"));
                }
            }
        }

        if result.is_empty() && !result.is_faulted() {
            result.fault(format!("no editions found for {isbn}"));
        }
        Ok(result)
    }

    fn parse_page(&self, body: &str) -> ResultSet {
        let mut page = ResultSet::new();
        let listing = match EditionsPage::validate(body) {
            Validated::Valid(listing) => listing,
            Validated::Invalid(reason) => {
                page.fault(reason);
                return page;
            }
        };

        for (index, entry) in listing.entries.into_iter().enumerate() {
            match json_entry::<EditionEntry>(entry) {
                Validated::Valid(entry) => {
                    for reported in entry.isbn_10.iter().chain(&entry.isbn_13) {
                        page.add_reported(reported);
                    }
                }
                Validated::Invalid(reason) => page.warn(format!("entry {index}: {reason}")),
            }
        }
        page.continuation = listing
            .links
            .next
            .map(|next| absolute_url(&self.base_url, &next));
        page
    }
}

impl EditionService for OpenLibraryEditionsAdapter {
    fn id(&self) -> ServiceId {
        ServiceId::OpenLibraryWorkEditions
    }

    fn resolve<'a>(&'a self, isbn: &'a Isbn, fetcher: &'a ServiceFetcher) -> ResolveFuture<'a> {
        Box::pin(async move { self.resolve_isbn(isbn, fetcher).await })
    }
}
