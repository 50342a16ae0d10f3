use serde::Deserialize;
use serde_json::Value;

use super::schema::{json_document, json_entry, Schema, Validated};
use super::{paginate, DEFAULT_MAX_PAGES, OPEN_LIBRARY_BASE_URL};
use crate::fetch::ServiceFetcher;
use crate::service::ResolveFuture;
use crate::{EditionService, Isbn, ResultSet, ServiceError, ServiceId};

/// One page of `/search.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    num_found: u64,
    #[serde(default)]
    start: u64,
    docs: Vec<Value>,
}

impl Schema for SearchPage {
    fn validate(body: &str) -> Validated<Self> {
        json_document(body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    isbn: Vec<String>,
}

/// Editions reported by an Open Library search for `isbn:{isbn}`.
///
/// Every matching work document lists the ISBNs of all its editions.
#[derive(Debug, Clone)]
pub struct OpenLibrarySearchAdapter {
    base_url: String,
    max_pages: usize,
}

impl Default for OpenLibrarySearchAdapter {
    fn default() -> Self {
        Self::new(OPEN_LIBRARY_BASE_URL)
    }
}

impl OpenLibrarySearchAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// URL of the first search page for `isbn`.
    pub fn search_url(&self, isbn: &Isbn) -> String {
        format!(
            "{}/search.json?q={}&fields=isbn",
            self.base_url,
            urlencoding::encode(&format!("isbn:{}", isbn.as_str()))
        )
    }

    async fn resolve_isbn(
        &self,
        isbn: &Isbn,
        fetcher: &ServiceFetcher,
    ) -> Result<ResultSet, ServiceError> {
        let first_url = self.search_url(isbn);
        let mut result = paginate(fetcher, first_url.clone(), self.max_pages, |body| {
            parse_page(&first_url, body)
        })
        .await?;

        if result.is_empty() && !result.is_faulted() {
            result.fault(format!("search found no editions for {isbn}"));
        }
        Ok(result)
    }
}

fn parse_page(first_url: &str, body: &str) -> ResultSet {
    let mut page = ResultSet::new();
    let search = match SearchPage::validate(body) {
        Validated::Valid(search) => search,
        Validated::Invalid(reason) => {
            page.fault(reason);
            return page;
        }
    };

    let seen = search.start + search.docs.len() as u64;
    let more = !search.docs.is_empty() && seen < search.num_found;

    for (index, doc) in search.docs.into_iter().enumerate() {
        match json_entry::<SearchDoc>(doc) {
            Validated::Valid(doc) => {
                for reported in &doc.isbn {
                    page.add_reported(reported);
                }
            }
            Validated::Invalid(reason) => page.warn(format!("doc {index}: {reason}")),
        }
    }
    if more {
        page.continuation = Some(format!("{first_url}&offset={seen}"));
    }
    page
}

impl EditionService for OpenLibrarySearchAdapter {
    fn id(&self) -> ServiceId {
        ServiceId::OpenLibrarySearch
    }

    fn resolve<'a>(&'a self, isbn: &'a Isbn, fetcher: &'a ServiceFetcher) -> ResolveFuture<'a> {
        Box::pin(async move { self.resolve_isbn(isbn, fetcher).await })
    }
}
