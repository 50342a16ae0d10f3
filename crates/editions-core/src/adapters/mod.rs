//! Service adapters.
//!
//! | Adapter | Service | Response |
//! |---------|---------|----------|
//! | [`OpenLibraryEditionsAdapter`] | Open Library work editions | JSON, paginated |
//! | [`OpenLibrarySearchAdapter`] | Open Library search | JSON, paginated |
//! | [`ThingIsbnAdapter`] | LibraryThing ThingISBN | XML |

mod open_library_editions;
mod open_library_search;
pub mod schema;
mod thing_isbn;

use std::sync::Arc;

use tracing::debug;

pub use open_library_editions::OpenLibraryEditionsAdapter;
pub use open_library_search::OpenLibrarySearchAdapter;
pub use thing_isbn::ThingIsbnAdapter;

use crate::fetch::{FetchOutcome, ServiceFetcher};
use crate::{EditionService, ResultSet, ServiceError};

pub(crate) const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";
pub(crate) const LIBRARY_THING_BASE_URL: &str = "https://www.librarything.com";

/// Default page cap for paginated services.
pub const DEFAULT_MAX_PAGES: usize = 20;

/// One adapter per known service, pointed at the public endpoints.
pub fn default_adapters() -> Vec<Arc<dyn EditionService>> {
    vec![
        Arc::new(OpenLibraryEditionsAdapter::default()),
        Arc::new(OpenLibrarySearchAdapter::default()),
        Arc::new(ThingIsbnAdapter::default()),
    ]
}

/// Fetch `first_url` and every continuation page after it.
///
/// `parse_page` turns one body into a [`ResultSet`] whose `continuation`
/// names the next page's URL. A transport failure or a 429 on the first page
/// is an error; on a later page it becomes a fault and ends the traversal with
/// what was gathered so far. Any other non-success status is a fault.
pub(crate) async fn paginate(
    fetcher: &ServiceFetcher,
    first_url: String,
    max_pages: usize,
    parse_page: impl Fn(&str) -> ResultSet,
) -> Result<ResultSet, ServiceError> {
    let mut gathered = ResultSet::new();
    let mut next = Some(first_url);
    let mut pages = 0_usize;

    while let Some(url) = next.take() {
        if pages >= max_pages {
            gathered.warn(format!(
                "stopped after {max_pages} pages; remaining editions were not fetched"
            ));
            break;
        }
        pages += 1;

        let fetched = if pages == 1 {
            fetcher.get_entry_text(&url).await
        } else {
            fetcher.get_text(&url).await
        };
        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(error) if pages > 1 => {
                gathered.fault_at(&url, format!("continuation page failed: {error}"));
                break;
            }
            Err(error) => return Err(error),
        };

        let body = match outcome {
            FetchOutcome::Body(body) => body,
            failed => {
                let message = failed.failure_message().unwrap_or_default();
                gathered.fault_at(&url, message);
                break;
            }
        };

        let page = parse_page(&body);
        debug!(
            service = %fetcher.service(),
            url,
            found = page.isbns.len(),
            more = page.continuation.is_some(),
            "parsed page"
        );
        gathered.merge(page);
        next = gathered.continuation.take();
    }

    Ok(gathered)
}

/// Resolve a possibly relative continuation link against `base_url`.
pub(crate) fn absolute_url(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_owned()
    } else if link.starts_with('/') {
        format!("{base_url}{link}")
    } else {
        format!("{base_url}/{link}")
    }
}
