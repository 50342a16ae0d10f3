use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Isbn;

/// A diagnostic record attached to a query.
///
/// Warnings are local, recoverable parse issues. Faults make the whole
/// per-identifier query unreliable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Identifiers found by one service query, with its diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub isbns: BTreeSet<Isbn>,
    pub warnings: Vec<Diagnostic>,
    pub faults: Vec<Diagnostic>,
    /// Where the next page of this response lives, if it has one.
    pub continuation: Option<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result set holding only the queried identifier.
    pub fn only(isbn: Isbn) -> Self {
        let mut set = Self::new();
        set.isbns.insert(isbn);
        set
    }

    pub fn add(&mut self, isbn: Isbn) {
        self.isbns.insert(isbn);
    }

    /// Normalize and add an identifier reported by a service. Values that do
    /// not normalize become warnings.
    pub fn add_reported(&mut self, raw: &str) {
        match Isbn::parse(raw) {
            Ok(isbn) => self.add(isbn),
            Err(error) => self.warn(format!("ignored identifier '{raw}': {error}")),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(Diagnostic::new(message));
    }

    pub fn fault(&mut self, message: impl Into<String>) {
        self.faults.push(Diagnostic::new(message));
    }

    pub fn fault_at(&mut self, url: &str, message: impl Into<String>) {
        self.faults.push(Diagnostic::new(message).with_url(url));
    }

    /// Fold another page or sub-query into this one. The continuation is taken
    /// from `other`.
    pub fn merge(&mut self, other: ResultSet) {
        self.isbns.extend(other.isbns);
        self.warnings.extend(other.warnings);
        self.faults.extend(other.faults);
        self.continuation = other.continuation;
    }

    pub fn is_faulted(&self) -> bool {
        !self.faults.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.isbns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_identifiers_are_normalized_and_deduplicated() {
        let mut set = ResultSet::new();
        set.add_reported("0-441-17271-7");
        set.add_reported("0441172717");
        set.add_reported("???");

        assert_eq!(set.isbns.len(), 1);
        assert_eq!(set.warnings.len(), 1);
        assert!(!set.is_faulted());
    }

    #[test]
    fn merge_accumulates_diagnostics_and_takes_continuation() {
        let mut first = ResultSet::only(Isbn::parse("A").expect("valid"));
        first.fault("page one failed");
        first.continuation = Some(String::from("page-2"));

        let mut second = ResultSet::only(Isbn::parse("B").expect("valid"));
        second.warn("odd entry");

        first.merge(second);
        assert_eq!(first.isbns.len(), 2);
        assert_eq!(first.faults.len(), 1);
        assert_eq!(first.warnings.len(), 1);
        assert_eq!(first.continuation, None);
    }
}
