use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use super::memo::{ExportedEntry, LookupFn, MemoCache};
use crate::Isbn;

type IsbnSet = BTreeSet<Isbn>;

/// Edition cache whose keys are equivalence classes of identifiers.
///
/// Raw resolutions are memoized per canonical identifier. Every resolution is
/// then closed over what is already known: the queried identifier, everything
/// the service reported, and every class already recorded for any of those
/// identifiers are unioned, and the union is recorded under each member. Any
/// two identifiers that ever land in one class therefore answer with the
/// same, identical set.
///
/// The union table lives only as long as the raw entries behind it. Once the
/// earliest of them expires, the table is rebuilt from the entries still
/// fresh, so an expired resolution is never answered through its class.
///
/// Only the raw cache is exported; the union table is rebuilt on load.
pub struct EquivalenceCache<E> {
    raw: MemoCache<Isbn, IsbnSet, E>,
    unions: Arc<Mutex<Unions>>,
}

#[derive(Default)]
struct Unions {
    classes: HashMap<Isbn, Arc<IsbnSet>>,
    /// Classes merged in through `absorb`, replayed on every rebuild.
    absorbed: Vec<IsbnSet>,
    /// Earliest expiry among the raw entries behind `classes`.
    expires_at: Option<OffsetDateTime>,
}

impl Unions {
    fn is_stale(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Union of `seed`, `reported` and every class recorded for any of them.
    fn union_of(&self, seed: Option<&Isbn>, reported: &IsbnSet) -> IsbnSet {
        let mut frontier = seed
            .into_iter()
            .cloned()
            .chain(reported.iter().map(Isbn::canonical))
            .collect::<Vec<_>>();
        let mut class = IsbnSet::new();
        while let Some(isbn) = frontier.pop() {
            if !class.insert(isbn.clone()) {
                continue;
            }
            if let Some(existing) = self.classes.get(&isbn) {
                frontier.extend(
                    existing
                        .iter()
                        .filter(|member| !class.contains(*member))
                        .cloned(),
                );
            }
        }
        class
    }

    fn record(&mut self, class: &IsbnSet, expires_at: Option<OffsetDateTime>) {
        let shared = Arc::new(class.clone());
        for member in class {
            self.classes.insert(member.clone(), shared.clone());
        }
        self.expires_at = match (self.expires_at, expires_at) {
            (Some(current), Some(new)) => Some(current.min(new)),
            (current, new) => current.or(new),
        };
    }
}

impl<E> Clone for EquivalenceCache<E> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            unions: self.unions.clone(),
        }
    }
}

impl<E> EquivalenceCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new(lookup: LookupFn<Isbn, IsbnSet, E>) -> Self {
        Self::from_raw(MemoCache::new(lookup))
    }

    /// Restore from a previous [`export`](Self::export). `None` starts empty.
    pub fn from_export(
        lookup: LookupFn<Isbn, IsbnSet, E>,
        exported: Option<&Value>,
    ) -> Result<Self, serde_json::Error> {
        let entries: Vec<ExportedEntry<Isbn, IsbnSet>> = match exported {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        Ok(Self::from_raw(MemoCache::with_entries(lookup, entries)))
    }

    fn from_raw(raw: MemoCache<Isbn, IsbnSet, E>) -> Self {
        let cache = Self {
            raw,
            unions: Arc::default(),
        };
        cache.rebuild(&mut cache.lock_unions());
        cache
    }

    /// Editions of `isbn`, querying the service only when neither the union
    /// table nor the raw cache knows it.
    pub async fn call(&self, isbn: &Isbn) -> Result<IsbnSet, E> {
        let key = isbn.canonical();
        if let Some(known) = self.union_for(&key) {
            return Ok(known);
        }
        let reported = self.raw.call(key.clone()).await?;
        match self.raw.entry_at(&key, OffsetDateTime::now_utc()) {
            Some(entry) => Ok(self.close_over(Some(&key), &reported, entry.expires_at)),
            // Not cached by the lookup, so not recorded either.
            None => Ok(self
                .unions_at(OffsetDateTime::now_utc())
                .union_of(Some(&key), &reported)),
        }
    }

    /// Cached editions of `isbn`, without querying.
    pub fn check_cache(&self, isbn: &Isbn) -> Option<IsbnSet> {
        let key = isbn.canonical();
        if let Some(known) = self.union_for(&key) {
            return Some(known);
        }
        let entry = self.raw.entry_at(&key, OffsetDateTime::now_utc())?;
        Some(self.close_over(Some(&key), &entry.value, entry.expires_at))
    }

    /// Merge a class discovered elsewhere into the union table. The raw cache,
    /// and so the persisted form, is untouched. Absorbed classes last as long
    /// as this cache.
    pub fn absorb(&self, isbns: &IsbnSet) -> IsbnSet {
        let mut unions = self.unions_at(OffsetDateTime::now_utc());
        unions.absorbed.push(isbns.clone());
        let class = unions.union_of(None, isbns);
        unions.record(&class, None);
        class
    }

    /// Raw cache as JSON, sorted by identifier.
    pub fn export(&self) -> Result<Value, serde_json::Error> {
        let mut entries = self.raw.export_cache();
        entries.sort_by(|left, right| left.argument.cmp(&right.argument));
        serde_json::to_value(entries)
    }

    pub fn raw(&self) -> &MemoCache<Isbn, IsbnSet, E> {
        &self.raw
    }

    /// Number of identifiers with a recorded class.
    pub fn known_identifiers(&self) -> usize {
        self.unions_at(OffsetDateTime::now_utc()).classes.len()
    }

    fn union_for(&self, key: &Isbn) -> Option<IsbnSet> {
        self.unions_at(OffsetDateTime::now_utc())
            .classes
            .get(key)
            .map(|members| members.as_ref().clone())
    }

    /// Union `seed`, `reported` and every class already recorded for any of
    /// them, then record the result under each member. Runs under one lock,
    /// recomputing from current state, so racing writers cannot split a class.
    fn close_over(
        &self,
        seed: Option<&Isbn>,
        reported: &IsbnSet,
        expires_at: Option<OffsetDateTime>,
    ) -> IsbnSet {
        let mut unions = self.unions_at(OffsetDateTime::now_utc());
        let class = unions.union_of(seed, reported);
        unions.record(&class, expires_at);
        class
    }

    /// The union table, rebuilt first if a raw entry behind it has expired.
    fn unions_at(&self, now: OffsetDateTime) -> MutexGuard<'_, Unions> {
        let mut unions = self.lock_unions();
        if unions.is_stale(now) {
            debug!(known = unions.classes.len(), "cached edition class expired, rebuilding");
            self.rebuild(&mut unions);
        }
        unions
    }

    /// Recompute every class from the fresh raw entries and the absorbed
    /// classes. Lock order is union table, then raw cache.
    fn rebuild(&self, unions: &mut Unions) {
        unions.classes.clear();
        unions.expires_at = None;
        for entry in self.raw.export_cache() {
            let class = unions.union_of(Some(&entry.argument), &entry.value);
            unions.record(&class, entry.expires_at);
        }
        for absorbed in std::mem::take(&mut unions.absorbed) {
            let class = unions.union_of(None, &absorbed);
            unions.record(&class, None);
            unions.absorbed.push(absorbed);
        }
    }

    fn lock_unions(&self) -> MutexGuard<'_, Unions> {
        self.unions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
