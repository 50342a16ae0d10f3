use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How long a resolution stays cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    /// Cached until this instant; a miss from then on.
    At(OffsetDateTime),
    DoNotCache,
}

impl Expiry {
    /// Expire `ttl` from now.
    pub fn after(ttl: Duration) -> Self {
        Self::At(OffsetDateTime::now_utc() + ttl)
    }
}

/// A resolution together with the expiry the lookup chose for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V> {
    pub value: V,
    pub expiry: Expiry,
}

impl<V> Lookup<V> {
    pub fn forever(value: V) -> Self {
        Self {
            value,
            expiry: Expiry::Never,
        }
    }

    pub fn until(value: V, instant: OffsetDateTime) -> Self {
        Self {
            value,
            expiry: Expiry::At(instant),
        }
    }

    pub fn uncached(value: V) -> Self {
        Self {
            value,
            expiry: Expiry::DoNotCache,
        }
    }
}

pub type LookupFuture<V, E> = BoxFuture<'static, Result<Lookup<V>, E>>;

/// The single-argument asynchronous lookup a [`MemoCache`] wraps.
pub type LookupFn<A, V, E> = Arc<dyn Fn(A) -> LookupFuture<V, E> + Send + Sync>;

/// One exported `(argument, resolution)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEntry<A, V> {
    pub argument: A,
    pub value: V,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
struct CachedValue<V> {
    value: V,
    expires_at: Option<OffsetDateTime>,
}

impl<V> CachedValue<V> {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

struct MemoState<A, V, E> {
    entries: HashMap<A, CachedValue<V>>,
    pending: HashMap<A, Shared<LookupFuture<V, E>>>,
}

/// Memoizing cache over an asynchronous lookup.
///
/// Concurrent calls for the same argument share one in-flight lookup. A
/// failed lookup is not cached and reaches every waiter; the next call
/// retries. Cloning the cache shares its state.
pub struct MemoCache<A, V, E> {
    lookup: LookupFn<A, V, E>,
    state: Arc<Mutex<MemoState<A, V, E>>>,
}

impl<A, V, E> Clone for MemoCache<A, V, E> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A, V, E> MemoCache<A, V, E>
where
    A: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(lookup: LookupFn<A, V, E>) -> Self {
        Self {
            lookup,
            state: Arc::new(Mutex::new(MemoState {
                entries: HashMap::new(),
                pending: HashMap::new(),
            })),
        }
    }

    /// Pre-populate from a previous [`export_cache`](Self::export_cache).
    /// Entries that have expired since are dropped.
    pub fn with_entries(lookup: LookupFn<A, V, E>, entries: Vec<ExportedEntry<A, V>>) -> Self {
        let cache = Self::new(lookup);
        let now = OffsetDateTime::now_utc();
        {
            let mut state = cache.lock();
            for entry in entries {
                let cached = CachedValue {
                    value: entry.value,
                    expires_at: entry.expires_at,
                };
                if cached.is_fresh(now) {
                    state.entries.insert(entry.argument, cached);
                }
            }
        }
        cache
    }

    /// Pre-populate from a marshalled export, converting each pair back.
    pub fn with_marshalled_entries<MA, MV, X>(
        lookup: LookupFn<A, V, E>,
        entries: Vec<ExportedEntry<MA, MV>>,
        unmarshal_argument: impl Fn(MA) -> Result<A, X>,
        unmarshal_value: impl Fn(MV) -> Result<V, X>,
    ) -> Result<Self, X> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                Ok(ExportedEntry {
                    argument: unmarshal_argument(entry.argument)?,
                    value: unmarshal_value(entry.value)?,
                    expires_at: entry.expires_at,
                })
            })
            .collect::<Result<Vec<_>, X>>()?;
        Ok(Self::with_entries(lookup, entries))
    }

    /// Resolve `argument`, from cache when possible.
    pub async fn call(&self, argument: A) -> Result<V, E> {
        let in_flight = {
            let mut state = self.lock();
            if let Some(cached) = state.entries.get(&argument) {
                if cached.is_fresh(OffsetDateTime::now_utc()) {
                    return Ok(cached.value.clone());
                }
            }
            match state.pending.get(&argument) {
                Some(pending) => pending.clone(),
                None => {
                    let started = (self.lookup)(argument.clone()).shared();
                    state.pending.insert(argument.clone(), started.clone());
                    started
                }
            }
        };

        let outcome = in_flight.clone().await;

        // Whichever waiter settles first records the outcome.
        let mut state = self.lock();
        let settles = state
            .pending
            .get(&argument)
            .is_some_and(|pending| pending.ptr_eq(&in_flight));
        if settles {
            state.pending.remove(&argument);
            if let Ok(lookup) = &outcome {
                let expires_at = match lookup.expiry {
                    Expiry::Never => Some(None),
                    Expiry::At(instant) => Some(Some(instant)),
                    Expiry::DoNotCache => None,
                };
                if let Some(expires_at) = expires_at {
                    state.entries.insert(
                        argument,
                        CachedValue {
                            value: lookup.value.clone(),
                            expires_at,
                        },
                    );
                }
            }
        }

        outcome.map(|lookup| lookup.value)
    }

    /// Cached, non-expired value for `argument`. Never starts a lookup and
    /// ignores in-flight ones.
    pub fn check_cache(&self, argument: &A) -> Option<V> {
        self.check_cache_at(argument, OffsetDateTime::now_utc())
    }

    /// [`check_cache`](Self::check_cache) as of `now`.
    pub fn check_cache_at(&self, argument: &A, now: OffsetDateTime) -> Option<V> {
        self.lock()
            .entries
            .get(argument)
            .filter(|cached| cached.is_fresh(now))
            .map(|cached| cached.value.clone())
    }

    /// The non-expired entry for `argument` as of `now`, with its expiry.
    pub fn entry_at(&self, argument: &A, now: OffsetDateTime) -> Option<ExportedEntry<A, V>> {
        self.lock()
            .entries
            .get(argument)
            .filter(|cached| cached.is_fresh(now))
            .map(|cached| ExportedEntry {
                argument: argument.clone(),
                value: cached.value.clone(),
                expires_at: cached.expires_at,
            })
    }

    /// Insert a resolution directly, bypassing the lookup.
    pub fn store(&self, argument: A, value: V, expiry: Expiry) {
        let expires_at = match expiry {
            Expiry::Never => None,
            Expiry::At(instant) => Some(instant),
            Expiry::DoNotCache => return,
        };
        self.lock()
            .entries
            .insert(argument, CachedValue { value, expires_at });
    }

    /// Snapshot of every entry that has not expired as of now.
    pub fn export_cache(&self) -> Vec<ExportedEntry<A, V>> {
        self.export_cache_with(A::clone, V::clone)
    }

    /// [`export_cache`](Self::export_cache) with caller-supplied marshalling.
    pub fn export_cache_with<MA, MV>(
        &self,
        marshal_argument: impl Fn(&A) -> MA,
        marshal_value: impl Fn(&V) -> MV,
    ) -> Vec<ExportedEntry<MA, MV>> {
        let now = OffsetDateTime::now_utc();
        self.lock()
            .entries
            .iter()
            .filter(|(_, cached)| cached.is_fresh(now))
            .map(|(argument, cached)| ExportedEntry {
                argument: marshal_argument(argument),
                value: marshal_value(&cached.value),
                expires_at: cached.expires_at,
            })
            .collect()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.lock().entries.retain(|_, cached| cached.is_fresh(now));
    }

    fn lock(&self) -> MutexGuard<'_, MemoState<A, V, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_lookup(
        calls: Arc<AtomicUsize>,
        expiry: Expiry,
    ) -> LookupFn<String, String, String> {
        Arc::new(move |argument: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if argument == "bad" {
                    return Err(String::from("lookup failed"));
                }
                Ok(Lookup {
                    value: argument.to_uppercase(),
                    expiry,
                })
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn caches_successful_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));

        assert_eq!(cache.check_cache(&String::from("a")), None);
        assert_eq!(cache.call(String::from("a")).await, Ok(String::from("A")));
        assert_eq!(cache.call(String::from("a")).await, Ok(String::from("A")));
        assert_eq!(cache.check_cache(&String::from("a")), Some(String::from("A")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));

        let (first, second, third) = tokio::join!(
            cache.call(String::from("a")),
            cache.call(String::from("a")),
            cache.call(String::from("b")),
        );

        assert_eq!(first, Ok(String::from("A")));
        assert_eq!(second, Ok(String::from("A")));
        assert_eq!(third, Ok(String::from("B")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_reach_every_waiter_and_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));

        let (first, second) = tokio::join!(
            cache.call(String::from("bad")),
            cache.call(String::from("bad")),
        );
        assert_eq!(first, Err(String::from("lookup failed")));
        assert_eq!(second, Err(String::from("lookup failed")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.check_cache(&String::from("bad")), None);

        let _ = cache.call(String::from("bad")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn do_not_cache_resolutions_are_returned_but_not_stored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::DoNotCache));

        assert_eq!(cache.call(String::from("a")).await, Ok(String::from("A")));
        assert_eq!(cache.call(String::from("a")).await, Ok(String::from("A")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expiring_entry_is_a_hit_before_and_a_miss_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));
        let deadline = OffsetDateTime::now_utc() + Duration::from_secs(60);
        cache.store(String::from("a"), String::from("cached"), Expiry::At(deadline));

        let key = String::from("a");
        let just_before = deadline - Duration::from_millis(1);
        let just_after = deadline + Duration::from_millis(1);
        assert_eq!(cache.check_cache_at(&key, just_before), Some(String::from("cached")));
        assert_eq!(cache.check_cache_at(&key, just_after), None);
    }

    #[test]
    fn entry_carries_its_expiry_until_it_lapses() {
        let cache = MemoCache::new(counting_lookup(Arc::default(), Expiry::Never));
        let deadline = OffsetDateTime::now_utc() + Duration::from_secs(60);
        cache.store(String::from("a"), String::from("cached"), Expiry::At(deadline));

        let key = String::from("a");
        let entry = cache
            .entry_at(&key, deadline - Duration::from_millis(1))
            .expect("fresh entry");
        assert_eq!(entry.value, "cached");
        assert_eq!(entry.expires_at, Some(deadline));
        assert_eq!(cache.entry_at(&key, deadline), None);
    }

    #[tokio::test]
    async fn expired_entry_is_requeried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(
            calls.clone(),
            Expiry::after(Duration::from_millis(100)),
        ));

        cache.call(String::from("a")).await.expect("first lookup");
        cache.call(String::from("a")).await.expect("cached");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.check_cache(&String::from("a")), None);
        cache.call(String::from("a")).await.expect("requeried");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn export_and_restore_round_trip_without_new_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));
        cache.call(String::from("a")).await.expect("lookup");
        cache.call(String::from("b")).await.expect("lookup");
        cache.store(
            String::from("stale"),
            String::from("old"),
            Expiry::At(OffsetDateTime::now_utc() - Duration::from_secs(1)),
        );

        let exported = cache.export_cache();
        assert_eq!(exported.len(), 2);

        let json = serde_json::to_string(&exported).expect("serializable");
        let restored_entries = serde_json::from_str(&json).expect("deserializable");
        let restored = MemoCache::with_entries(
            counting_lookup(calls.clone(), Expiry::Never),
            restored_entries,
        );

        for key in ["a", "b"] {
            let key = String::from(key);
            assert_eq!(restored.check_cache(&key), cache.check_cache(&key));
            restored.call(key).await.expect("cached");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn marshalled_export_restores_through_unmarshal_functions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MemoCache::new(counting_lookup(calls.clone(), Expiry::Never));
        cache.call(String::from("ab")).await.expect("lookup");

        let exported = cache.export_cache_with(|argument| argument.len(), |value| value.clone());
        assert_eq!(exported[0].argument, 2);

        let restored = MemoCache::with_marshalled_entries(
            counting_lookup(calls.clone(), Expiry::Never),
            exported,
            |length: usize| Ok::<_, String>("x".repeat(length)),
            |value: String| Ok(value),
        )
        .expect("unmarshal succeeds");
        assert_eq!(restored.check_cache(&String::from("xx")), Some(String::from("AB")));
    }
}
