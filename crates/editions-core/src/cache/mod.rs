//! Memoizing cache and the equivalence layer built on it.

pub mod equivalence;
pub mod memo;

pub use equivalence::EquivalenceCache;
pub use memo::{ExportedEntry, Expiry, Lookup, LookupFn, LookupFuture, MemoCache};
