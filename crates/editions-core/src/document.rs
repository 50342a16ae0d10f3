//! The persisted cache document.
//!
//! One JSON value per service, keyed by the service's display name, holding
//! exactly what that service's equivalence cache last exported. Entries for
//! services that were not enabled in a run are left as they were. Reading and
//! storing the document is up to the caller.

use std::collections::BTreeMap;

use serde_json::Value;

pub type CacheDocument = BTreeMap<String, Value>;
