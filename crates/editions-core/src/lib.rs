//! # Editions Core
//!
//! Finds every known edition of a book, given one or more of its ISBNs.
//!
//! ## Overview
//!
//! Several bibliographic services can each report which ISBNs belong to the
//! same work. This crate queries them politely and merges what they report:
//!
//! - **Identifier normalization** with ISBN-10 / ISBN-13 equivalence
//! - **Service adapters** for Open Library and LibraryThing
//! - **Memoizing caches** with expiry, in-flight deduplication and export
//! - **Equivalence caches** that close answers under shared membership
//! - **Orchestration** with a global concurrency cap, per-service pacing,
//!   failover and cooperative cancellation
//! - **Progress events** for every plan, cache hit, query and fetch
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Service adapters and response schemas |
//! | [`cache`] | Memoizing cache and equivalence layer |
//! | [`circuit_breaker`] | Circuit breaker for upstream fetches |
//! | [`config`] | Resolver configuration and environment overrides |
//! | [`document`] | Persisted cache document |
//! | [`error`] | Core error types |
//! | [`fetch`] | Per-service fetch handle |
//! | [`http_client`] | HTTP client abstraction |
//! | [`isbn`] | Identifier normalization |
//! | [`progress`] | Progress events and run summary |
//! | [`resolver`] | Fetch orchestration |
//! | [`result_set`] | Per-query results and diagnostics |
//! | [`service`] | Service identifiers, adapter contract, policies |
//! | [`throttling`] | Concurrency limit and per-service pacing |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use editions_core::{resolve_editions, ResolveOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let editions = resolve_editions(["0-441-17271-7"], ResolveOptions::default()).await?;
//!     for isbn in &editions {
//!         println!("{isbn}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Caller         │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Edition Resolver│────▶│ Concurrency Limit│
//! └────────┬────────┘     │ Service Throttle │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Equivalence     │────▶│ Cache Document   │
//! │ Cache (memo)    │     │ (JSON)           │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Edition Service │────▶│ Service Fetcher  │
//! │ (Adapter Trait) │     │ + Circuit Breaker│
//! └─────────────────┘     └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ HTTP Client      │
//!                         │ (reqwest/stub)   │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Service trouble never fails a run. Faults and warnings are recorded per
//! query, and a query that fails outright degrades to its own identifier.
//! Only caller misuse is an error:
//!
//! ```rust
//! use editions_core::EditionsError;
//!
//! fn explain(error: &EditionsError) -> &'static str {
//!     match error {
//!         EditionsError::NoServices => "enable at least one service",
//!         EditionsError::MalformedCache { .. } => "discard the cache document",
//!         EditionsError::Validation(_) => "check the identifiers",
//!         _ => "unexpected failure",
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod isbn;
pub mod progress;
pub mod resolver;
pub mod result_set;
pub mod service;
pub mod throttling;

// Re-export commonly used types at crate root for convenience

// Adapter implementations
pub use adapters::{
    default_adapters, OpenLibraryEditionsAdapter, OpenLibrarySearchAdapter, ThingIsbnAdapter,
};

// Caching
pub use cache::{EquivalenceCache, ExportedEntry, Expiry, Lookup, MemoCache};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration and persistence
pub use config::ResolverConfig;
pub use document::CacheDocument;

// Errors
pub use error::{EditionsError, ValidationError};

// Fetching
pub use fetch::{FetchOutcome, ServiceFetcher};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient,
};

// Identifiers and results
pub use isbn::Isbn;
pub use result_set::{Diagnostic, ResultSet};

// Progress
pub use progress::{AbortHandle, ProgressEvent, ProgressFn, ProgressReporter, ProgressSummary, ServiceTally};

// Orchestration
pub use resolver::{resolve_editions, EditionResolver, Resolution, ResolveOptions};

// Services
pub use service::{EditionService, ServiceError, ServiceErrorKind, ServiceId, ServicePolicy};
pub use throttling::{ConcurrencyLimit, ServiceThrottle};
