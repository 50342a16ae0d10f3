use thiserror::Error;

/// Validation errors for identifiers, service names and configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("identifier cannot be empty")]
    EmptyIdentifier,
    #[error("identifier contains invalid character '{ch}' at index {index}")]
    IdentifierInvalidChar { ch: char, index: usize },

    #[error(
        "invalid service '{value}', expected one of ol-editions, ol-search, thingisbn"
    )]
    InvalidService { value: String },

    #[error("configuration value for {key} is invalid: '{value}'")]
    InvalidConfig { key: &'static str, value: String },
}

/// Top-level error type for caller misuse.
///
/// Service faults, warnings and per-identifier rejections never surface here;
/// they are reported through progress events and degrade gracefully.
#[derive(Debug, Error)]
pub enum EditionsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no services are enabled; at least one service is required to query editions")]
    NoServices,

    #[error("cache document entry for '{service}' is malformed: {source}")]
    MalformedCache {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
