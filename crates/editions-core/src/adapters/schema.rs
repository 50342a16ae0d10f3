//! Response validation shared by the adapters.
//!
//! Each adapter declares the response shapes it understands as [`Schema`]
//! types. Validation yields a tagged [`Validated`] value instead of an error,
//! so a call site decides whether a mismatch is a fault (top-level
//! document) or a warning (one entry of many).

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Outcome of validating a response or one of its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(String),
}

impl<T> Validated<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Valid(value) => Ok(value),
            Self::Invalid(reason) => Err(reason),
        }
    }

    /// Apply a further structural check to a valid value.
    pub fn and_check(self, check: impl FnOnce(&T) -> Option<String>) -> Self {
        match self {
            Self::Valid(value) => match check(&value) {
                Some(reason) => Self::Invalid(reason),
                None => Self::Valid(value),
            },
            invalid @ Self::Invalid(_) => invalid,
        }
    }
}

/// A response shape an adapter knows how to validate.
pub trait Schema: Sized {
    fn validate(body: &str) -> Validated<Self>;
}

/// Decode a JSON document into `T`.
pub fn json_document<T: DeserializeOwned>(body: &str) -> Validated<T> {
    match serde_json::from_str(body) {
        Ok(value) => Validated::Valid(value),
        Err(error) => Validated::Invalid(format!("response is not the expected JSON: {error}")),
    }
}

/// Decode one already-parsed JSON entry into `T`.
pub fn json_entry<T: DeserializeOwned>(entry: Value) -> Validated<T> {
    match serde_json::from_value(entry) {
        Ok(value) => Validated::Valid(value),
        Err(error) => Validated::Invalid(format!("malformed entry: {error}")),
    }
}
