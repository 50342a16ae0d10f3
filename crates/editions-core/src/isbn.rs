//! Identifier normalization and ISBN-10/ISBN-13 equivalence.
//!
//! Every identifier that crosses a module boundary is an [`Isbn`], which is
//! always stored in normalized form: whitespace and hyphens removed, ASCII
//! uppercase (so a trailing `x` check digit reads `X`).
//!
//! Identifiers that are not checksum-valid ISBNs are still accepted; they
//! simply have no alternate form and are their own canonical identifier.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const ISBN13_BOOKLAND_PREFIX: &str = "978";

/// Normalized book identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    /// Parse and normalize an identifier.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '-')
            .map(|ch| ch.to_ascii_uppercase())
            .collect::<String>();

        if normalized.is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }

        for (index, ch) in normalized.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::IdentifierInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The representative used as a cache key for this identifier's class.
    pub fn canonical(&self) -> Isbn {
        canonical(self)
    }

    /// All textual forms of this identifier, canonical form first.
    pub fn equivalents(&self) -> Vec<Isbn> {
        equivalents(self)
    }
}

impl Display for Isbn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Isbn {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Isbn {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Isbn> for String {
    fn from(value: Isbn) -> Self {
        value.0
    }
}

/// Canonical form of an identifier: the ISBN-13 when one exists, otherwise
/// the normalized identifier itself.
pub fn canonical(isbn: &Isbn) -> Isbn {
    equivalents(isbn)
        .into_iter()
        .next()
        .unwrap_or_else(|| isbn.clone())
}

/// Every equivalent textual form of an identifier.
///
/// `equivalents(x)[0] == canonical(x)`. A checksum-valid ISBN-10 or a
/// 978-prefixed ISBN-13 yields both forms; anything else yields one element.
pub fn equivalents(isbn: &Isbn) -> Vec<Isbn> {
    let value = isbn.as_str();

    if is_valid_isbn10(value) {
        if let Some(thirteen) = isbn10_to_isbn13(value) {
            return vec![Isbn(thirteen), isbn.clone()];
        }
    }

    if is_valid_isbn13(value) {
        if let Some(ten) = isbn13_to_isbn10(value) {
            return vec![isbn.clone(), Isbn(ten)];
        }
    }

    vec![isbn.clone()]
}

pub fn is_valid_isbn10(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || !bytes[..9].iter().all(u8::is_ascii_digit) {
        return false;
    }
    isbn10_check_digit(&bytes[..9]) == Some(bytes[9] as char)
}

pub fn is_valid_isbn13(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    isbn13_check_digit(&bytes[..12]) == Some(bytes[12] as char)
}

/// Convert a valid ISBN-10 to its 978-prefixed ISBN-13.
pub fn isbn10_to_isbn13(value: &str) -> Option<String> {
    if !is_valid_isbn10(value) {
        return None;
    }
    let stem = format!("{ISBN13_BOOKLAND_PREFIX}{}", &value[..9]);
    let check = isbn13_check_digit(stem.as_bytes())?;
    Some(format!("{stem}{check}"))
}

/// Convert a valid 978-prefixed ISBN-13 to its ISBN-10. 979 numbers have no
/// ISBN-10 form.
pub fn isbn13_to_isbn10(value: &str) -> Option<String> {
    if !is_valid_isbn13(value) || !value.starts_with(ISBN13_BOOKLAND_PREFIX) {
        return None;
    }
    let stem = &value[3..12];
    let check = isbn10_check_digit(stem.as_bytes())?;
    Some(format!("{stem}{check}"))
}

fn isbn10_check_digit(first_nine: &[u8]) -> Option<char> {
    if first_nine.len() != 9 {
        return None;
    }
    let sum = first_nine
        .iter()
        .enumerate()
        .map(|(index, byte)| (10 - index as u32) * u32::from(byte - b'0'))
        .sum::<u32>();
    match (11 - sum % 11) % 11 {
        10 => Some('X'),
        digit => char::from_digit(digit, 10),
    }
}

fn isbn13_check_digit(first_twelve: &[u8]) -> Option<char> {
    if first_twelve.len() != 12 {
        return None;
    }
    let sum = first_twelve
        .iter()
        .enumerate()
        .map(|(index, byte)| {
            let weight = if index % 2 == 0 { 1 } else { 3 };
            weight * u32::from(byte - b'0')
        })
        .sum::<u32>();
    char::from_digit((10 - sum % 10) % 10, 10)
}
