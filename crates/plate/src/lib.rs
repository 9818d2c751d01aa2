//! Brazilian license-plate validation.
//!
//! Two grammars are accepted, and matching is anchored and case-sensitive:
//!
//! - legacy plates: three uppercase letters, a hyphen, four digits (`ABC-1234`)
//! - Mercosul plates: three uppercase letters, a digit, an uppercase letter and
//!   two digits, with no separator (`ABC1D23`)

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static LEGACY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[A-Z]{3}-[0-9]{4}\z").expect("legacy plate pattern"));
static MERCOSUL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[A-Z]{3}[0-9][A-Z][0-9]{2}\z").expect("mercosul plate pattern"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlateError {
    #[error("Plate must be valid, format: AAA-1234 (got `{0}`)")]
    Invalid(String),
}

/// Which of the two plate grammars a string matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateFormat {
    /// `AAA-1234`
    Legacy,
    /// `ABC1D23`
    Mercosul,
}

impl PlateFormat {
    /// Returns the grammar `plate` matches, or `None` if it matches neither.
    ///
    /// # Example
    /// ```
    /// use plate::PlateFormat;
    /// assert_eq!(PlateFormat::detect("ABC-1234"), Some(PlateFormat::Legacy));
    /// assert_eq!(PlateFormat::detect("ABC1D23"), Some(PlateFormat::Mercosul));
    /// assert_eq!(PlateFormat::detect("abc-1234"), None);
    /// ```
    pub fn detect(plate: &str) -> Option<Self> {
        if LEGACY.is_match(plate) {
            Some(PlateFormat::Legacy)
        } else if MERCOSUL.is_match(plate) {
            Some(PlateFormat::Mercosul)
        } else {
            None
        }
    }
}

/// Returns true if `plate` matches one of the accepted grammars.
pub fn validate(plate: &str) -> bool {
    PlateFormat::detect(plate).is_some()
}

/// Drops every character outside `[A-Za-z0-9-]`.
///
/// OCR output usually carries whitespace, line breaks and stray punctuation
/// around the plate text.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// A plate string that is known to match one of the grammars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Plate(String);

impl Plate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn format(&self) -> PlateFormat {
        // Construction guarantees a match.
        PlateFormat::detect(&self.0).unwrap_or(PlateFormat::Legacy)
    }
}

impl FromStr for Plate {
    type Err = PlateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if validate(s) {
            Ok(Plate(s.to_string()))
        } else {
            Err(PlateError::Invalid(s.to_string()))
        }
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
