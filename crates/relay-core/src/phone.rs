//! Phone number normalization
//!
//! Converts free-form phone text into the provider's dialable form:
//! digits only, no `+`, with an explicit country code.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country code applied to local-format numbers when none is configured
pub const DEFAULT_COUNTRY_CODE: &str = "61";

/// Digits-only, country-coded phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPhoneNumber(String);

impl NormalizedPhoneNumber {
    /// Borrow the digits
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when normalization found no digits at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Phone number normalizer with a configurable default country code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    default_country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl PhoneNormalizer {
    /// Create a normalizer
    ///
    /// The country code is reduced to its digits and stripped of leading
    /// zeros, so `"+61"`, `"061"` and `"61"` are equivalent.
    pub fn new(default_country_code: impl AsRef<str>) -> Self {
        let digits: String = default_country_code
            .as_ref()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();

        Self {
            default_country_code: digits.trim_start_matches('0').to_string(),
        }
    }

    /// The country code prepended to local numbers
    pub fn default_country_code(&self) -> &str {
        &self.default_country_code
    }

    /// Normalize arbitrary text into a dialable number
    ///
    /// Never fails. Input without digits yields an empty number, which the
    /// provider or CRM will reject downstream.
    ///
    /// - `00` prefix: international access code, all leading zeros dropped
    /// - single leading `0`: local format, replaced by the default country code
    /// - anything else: assumed to already carry a country code
    pub fn normalize(&self, input: &str) -> NormalizedPhoneNumber {
        let digits: String = input.chars().filter(char::is_ascii_digit).collect();

        let normalized = if digits.starts_with("00") {
            digits.trim_start_matches('0').to_string()
        } else if digits.len() > 1 && digits.starts_with('0') {
            format!("{}{}", self.default_country_code, &digits[1..])
        } else {
            digits
        };

        NormalizedPhoneNumber(normalized)
    }
}
