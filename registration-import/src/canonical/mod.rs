use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod countries;

use countries::Country;

/// A phone number reduced to its national digits, plus the full international form
/// when the country is known.
///
/// `with_country_code`, when present, always starts with `+`; `local` never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPhone {
    pub local: String,
    pub with_country_code: Option<String>,
    pub iso_code: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneValidationError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number {0} has no country code")]
    MissingCountryCode(String),
    #[error("phone number {0} does not belong to a supported country")]
    UnknownCountry(String),
    #[error("phone number {0} contains characters other than digits")]
    NonDigit(String),
    #[error(
        "phone number {number} must have {} digits after +{calling_code} for {}, got {actual}",
        expected_digits(.min, .max), .iso.to_uppercase()
    )]
    InvalidLength {
        number: String,
        iso: String,
        calling_code: String,
        min: usize,
        max: usize,
        actual: usize,
    },
}

fn expected_digits(min: &usize, max: &usize) -> String {
    if min == max {
        min.to_string()
    } else {
        format!("{min}-{max}")
    }
}

/// Reads a per-row country cell, which spreadsheets fill with either an ISO code
/// ("PK") or a calling code ("+92", "92"), into a lowercase ISO code.
pub fn resolve_iso_hint(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    if let Some(country) = countries::by_iso(raw) {
        return Some(country.iso);
    }
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    countries::by_calling_code(digits).next().map(|c| c.iso)
}

/// Trims and lowercases. Format checks belong to row validation.
pub fn canonicalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn strip_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-'))
        .collect()
}

/// Canonicalizes a raw phone cell. Total: malformed input still yields a value,
/// validity is checked separately with [`CanonicalPhone::validate`].
///
/// Numbers starting with `+` are split on the longest known calling code. Anything
/// else is taken as a national number in `iso_hint`'s country, or `default_iso`'s
/// when there is no hint.
pub fn canonicalize_phone(raw: &str, iso_hint: Option<&str>, default_iso: &str) -> CanonicalPhone {
    let stripped = strip_phone(raw);
    let hint = iso_hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase);

    if let Some(digits) = stripped.strip_prefix('+') {
        if let Some((country, rest)) = countries::match_calling_code(digits, hint.as_deref()) {
            return CanonicalPhone {
                local: rest.to_string(),
                with_country_code: Some(stripped.clone()),
                iso_code: Some(country.iso.to_string()),
            };
        }
        // Unknown calling code, read what follows the + as a national number
        return national(digits.trim_start_matches('+'), default_iso);
    }

    national(&stripped, hint.as_deref().unwrap_or(default_iso))
}

fn national(local: &str, iso: &str) -> CanonicalPhone {
    let iso = iso.trim().to_lowercase();
    let with_country_code = match countries::by_iso(&iso) {
        _ if local.is_empty() => None,
        // The trunk prefix is dialled domestically only
        Some(country) => Some(format!(
            "+{}{}",
            country.calling_code,
            local.trim_start_matches('0')
        )),
        None => None,
    };

    CanonicalPhone {
        local: local.to_string(),
        with_country_code,
        iso_code: (!iso.is_empty()).then_some(iso),
    }
}

impl CanonicalPhone {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.with_country_code.is_none()
    }

    /// Every non-empty representation, used as duplicate index keys.
    pub fn variants(&self) -> Vec<&str> {
        let mut variants = Vec::with_capacity(2);
        if !self.local.is_empty() {
            variants.push(self.local.as_str());
        }
        if let Some(full) = self.with_country_code.as_deref() {
            if full != self.local {
                variants.push(full);
            }
        }
        variants
    }

    /// Checks the national number length against its country's numbering plan.
    pub fn validate(&self) -> Result<&'static Country, PhoneValidationError> {
        match &self.with_country_code {
            Some(full) => validate_with_hint(full, self.iso_code.as_deref()),
            None if self.local.is_empty() => Err(PhoneValidationError::Empty),
            None => Err(PhoneValidationError::UnknownCountry(self.local.clone())),
        }
    }
}

/// Validates a `+`-prefixed number against the digit range of the country its
/// calling code belongs to. Unknown countries are rejected.
pub fn validate_phone_for_country(
    with_country_code: &str,
) -> Result<&'static Country, PhoneValidationError> {
    validate_with_hint(with_country_code, None)
}

fn validate_with_hint(
    with_country_code: &str,
    iso_hint: Option<&str>,
) -> Result<&'static Country, PhoneValidationError> {
    let number = with_country_code.trim();
    if number.is_empty() {
        return Err(PhoneValidationError::Empty);
    }
    let Some(digits) = number.strip_prefix('+') else {
        return Err(PhoneValidationError::MissingCountryCode(number.to_string()));
    };
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneValidationError::NonDigit(number.to_string()));
    }
    let Some((country, rest)) = countries::match_calling_code(digits, iso_hint) else {
        return Err(PhoneValidationError::UnknownCountry(number.to_string()));
    };

    let actual = rest.len();
    if actual < country.min_digits || actual > country.max_digits {
        return Err(PhoneValidationError::InvalidLength {
            number: number.to_string(),
            iso: country.iso.to_string(),
            calling_code: country.calling_code.to_string(),
            min: country.min_digits,
            max: country.max_digits,
            actual,
        });
    }

    Ok(country)
}
