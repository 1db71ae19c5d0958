//! IBAN value object with ISO 13616 mod-97 validation.

use serde::{Deserialize, Serialize};

use verenigingen_core::{DomainError, ValueObject};

/// Expected IBAN length for the countries the association collects from.
fn expected_length(country: &str) -> Option<usize> {
    match country {
        "AT" => Some(20),
        "BE" => Some(16),
        "DE" => Some(22),
        "ES" => Some(24),
        "FR" => Some(27),
        "IT" => Some(27),
        "LU" => Some(20),
        "NL" => Some(18),
        _ => None,
    }
}

/// A validated IBAN, stored in electronic format (no spaces, uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iban(String);

impl Iban {
    /// Parse and validate an IBAN.
    ///
    /// Accepts paper format with spaces and lowercase input; validates the
    /// country length (for known countries), the character set, the mod-97
    /// checksum, and for NL the `NLkk BANK 0123456789` shape (4 bank
    /// letters + 10 digits).
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let normalized: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() < 15 || normalized.len() > 34 {
            return Err(DomainError::validation(format!(
                "IBAN has invalid length: {input}"
            )));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(format!(
                "IBAN contains invalid characters: {input}"
            )));
        }

        let country = &normalized[..2];
        if !country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "IBAN country code must be alphabetic: {input}"
            )));
        }
        if let Some(expected) = expected_length(country) {
            if normalized.len() != expected {
                return Err(DomainError::validation(format!(
                    "IBAN length {} does not match {country} (expected {expected})",
                    normalized.len()
                )));
            }
        }

        if mod97(&normalized) != 1 {
            return Err(DomainError::validation(format!(
                "IBAN checksum failed: {input}"
            )));
        }

        if country == "NL" {
            let bank = &normalized[4..8];
            let account = &normalized[8..];
            if !bank.chars().all(|c| c.is_ascii_uppercase())
                || !account.chars().all(|c| c.is_ascii_digit())
            {
                return Err(DomainError::validation(format!(
                    "Dutch IBAN must be NLkk + 4 bank letters + 10 digits: {input}"
                )));
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn country(&self) -> &str {
        &self.0[..2]
    }
}

impl core::fmt::Display for Iban {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Iban {}

/// ISO 7064 mod-97: move the first four characters to the back, map letters
/// to 10..35, reduce digit-by-digit to keep intermediate values small.
fn mod97(iban: &str) -> u32 {
    let rearranged = iban[4..].chars().chain(iban[..2].chars()).chain(iban[2..4].chars());

    let mut remainder: u32 = 0;
    for c in rearranged {
        if let Some(d) = c.to_digit(10) {
            remainder = (remainder * 10 + d) % 97;
        } else {
            let v = (c as u32) - ('A' as u32) + 10;
            remainder = (remainder * 100 + v) % 97;
        }
    }
    remainder
}
