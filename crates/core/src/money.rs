//! Euro amounts in cents.
//!
//! Dues rates, invoice totals and SEPA collection amounts are all whole
//! eurocent quantities. Keeping them integral avoids float rounding in
//! control sums and catch-up arithmetic.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// An amount of money in eurocents.
///
/// Arithmetic is checked or saturating; amounts never silently wrap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole euros, no cent part.
    pub const fn from_euros(euros: i64) -> Self {
        Self(euros * 100)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    pub fn checked_mul(self, factor: i64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }

    /// Format as a decimal euro string with two fraction digits ("12.50").
    ///
    /// Used for SEPA control sums, which must not be produced via floats.
    pub fn to_euro_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EUR {}", self.to_euro_string())
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| {
            acc.checked_add(m).unwrap_or(Money(i64::MAX))
        })
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// Parse "12.50", "12", or "-3.07" into cents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (euros, cents) = match rest.split_once('.') {
            Some((e, c)) => {
                if c.len() > 2 || c.is_empty() {
                    return Err(DomainError::validation(format!("invalid amount: {s}")));
                }
                let cents: i64 = c
                    .parse()
                    .map_err(|_| DomainError::validation(format!("invalid amount: {s}")))?;
                // "12.5" means 50 cents, not 5.
                let cents = if c.len() == 1 { cents * 10 } else { cents };
                (e, cents)
            }
            None => (rest, 0),
        };
        let euros: i64 = euros
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid amount: {s}")))?;
        Ok(Money(sign * (euros * 100 + cents)))
    }
}

impl ValueObject for Money {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn euro_string_formats_cents() {
        assert_eq!(Money::from_cents(1250).to_euro_string(), "12.50");
        assert_eq!(Money::from_cents(5).to_euro_string(), "0.05");
        assert_eq!(Money::from_cents(-307).to_euro_string(), "-3.07");
        assert_eq!(Money::ZERO.to_euro_string(), "0.00");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("12.50".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_euros(12));
        assert_eq!("-3.07".parse::<Money>().unwrap(), Money::from_cents(-307));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!("12.505".parse::<Money>().is_err());
        assert!("12.".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_cents(100);
        let b = Money::from_cents(250);
        assert_eq!(a.saturating_sub(b), Money::ZERO);
        assert_eq!(b.saturating_sub(a), Money::from_cents(150));
    }

    proptest! {
        #[test]
        fn euro_string_round_trips(cents in -1_000_000_000i64..1_000_000_000i64) {
            let m = Money::from_cents(cents);
            let parsed: Money = m.to_euro_string().parse().unwrap();
            prop_assert_eq!(parsed, m);
        }
    }
}
