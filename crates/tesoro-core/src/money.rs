//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A running-balance ledger that drifts by fractions of a cent is a      │
//! │  ledger that never reconciles.                                          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount in the system is an i64 count of the smallest unit.    │
//! │    The database, the balances, and the settlement math all use cents.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tesoro_core::money::Money;
//!
//! let cash = Money::from_cents(10_000); // $100.00
//! let transfer = Money::from_cents(5_000);
//! assert_eq!((cash + transfer).cents(), 15_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: balances and till differences can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Derives**: full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts, only the major unit should be negative:
    /// `from_major_minor(-5, 50)` = -$5.50, not -$4.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99, absolute value).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly positive.
    ///
    /// Every leg, movement, and check amount in the ledgers must satisfy
    /// this; the sign lives in the direction, never in the amount.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Applies a sign based on a ledger direction flag.
    ///
    /// `true` keeps the amount positive (inflow / debit side),
    /// `false` negates it (outflow / credit side).
    #[inline]
    pub const fn signed(&self, positive: bool) -> Self {
        if positive {
            Money(self.0)
        } else {
            Money(-self.0)
        }
    }

    /// Parses a spreadsheet cell into Money, tolerating common formats.
    ///
    /// Check imports arrive from hand-edited spreadsheets, so the parser
    /// accepts the shapes that actually show up in those files:
    ///
    /// ```text
    /// "1234.56"   → 123456    "1,234.56" → 123456
    /// "1234,56"   → 123456    "1.234,56" → 123456
    /// "$ 1234.56" → 123456    "1234"     → 123400
    /// ```
    ///
    /// Returns `None` for anything that still isn't a number after
    /// normalization. Row-level failures are counted by the importer,
    /// never raised.
    pub fn parse_lenient(raw: &str) -> Option<Money> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
            .collect();

        if !cleaned.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let negative = cleaned.starts_with('-');

        // Decide which of '.'/',' is the decimal separator: the right-most
        // one wins; the other is treated as a thousands separator.
        let last_dot = cleaned.rfind('.');
        let last_comma = cleaned.rfind(',');
        let decimal_sep = match (last_dot, last_comma) {
            (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
            (Some(_), None) => Some('.'),
            (None, Some(_)) => Some(','),
            (None, None) => None,
        };

        let (int_part, frac_part) = match decimal_sep {
            Some(sep) => {
                let idx = cleaned.rfind(sep).unwrap();
                (cleaned[..idx].to_string(), cleaned[idx + 1..].to_string())
            }
            None => (cleaned.clone(), String::new()),
        };

        let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
        let frac_digits: String = frac_part.chars().filter(|c| c.is_ascii_digit()).collect();
        if frac_digits.len() > 2 {
            // Three or more "decimals" means the separator was a thousands
            // separator after all (e.g. "1.234" = 1234).
            let all: String = format!("{int_digits}{frac_digits}");
            let major: i64 = all.parse().ok()?;
            let cents = major.checked_mul(100)?;
            return Some(Money(if negative { -cents } else { cents }));
        }

        let major: i64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        let minor: i64 = match frac_digits.len() {
            0 => 0,
            1 => frac_digits.parse::<i64>().ok()? * 10,
            _ => frac_digits.parse().ok()?,
        };

        let cents = major.checked_mul(100)?.checked_add(minor)?;
        Some(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
/// For debugging and log lines; UI formatting happens elsewhere.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by integer (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Summing an iterator of amounts (settlement totals, balance aggregates).
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!((-a).cents(), -1000);
    }

    #[test]
    fn test_signed_by_direction() {
        let amount = Money::from_cents(250);
        assert_eq!(amount.signed(true).cents(), 250);
        assert_eq!(amount.signed(false).cents(), -250);
    }

    #[test]
    fn test_sum() {
        let legs = vec![
            Money::from_cents(100),
            Money::from_cents(-40),
            Money::from_cents(15),
        ];
        let total: Money = legs.into_iter().sum();
        assert_eq!(total.cents(), 75);
    }

    #[test]
    fn test_parse_lenient_plain() {
        assert_eq!(Money::parse_lenient("1234.56"), Some(Money::from_cents(123456)));
        assert_eq!(Money::parse_lenient("1234"), Some(Money::from_cents(123400)));
        assert_eq!(Money::parse_lenient("  42.5 "), Some(Money::from_cents(4250)));
    }

    #[test]
    fn test_parse_lenient_separators() {
        // US style thousands
        assert_eq!(Money::parse_lenient("1,234.56"), Some(Money::from_cents(123456)));
        // European style
        assert_eq!(Money::parse_lenient("1.234,56"), Some(Money::from_cents(123456)));
        assert_eq!(Money::parse_lenient("1234,56"), Some(Money::from_cents(123456)));
        // Lone thousands separator, no decimals
        assert_eq!(Money::parse_lenient("1.234"), Some(Money::from_cents(123400)));
    }

    #[test]
    fn test_parse_lenient_currency_noise() {
        assert_eq!(Money::parse_lenient("$ 1500.00"), Some(Money::from_cents(150000)));
        assert_eq!(Money::parse_lenient("-100.25"), Some(Money::from_cents(-10025)));
    }

    #[test]
    fn test_parse_lenient_garbage() {
        assert_eq!(Money::parse_lenient(""), None);
        assert_eq!(Money::parse_lenient("n/a"), None);
        assert_eq!(Money::parse_lenient("--"), None);
    }
}
