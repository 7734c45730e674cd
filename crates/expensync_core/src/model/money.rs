//! Fixed-point money amounts.
//!
//! # Responsibility
//! - Represent currency amounts as integer cents to avoid float drift.
//! - Parse user-facing amount strings into exact cent values.
//!
//! # Invariants
//! - Arithmetic never silently overflows; checked helpers return `None`.
//! - Expense records only accept non-negative amounts (enforced by the
//!   record validator, not by this type).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Neg;

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-)?\$?(\d+)(?:\.(\d{1,2}))?$").expect("valid amount regex"));

/// Monetary amount stored as cents.
///
/// Serialized transparently as the raw cent count so journal payloads and
/// remote documents carry exact integers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition; `None` on i64 overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction; `None` on i64 overflow.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating addition for aggregation totals.
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction for aggregation totals.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parses amount text such as `"10.50"`, `"$10.50"`, `"10"` or `"-3.20"`.
    ///
    /// A single fractional digit means tenths (`"10.5"` is 10 dollars 50
    /// cents), matching everyday receipt notation.
    pub fn parse(input: &str) -> Result<Self, MoneyParseError> {
        let trimmed = input.trim();
        let captures = AMOUNT_RE
            .captures(trimmed)
            .ok_or_else(|| MoneyParseError::Malformed(trimmed.to_string()))?;

        let negative = captures.get(1).is_some();
        let whole: i64 = captures
            .get(2)
            .expect("regex guarantees whole part")
            .as_str()
            .parse()
            .map_err(|_| MoneyParseError::OutOfRange(trimmed.to_string()))?;

        let fraction = match captures.get(3).map(|m| m.as_str()) {
            None => 0,
            Some(digits) if digits.len() == 1 => {
                digits.parse::<i64>().expect("regex guarantees digits") * 10
            }
            Some(digits) => digits.parse::<i64>().expect("regex guarantees digits"),
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|value| value.checked_add(fraction))
            .ok_or_else(|| MoneyParseError::OutOfRange(trimmed.to_string()))?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Neg for Money {
    type Output = Self;

    /// Saturating negation: `i64::MIN` has no positive counterpart.
    fn neg(self) -> Self {
        Self(self.0.checked_neg().unwrap_or(i64::MAX))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

/// Error for malformed amount text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    Malformed(String),
    OutOfRange(String),
}

impl Display for MoneyParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(input) => write!(f, "amount is not a valid money string: `{input}`"),
            Self::OutOfRange(input) => write!(f, "amount does not fit in cents range: `{input}`"),
        }
    }
}

impl Error for MoneyParseError {}
