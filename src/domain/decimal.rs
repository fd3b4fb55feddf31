//! Lossless decimal numeric type backed by rust_decimal.
//!
//! All USD figures and prices in the strategy flow through this type so a
//! whole report is computed without floating-point drift.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
///
/// Serializes to a JSON number (not a string).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Construct from an integer token amount.
    pub fn from_u64(value: u64) -> Self {
        Decimal(RustDecimal::from(value))
    }

    /// Convert a raw integer token amount to its human-readable value.
    pub fn from_raw_amount(raw: u64, decimals: u8) -> Self {
        let mut value = RustDecimal::from(raw);
        value.set_scale(decimals as u32).unwrap_or_default();
        Decimal(value.normalize())
    }

    /// Convert a human-readable token amount back to a raw integer amount,
    /// truncating any fraction below the mint's precision.
    ///
    /// `decimals` comes from external token metadata; a precision beyond
    /// what a u64 can scale yields zero rather than overflowing.
    pub fn to_raw_amount(&self, decimals: u8) -> u64 {
        let Some(scale) = 10u64.checked_pow(decimals as u32) else {
            return 0;
        };
        let scaled = self.0 * RustDecimal::from(scale);
        scaled.trunc().to_u64().unwrap_or(0)
    }

    /// Best-effort conversion from an f64 (config values, test fixtures).
    pub fn from_f64_lossy(value: f64) -> Self {
        Decimal(RustDecimal::from_f64(value).unwrap_or_default())
    }

    /// Format without exponent notation and without trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    /// Round to two decimal places, the precision used for USD reporting.
    pub fn round2(&self) -> Self {
        Decimal(self.0.round_dp(2))
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }

    /// `self / base * 100`, or zero when the base is zero.
    pub fn percent_of(&self, base: Decimal) -> Self {
        if base.is_zero() {
            return Decimal::zero();
        }
        Decimal(self.0 / base.0 * RustDecimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for s in ["123.456", "0.0001", "1000000", "-123.456", "0"] {
            let decimal = Decimal::from_str_canonical(s).expect("parse failed");
            let reparsed =
                Decimal::from_str_canonical(&decimal.to_canonical_string()).expect("reparse");
            assert_eq!(decimal, reparsed, "roundtrip failed for {}", s);
        }
    }

    #[test]
    fn raw_amount_conversions() {
        let human = Decimal::from_raw_amount(1_500_000, 6);
        assert_eq!(human.to_canonical_string(), "1.5");
        assert_eq!(human.to_raw_amount(6), 1_500_000);

        // Truncation below mint precision.
        let value = Decimal::from_str_canonical("1.2345678").unwrap();
        assert_eq!(value.to_raw_amount(6), 1_234_567);
    }

    #[test]
    fn raw_amount_zero_for_unscalable_precision() {
        let value = Decimal::from_str_canonical("1.5").unwrap();
        // 10^20 does not fit a u64; treat the metadata as unusable.
        assert_eq!(value.to_raw_amount(20), 0);
        assert_eq!(value.to_raw_amount(19), 15_000_000_000_000_000_000);
    }

    #[test]
    fn percent_of_zero_base_is_zero() {
        let value = Decimal::from_str_canonical("10").unwrap();
        assert_eq!(value.percent_of(Decimal::zero()), Decimal::zero());
    }

    #[test]
    fn percent_of_computes_ratio() {
        let value = Decimal::from_str_canonical("-150").unwrap();
        let base = Decimal::from_str_canonical("1000").unwrap();
        assert_eq!(value.percent_of(base).to_canonical_string(), "-15");
    }

    #[test]
    fn round2_usd_precision() {
        let value = Decimal::from_str_canonical("12.3456").unwrap();
        assert_eq!(value.round2().to_canonical_string(), "12.35");
    }

    #[test]
    fn max_picks_larger() {
        let a = Decimal::from_str_canonical("10").unwrap();
        let b = Decimal::from_str_canonical("12").unwrap();
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
    }
}
