//! Type-safe price representation using decimal arithmetic.
//!
//! Catalogue prices are tax-inclusive: the VAT share of a price is extracted
//! by division (`p - p / (1 + rate)`), never added on top.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency.
///
/// Amounts are in the currency's standard unit (rupees, not paisa). Shipping
/// charges arrive from the backend as whole rupees and convert losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from a whole number of rupees.
    #[must_use]
    pub fn from_whole(amount: u32) -> Self {
        Self(Decimal::from(amount))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply by a line quantity, saturating at the largest amount.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(Decimal::from(quantity)))
    }

    /// Multiply by a line quantity, or `None` on overflow.
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(quantity)).map(Self)
    }

    /// Add, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Round half away from zero to a whole amount.
    ///
    /// Browsers round `.5` up for positive amounts, which is the same thing
    /// for the non-negative values this type carries.
    #[must_use]
    pub fn round_whole(self) -> Self {
        Self(self.0.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Portion of this tax-inclusive amount that is tax at `rate`.
    #[must_use]
    pub fn included_tax(self, rate: TaxRate) -> Self {
        Self(self.0 - self.0 / (Decimal::ONE + rate.fraction()))
    }

    /// Format for display (e.g., `Rs. 1,700`, `Rs. 12.50`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("{} {}", CurrencyCode::NPR.symbol(), group_thousands(self.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

/// A VAT rate expressed as a fraction (`0.13` for 13%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Nepal VAT, applied to every catalogue price.
    pub const NEPAL_VAT: Self = Self(Decimal::from_parts(13, 0, 0, false, 2));

    /// The rate as a fraction.
    #[must_use]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }
}

/// ISO 4217 currency codes accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    NPR,
}

impl CurrencyCode {
    /// Display prefix for amounts.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::NPR => "Rs.",
        }
    }
}

/// Render `amount` with at most two decimals and comma-grouped thousands.
fn group_thousands(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let text = rounded.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction:0<2}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_nepal_vat_is_thirteen_percent() {
        assert_eq!(TaxRate::NEPAL_VAT.fraction(), Decimal::new(13, 2));
    }

    #[test]
    fn test_included_tax_extracts_by_division() {
        let price = Price::from_whole(1130);
        let tax = price.included_tax(TaxRate::NEPAL_VAT);
        assert_eq!(tax.round_whole(), Price::from_whole(130));
    }

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::from_whole(800).times(2), Price::from_whole(100)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_whole(1700));
    }

    #[test]
    fn test_overflow_is_detected_not_panicking() {
        let huge = Price::new(Decimal::MAX);
        assert_eq!(huge.checked_times(2), None);
        assert_eq!(huge.checked_add(Price::from_whole(1)), None);
        assert_eq!(huge.times(2), huge);
        assert_eq!(huge + Price::from_whole(1), huge);
        assert_eq!(
            Price::from_whole(800).checked_times(2),
            Some(Price::from_whole(1600))
        );
    }

    #[test]
    fn test_round_whole_midpoint_goes_up() {
        assert_eq!(Price::new(Decimal::new(125, 1)).round_whole(), Price::from_whole(13));
        assert_eq!(Price::new(Decimal::new(124, 1)).round_whole(), Price::from_whole(12));
    }

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::from_whole(1700).display(), "Rs. 1,700");
        assert_eq!(Price::from_whole(1_234_567).display(), "Rs. 1,234,567");
        assert_eq!(Price::from_whole(0).display(), "Rs. 0");
        assert_eq!(Price::new(Decimal::new(1250, 2)).display(), "Rs. 12.50");
    }

    #[test]
    fn test_deserializes_json_numbers() {
        let price: Price = serde_json::from_str("1000").unwrap();
        assert_eq!(price, Price::from_whole(1000));

        let price: Price = serde_json::from_str("99.5").unwrap();
        assert_eq!(price, Price::new(Decimal::new(995, 1)));
    }
}
