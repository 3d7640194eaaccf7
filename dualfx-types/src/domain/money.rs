//! Monetary value with a declared currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use dualfx_rates::{CurrencyCode, Equivalents, Rate, both_equivalents, has_money_precision};

use crate::error::DomainError;

/// An amount in a declared currency.
///
/// Equivalents in the other currency are never stored alongside it as ground
/// truth; they are recomputed from `(amount, currency, rate)` on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    currency: CurrencyCode,
}

impl MonetaryAmount {
    /// Creates a new amount.
    ///
    /// # Validation
    /// - must not be negative
    /// - at most 2 decimal places
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::NegativeAmount);
        }
        if !has_money_precision(amount) {
            return Err(DomainError::PrecisionError { value: amount });
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// USD and ZWG equivalents at the given rate.
    pub fn equivalents(&self, rate: Rate) -> Result<Equivalents, DomainError> {
        Ok(both_equivalents(self.amount, self.currency, rate)?)
    }

    /// This amount expressed in `currency` at the given rate.
    pub fn in_currency(&self, currency: CurrencyCode, rate: Rate) -> Result<Decimal, DomainError> {
        Ok(self.equivalents(rate)?.in_currency(currency))
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_creation() {
        let money = MonetaryAmount::new(dec!(100.50), CurrencyCode::USD).unwrap();
        assert_eq!(money.amount(), dec!(100.50));
        assert_eq!(money.currency(), CurrencyCode::USD);
    }

    #[test]
    fn test_negative_amount_fails() {
        let result = MonetaryAmount::new(dec!(-1), CurrencyCode::USD);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_three_decimals_fail() {
        let result = MonetaryAmount::new(dec!(10.555), CurrencyCode::ZWG);
        assert!(matches!(result, Err(DomainError::PrecisionError { .. })));
    }

    #[test]
    fn test_equivalents_follow_rate() {
        let rate = Rate::new(dec!(32.5)).unwrap();
        let money = MonetaryAmount::new(dec!(100), CurrencyCode::USD).unwrap();
        let eq = money.equivalents(rate).unwrap();
        assert_eq!(eq.usd, dec!(100));
        assert_eq!(eq.zwg, dec!(3250.00));
        assert_eq!(money.in_currency(CurrencyCode::ZWG, rate), Ok(dec!(3250)));
    }

    #[test]
    fn test_unconvertible_amount_is_an_error() {
        let rate = Rate::new(dec!(32.5)).unwrap();
        let money = MonetaryAmount::new(Decimal::MAX, CurrencyCode::USD).unwrap();
        assert!(matches!(
            money.equivalents(rate),
            Err(DomainError::AmountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_display() {
        let money = MonetaryAmount::new(dec!(3250), CurrencyCode::ZWG).unwrap();
        assert_eq!(money.to_string(), "ZWG 3250.00");
    }
}
