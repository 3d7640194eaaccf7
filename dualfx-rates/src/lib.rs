//! Dual-Currency Conversion Engine with Macro-Based Currency Generation
//!
//! Every USD/ZWG amount shown or stored by the point of sale is derived here,
//! from an explicit [`Rate`] (ZWG per 1 USD). Nothing in this crate looks up a
//! "current" rate: the caller always passes the rate that is in effect for the
//! transaction, so the same `(amount, currency, rate)` triple always produces
//! the same result.
//!
//! Currencies are defined declaratively with a macro that generates the marker
//! types, the runtime [`CurrencyCode`] enum and its parser.
//!
//! # Example
//! ```
//! use dualfx_rates::{both_equivalents, CurrencyCode, Money, Rate, USD, ZWG};
//! use rust_decimal::Decimal;
//!
//! let rate = Rate::new(Decimal::new(325, 1)).unwrap(); // 32.5 ZWG per USD
//!
//! // Type-safe conversion
//! let dollars = Money::<USD>::new(Decimal::new(100, 0));
//! let zig: Money<ZWG> = dollars.convert(rate).unwrap();
//! assert_eq!(zig.amount(), Decimal::new(325000, 2));
//!
//! // Runtime conversion
//! let eq = both_equivalents(Decimal::new(7000, 0), CurrencyCode::ZWG, rate).unwrap();
//! assert_eq!(eq.usd, Decimal::new(21538, 2));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places carried by every monetary amount and every exchange rate.
pub const MONEY_DP: u32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Structural faults in rates and amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Exchange rate must be positive, got {0}")]
    NonPositive(Decimal),

    #[error("{value} has more than {max_dp} decimal places")]
    TooPrecise { value: Decimal, max_dp: u32 },

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("{amount} at a rate of {rate} is too large to convert")]
    Overflow { amount: Decimal, rate: Decimal },
}

// ─────────────────────────────────────────────────────────────────────────────
// Precision helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Number of significant decimal places (`10.50` has one, `10.555` has three).
pub fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// True when `value` can be represented with at most [`MONEY_DP`] places.
pub fn has_money_precision(value: Decimal) -> bool {
    decimal_places(value) <= MONEY_DP
}

/// Half-up rounding to two places, applied at the point of conversion.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate
// ─────────────────────────────────────────────────────────────────────────────

/// A structurally sane exchange rate: ZWG units per 1 USD, positive, at most
/// two decimal places.
///
/// Business limits (absolute band, variance against the live feed) are policy
/// and live with the rate lock, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(value: Decimal) -> Result<Self, RateError> {
        if value <= Decimal::ZERO {
            return Err(RateError::NonPositive(value));
        }
        if !has_money_precision(value) {
            return Err(RateError::TooPrecise {
                value,
                max_dp: MONEY_DP,
            });
        }
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Signed percentage change from `previous` to `self`, unrounded.
    ///
    /// `None` when the change is too large to represent.
    pub fn change_from(&self, previous: Rate) -> Option<Decimal> {
        (self.0 - previous.0)
            .checked_div(previous.0)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }

    /// [`Rate::change_from`] rounded to 2 dp.
    pub fn variance_from(&self, previous: Rate) -> Option<Decimal> {
        self.change_from(previous).map(round_money)
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Currency Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait defining currency metadata.
pub trait Currency: Default + Clone + Copy + Send + Sync + 'static {
    const CODE: &'static str;
    const SYMBOL: &'static str;
    const MINOR_UNIT: &'static str;
    const RUNTIME: CurrencyCode;
}

// ─────────────────────────────────────────────────────────────────────────────
// Type-Safe Money
// ─────────────────────────────────────────────────────────────────────────────

/// An amount tagged with its currency at the type level.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Money<C: Currency> {
    amount: Decimal,
    _currency: PhantomData<C>,
}

impl<C: Currency> Money<C> {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            _currency: PhantomData,
        }
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
    pub fn currency_code(&self) -> CurrencyCode {
        C::RUNTIME
    }

    /// Converts at the given rate, rounding half-up to two places.
    pub fn convert<T: Currency>(self, rate: Rate) -> Result<Money<T>, RateError> {
        convert(self.amount, C::RUNTIME, T::RUNTIME, rate).map(Money::new)
    }
}

impl<C: Currency> Default for Money<C> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<C: Currency> fmt::Debug for Money<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Money {{ amount: {}, currency: {} }}",
            self.amount,
            C::CODE
        )
    }
}

impl<C: Currency> fmt::Display for Money<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-{}{:.2}", C::SYMBOL, self.amount.abs())
        } else {
            write!(f, "{}{:.2}", C::SYMBOL, self.amount)
        }
    }
}

impl<C: Currency> Add for Money<C> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.amount + rhs.amount)
    }
}

impl<C: Currency> Sub for Money<C> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.amount - rhs.amount)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// THE MACRO: Defines all currencies, CurrencyCode enum, and runtime parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Macro to define currencies with auto-generated types and runtime codes.
///
/// # Syntax
/// ```ignore
/// define_currencies! {
///     CurrencyName => ("CODE", "SYMBOL", "minor_unit", ["ALIAS", ...]),
/// }
/// ```
#[macro_export]
macro_rules! define_currencies {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $minor:literal, [$($alias:literal),*])
        ),* $(,)?
    ) => {
        $(
            #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name;

            impl Currency for $name {
                const CODE: &'static str = $code;
                const SYMBOL: &'static str = $symbol;
                const MINOR_UNIT: &'static str = $minor;
                const RUNTIME: CurrencyCode = CurrencyCode::$name;
            }
        )*

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum CurrencyCode {
            $($name),*
        }

        impl CurrencyCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $symbol),*
                }
            }

            pub fn all() -> &'static [CurrencyCode] {
                &[$(CurrencyCode::$name),*]
            }
        }

        impl std::fmt::Display for CurrencyCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for CurrencyCode {
            type Err = RateError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($code $(| $alias)* => Ok(CurrencyCode::$name),)*
                    _ => Err(RateError::UnknownCurrency(s.to_string())),
                }
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// CURRENCY DEFINITIONS
// ─────────────────────────────────────────────────────────────────────────────

define_currencies! {
    USD => ("USD", "$", "cent", []),
    ZWG => ("ZWG", "ZiG", "cent", ["ZWL"]),
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Converts `amount` from one currency to another at `rate` (ZWG per USD).
///
/// Same-currency conversion is the identity. Fails with
/// [`RateError::Overflow`] when the result does not fit a `Decimal`.
pub fn convert(
    amount: Decimal,
    from: CurrencyCode,
    to: CurrencyCode,
    rate: Rate,
) -> Result<Decimal, RateError> {
    let converted = match (from, to) {
        (CurrencyCode::USD, CurrencyCode::USD) | (CurrencyCode::ZWG, CurrencyCode::ZWG) => {
            return Ok(amount);
        }
        (CurrencyCode::ZWG, CurrencyCode::USD) => amount.checked_div(rate.value()),
        (CurrencyCode::USD, CurrencyCode::ZWG) => amount.checked_mul(rate.value()),
    };
    converted.map(round_money).ok_or(RateError::Overflow {
        amount,
        rate: rate.value(),
    })
}

pub fn to_usd(amount: Decimal, currency: CurrencyCode, rate: Rate) -> Result<Decimal, RateError> {
    convert(amount, currency, CurrencyCode::USD, rate)
}

pub fn to_zwg(amount: Decimal, currency: CurrencyCode, rate: Rate) -> Result<Decimal, RateError> {
    convert(amount, currency, CurrencyCode::ZWG, rate)
}

/// The USD and ZWG views of one amount at one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equivalents {
    #[serde(with = "rust_decimal::serde::str")]
    pub usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub zwg: Decimal,
}

impl Equivalents {
    /// The equivalent expressed in `currency`.
    pub fn in_currency(&self, currency: CurrencyCode) -> Decimal {
        match currency {
            CurrencyCode::USD => self.usd,
            CurrencyCode::ZWG => self.zwg,
        }
    }
}

/// Both equivalents, each derived directly from the original amount so that
/// neither side accumulates a second rounding step.
pub fn both_equivalents(
    amount: Decimal,
    currency: CurrencyCode,
    rate: Rate,
) -> Result<Equivalents, RateError> {
    Ok(Equivalents {
        usd: to_usd(amount, currency, rate)?,
        zwg: to_zwg(amount, currency, rate)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
