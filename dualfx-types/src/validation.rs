//! Validation rules for manual rates, medical-aid awards and shortfall payments.
//!
//! Every rule returns the first violation found, in the order listed on each
//! function, so a screen can attach exactly one message to the offending field.

use rust_decimal::Decimal;

use dualfx_rates::{
    CurrencyCode, Equivalents, MONEY_DP, Rate, both_equivalents, decimal_places,
    has_money_precision, round_money,
};

use crate::config::RateLockConfig;
use crate::domain::{MonetaryAmount, Shortfall};
use crate::error::{DomainError, InvalidRateReason, LockStateError};

/// Largest difference tolerated between a payment and the shortfall it settles.
pub const PAYMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Checks a manually entered rate against desk policy.
///
/// 1. positive
/// 2. at most two decimal places
/// 3. inside `[min_manual_rate, max_manual_rate]`
/// 4. within `max_variance_percent` of the live rate, when one exists
pub fn validate_manual_rate(
    candidate: Decimal,
    live: Option<Rate>,
    config: &RateLockConfig,
) -> Result<Rate, DomainError> {
    if candidate <= Decimal::ZERO {
        return Err(DomainError::invalid_rate(
            candidate,
            InvalidRateReason::NonPositive,
        ));
    }
    if decimal_places(candidate) > MONEY_DP {
        return Err(DomainError::invalid_rate(
            candidate,
            InvalidRateReason::TooPrecise,
        ));
    }
    if candidate < config.min_manual_rate || candidate > config.max_manual_rate {
        return Err(DomainError::invalid_rate(
            candidate,
            InvalidRateReason::OutOfBand {
                min: config.min_manual_rate,
                max: config.max_manual_rate,
            },
        ));
    }

    let rate = Rate::new(candidate)?;

    if let Some(live) = live {
        // Compare unrounded: 10.001% must not pass a 10% limit.
        let deviation = rate.change_from(live);
        if deviation.is_none_or(|d| d.abs() > config.max_variance_percent) {
            return Err(DomainError::invalid_rate(
                candidate,
                InvalidRateReason::ExcessiveVariance {
                    live,
                    variance: deviation.map_or(Decimal::MAX, round_money),
                    max: config.max_variance_percent,
                },
            ));
        }
    }

    Ok(rate)
}

/// Trims a user-supplied reason, rejecting blanks.
pub fn require_reason(reason: Option<&str>) -> Result<String, DomainError> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(LockStateError::ReasonRequired.into()),
    }
}

/// Checks a medical-aid award against the order it belongs to.
///
/// The order's USD total is the ceiling whatever currency the award is in.
///
/// 1. `NegativeAmount`
/// 2. `AmountOutOfRange` when it cannot be converted at `rate`
/// 3. `ZeroAmount` when the USD equivalent is zero
/// 4. `ExceedsOrderTotal`
/// 5. `PrecisionError`
///
/// Returns the award's equivalents at `rate` on success.
pub fn validate_award(
    amount: Decimal,
    currency: CurrencyCode,
    order_total: &Equivalents,
    rate: Rate,
) -> Result<Equivalents, DomainError> {
    if amount < Decimal::ZERO {
        return Err(DomainError::NegativeAmount);
    }

    let equivalents = both_equivalents(amount, currency, rate)?;

    if round_money(equivalents.usd).is_zero() {
        return Err(DomainError::ZeroAmount);
    }
    if equivalents.usd > order_total.usd {
        return Err(DomainError::ExceedsOrderTotal {
            award_usd: equivalents.usd,
            order_total_usd: order_total.usd,
        });
    }
    if !has_money_precision(amount) {
        return Err(DomainError::PrecisionError { value: amount });
    }

    Ok(equivalents)
}

/// Checks a shortfall payment attempt.
///
/// 1. `NothingToPay` when the shortfall is zero
/// 2. `AlreadyPaid` when it has been paid before
/// 3. `ZeroOrNegativePayment`
pub fn validate_shortfall_payment(
    shortfall: &Shortfall,
    payment: Decimal,
) -> Result<(), DomainError> {
    if shortfall.amount <= Decimal::ZERO {
        return Err(DomainError::NothingToPay);
    }
    if let Some(paid_at) = shortfall.paid_at {
        return Err(DomainError::AlreadyPaid { paid_at });
    }
    if payment <= Decimal::ZERO {
        return Err(DomainError::ZeroOrNegativePayment);
    }
    Ok(())
}

/// Checks that a payment settles the outstanding shortfall, converting it at
/// the award's rate when it is tendered in the other currency.
pub fn validate_payment_matches(
    shortfall: &Shortfall,
    payment: &MonetaryAmount,
    rate: Rate,
) -> Result<Equivalents, DomainError> {
    let equivalents = payment.equivalents(rate)?;
    let tendered = equivalents.in_currency(shortfall.currency);

    if (tendered - shortfall.amount).abs() > PAYMENT_TOLERANCE {
        return Err(DomainError::PaymentMismatch {
            expected: shortfall.amount,
            got: tendered,
            currency: shortfall.currency,
        });
    }
    Ok(equivalents)
}
