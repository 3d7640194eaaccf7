//! Error types for the rate desk.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use dualfx_rates::{CurrencyCode, Rate, RateError};

use crate::domain::{AwardId, AwardStatus};
use crate::ports::ProviderError;

/// Why a candidate exchange rate was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRateReason {
    #[error("rate must be positive")]
    NonPositive,

    #[error("rate may carry at most 2 decimal places")]
    TooPrecise,

    #[error("rate is outside the allowed band {min}..={max}")]
    OutOfBand { min: Decimal, max: Decimal },

    #[error("rate deviates {variance}% from the live rate {live} (limit {max}%)")]
    ExcessiveVariance {
        live: Rate,
        variance: Decimal,
        max: Decimal,
    },
}

/// Illegal operations on the rate lock state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockStateError {
    #[error("a rate of {0} is already locked for this transaction")]
    AlreadyLocked(Rate),

    #[error("no rate is locked")]
    NotLocked,

    #[error("a reason is required")]
    ReasonRequired,

    #[error("no live rate has been fetched yet")]
    NoLiveRate,
}

/// Domain-level errors (business rule violations).
///
/// Every variant is recoverable: the transaction in progress stays editable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid exchange rate {rate}: {reason}")]
    InvalidRate {
        rate: Decimal,
        reason: InvalidRateReason,
    },

    #[error("Rate lock: {0}")]
    LockState(#[from] LockStateError),

    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Award of USD {award_usd} exceeds the order total of USD {order_total_usd}")]
    ExceedsOrderTotal {
        award_usd: Decimal,
        order_total_usd: Decimal,
    },

    #[error("{value} has more than 2 decimal places")]
    PrecisionError { value: Decimal },

    #[error("{value} is too large to convert at a rate of {rate}")]
    AmountOutOfRange { value: Decimal, rate: Decimal },

    #[error("There is no shortfall to pay")]
    NothingToPay,

    #[error("Shortfall was already paid at {paid_at}")]
    AlreadyPaid { paid_at: DateTime<Utc> },

    #[error("Payment amount must be greater than zero")]
    ZeroOrNegativePayment,

    #[error("Payment of {currency} {got} does not match the outstanding {currency} {expected}")]
    PaymentMismatch {
        expected: Decimal,
        got: Decimal,
        currency: CurrencyCode,
    },

    #[error("Award not found: {0}")]
    AwardNotFound(AwardId),

    #[error("Award {0} is already settled")]
    AlreadySettled(AwardId),

    #[error("Award cannot move from {from} to {to}")]
    InvalidTransition { from: AwardStatus, to: AwardStatus },

    #[error("Audit chain broken at entry {sequence}")]
    AuditChainBroken { sequence: u64 },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    pub(crate) fn invalid_rate(rate: Decimal, reason: InvalidRateReason) -> Self {
        DomainError::InvalidRate { rate, reason }
    }

    /// Stable discriminant for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidRate { .. } => "InvalidRate",
            DomainError::LockState(_) => "LockStateError",
            DomainError::NegativeAmount => "NegativeAmount",
            DomainError::ZeroAmount => "ZeroAmount",
            DomainError::ExceedsOrderTotal { .. } => "ExceedsOrderTotal",
            DomainError::PrecisionError { .. } => "PrecisionError",
            DomainError::AmountOutOfRange { .. } => "AmountOutOfRange",
            DomainError::NothingToPay => "NothingToPay",
            DomainError::AlreadyPaid { .. } => "AlreadyPaid",
            DomainError::ZeroOrNegativePayment => "ZeroOrNegativePayment",
            DomainError::PaymentMismatch { .. } => "PaymentMismatch",
            DomainError::AwardNotFound(_) => "AwardNotFound",
            DomainError::AlreadySettled(_) => "AlreadySettled",
            DomainError::InvalidTransition { .. } => "InvalidTransition",
            DomainError::AuditChainBroken { .. } => "AuditChainBroken",
            DomainError::ValidationError(_) => "ValidationError",
        }
    }

    /// The form field an inline message should attach to.
    pub fn field(&self) -> &'static str {
        match self {
            DomainError::InvalidRate { .. } => "rate",
            DomainError::LockState(LockStateError::ReasonRequired) => "reason",
            DomainError::LockState(_) => "rate",
            DomainError::NegativeAmount
            | DomainError::ZeroAmount
            | DomainError::ExceedsOrderTotal { .. }
            | DomainError::PrecisionError { .. } => "award_amount",
            DomainError::AmountOutOfRange { .. } => "amount",
            DomainError::NothingToPay
            | DomainError::AlreadyPaid { .. }
            | DomainError::ZeroOrNegativePayment
            | DomainError::PaymentMismatch { .. } => "payment_amount",
            DomainError::AwardNotFound(_)
            | DomainError::AlreadySettled(_)
            | DomainError::InvalidTransition { .. } => "award",
            DomainError::AuditChainBroken { .. } => "audit",
            DomainError::ValidationError(_) => "form",
        }
    }
}

impl From<RateError> for DomainError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::NonPositive(rate) => {
                DomainError::invalid_rate(rate, InvalidRateReason::NonPositive)
            }
            RateError::TooPrecise { value, .. } => {
                DomainError::invalid_rate(value, InvalidRateReason::TooPrecise)
            }
            RateError::UnknownCurrency(code) => {
                DomainError::ValidationError(format!("Unknown currency: {}", code))
            }
            RateError::Overflow { amount, rate } => DomainError::AmountOutOfRange {
                value: amount,
                rate,
            },
        }
    }
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors returned by the services.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Rate provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Concurrent update: {0}")]
    Conflict(String),
}

impl AppError {
    /// The domain error behind this failure, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            AppError::Domain(e) => e.field(),
            AppError::Provider(_) => "rate",
            AppError::Storage(_) | AppError::Conflict(_) => "form",
        }
    }

    /// Domain rejections leave the transaction editable; storage faults may not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Storage(_))
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => AppError::Domain(e),
            RepoError::NotFound => AppError::Storage("Entity not found".into()),
            RepoError::Database(e) => AppError::Storage(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        AppError::Domain(err.into())
    }
}
