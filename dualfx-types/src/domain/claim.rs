//! Medical-aid awards and the patient shortfall.
//!
//! ```text
//! awarded ──► shortfall_paid ──► settled
//!    │
//!    └──────► rejected
//! ```
//!
//! `settled` and `rejected` are terminal. No transition skips a state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dualfx_rates::{CurrencyCode, Equivalents, Rate};

use super::ids::{AwardId, OrderId, UserId};
use super::money::MonetaryAmount;
use crate::error::DomainError;
use crate::validation::{validate_award, validate_payment_matches, validate_shortfall_payment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardStatus {
    Awarded,
    ShortfallPaid,
    Settled,
    Rejected,
}

impl AwardStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: AwardStatus) -> bool {
        matches!(
            (self, next),
            (Self::Awarded, Self::ShortfallPaid)
                | (Self::Awarded, Self::Rejected)
                | (Self::ShortfallPaid, Self::Settled)
        )
    }
}

impl AsRef<str> for AwardStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Awarded => "awarded",
            Self::ShortfallPaid => "shortfall_paid",
            Self::Settled => "settled",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AwardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for AwardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awarded" => Ok(Self::Awarded),
            "shortfall_paid" => Ok(Self::ShortfallPaid),
            "settled" => Ok(Self::Settled),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown award status: {}", s)),
        }
    }
}

/// The recorded payment that cleared a shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortfallPayment {
    pub amount: MonetaryAmount,
    pub equivalents: Equivalents,
    pub paid_at: DateTime<Utc>,
    pub recorded_by: UserId,
}

/// What the patient owes after the award, in the order's currency.
///
/// Computed once when the award is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub usd: Decimal,
    pub zwg: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment: Option<ShortfallPayment>,
}

impl Shortfall {
    fn between(order_total: &MonetaryAmount, order: Equivalents, award: Equivalents) -> Self {
        // Cross-currency rounding can leave the ZWG side a few cents negative
        // when the award equals the order total.
        let usd = (order.usd - award.usd).max(Decimal::ZERO);
        let zwg = (order.zwg - award.zwg).max(Decimal::ZERO);
        let currency = order_total.currency();
        let amount = match currency {
            CurrencyCode::USD => usd,
            CurrencyCode::ZWG => zwg,
        };
        Self {
            currency,
            amount,
            usd,
            zwg,
            paid_at: None,
            payment: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }
}

/// A medical-aid award against one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub id: AwardId,
    pub order_id: OrderId,
    pub claim_reference: Option<String>,
    /// The amount as the provider committed it.
    pub amount: MonetaryAmount,
    pub equivalents: Equivalents,
    /// The locked rate every equivalent on this award was derived from.
    pub rate: Rate,
    pub order_total: MonetaryAmount,
    pub order_equivalents: Equivalents,
    pub shortfall: Shortfall,
    pub status: AwardStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Award {
    /// Records a new award after validating it against the order total.
    ///
    /// An award covering the whole order leaves nothing to pay and starts in
    /// `shortfall_paid`.
    pub fn record(
        order_id: OrderId,
        claim_reference: Option<String>,
        amount: Decimal,
        currency: CurrencyCode,
        order_total: MonetaryAmount,
        rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let order_equivalents = order_total.equivalents(rate)?;
        let equivalents = validate_award(amount, currency, &order_equivalents, rate)?;
        let amount = MonetaryAmount::new(amount, currency)?;
        let shortfall = Shortfall::between(&order_total, order_equivalents, equivalents);

        let status = if shortfall.amount.is_zero() {
            AwardStatus::ShortfallPaid
        } else {
            AwardStatus::Awarded
        };

        Ok(Self {
            id: AwardId::new(),
            order_id,
            claim_reference,
            amount,
            equivalents,
            rate,
            order_total,
            order_equivalents,
            shortfall,
            status,
            created_at: now,
            settled_at: None,
            rejection_reason: None,
        })
    }

    fn transition(&mut self, next: AwardStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Records the patient's shortfall payment. Succeeds at most once.
    pub fn apply_shortfall_payment(
        &mut self,
        amount: Decimal,
        currency: CurrencyCode,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        validate_shortfall_payment(&self.shortfall, amount)?;
        if !self.status.can_transition_to(AwardStatus::ShortfallPaid) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: AwardStatus::ShortfallPaid,
            });
        }

        let payment = MonetaryAmount::new(amount, currency)?;
        let equivalents = validate_payment_matches(&self.shortfall, &payment, self.rate)?;

        self.transition(AwardStatus::ShortfallPaid)?;
        self.shortfall.paid_at = Some(now);
        self.shortfall.payment = Some(ShortfallPayment {
            amount: payment,
            equivalents,
            paid_at: now,
            recorded_by,
        });
        Ok(())
    }

    /// Marks the provider's disbursement as received.
    pub fn mark_settled(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == AwardStatus::Settled {
            return Err(DomainError::AlreadySettled(self.id));
        }
        self.transition(AwardStatus::Settled)?;
        self.settled_at = Some(now);
        Ok(())
    }

    /// The provider withdrew the award before any shortfall was collected.
    pub fn reject(&mut self, reason: &str) -> Result<(), DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::ValidationError(
                "A rejection reason is required".into(),
            ));
        }
        self.transition(AwardStatus::Rejected)?;
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }
}
