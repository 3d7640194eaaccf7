//! Requests into the services and events published to subscribers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dualfx_rates::{CurrencyCode, Rate};

use crate::domain::{AwardId, ExchangeRate, OrderId, RateSource, TransactionContext, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Rate lock
// ─────────────────────────────────────────────────────────────────────────────

/// Request to lock a rate for the current transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    /// Lock this value instead of the live rate. Always needs a reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub performed_by: UserId,
    #[serde(default)]
    pub context: TransactionContext,
}

impl LockRequest {
    /// Lock the current live rate.
    pub fn live(performed_by: impl Into<UserId>, context: TransactionContext) -> Self {
        Self {
            manual_rate: None,
            reason: None,
            performed_by: performed_by.into(),
            context,
        }
    }

    /// Lock a manually entered rate.
    pub fn manual(
        rate: Decimal,
        reason: impl Into<String>,
        performed_by: impl Into<UserId>,
        context: TransactionContext,
    ) -> Self {
        Self {
            manual_rate: Some(rate),
            reason: Some(reason.into()),
            performed_by: performed_by.into(),
            context,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claims
// ─────────────────────────────────────────────────────────────────────────────

/// Request to record a medical-aid award against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAwardRequest {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_reference: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: CurrencyCode,
    #[serde(with = "rust_decimal::serde::str")]
    pub order_total: Decimal,
    pub order_currency: CurrencyCode,
}

/// Request to record the patient's shortfall payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortfallPaymentRequest {
    pub award_id: AwardId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub recorded_by: UserId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ─────────────────────────────────────────────────────────────────────────────

/// Change notifications from the rate lock service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RateEvent {
    /// A new live rate was published.
    LiveRateUpdated(ExchangeRate),
    /// A rate was frozen for a transaction.
    Locked {
        rate: Rate,
        currency: CurrencyCode,
        source: RateSource,
        locked_at: DateTime<Utc>,
    },
    Unlocked {
        previous_rate: Rate,
        reason: String,
    },
    /// A refresh failed; the last good rate is still displayed.
    RefreshFailed { source: RateSource, error: String },
}
