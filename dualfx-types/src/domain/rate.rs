//! Exchange rate snapshots and the transaction-scoped rate lock.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dualfx_rates::Rate;

use super::ids::{TransactionContext, UserId};

/// Where a rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    ReserveBank,
    Manual,
    ClinicRate,
    Interbank,
    Parallel,
}

impl AsRef<str> for RateSource {
    fn as_ref(&self) -> &str {
        match self {
            Self::ReserveBank => "reserve_bank",
            Self::Manual => "manual",
            Self::ClinicRate => "clinic_rate",
            Self::Interbank => "interbank",
            Self::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for RateSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "reserve_bank" | "rbz" => Ok(Self::ReserveBank),
            "manual" => Ok(Self::Manual),
            "clinic_rate" | "clinic" => Ok(Self::ClinicRate),
            "interbank" => Ok(Self::Interbank),
            "parallel" => Ok(Self::Parallel),
            _ => Err(format!("Unknown rate source: {}", s)),
        }
    }
}

/// Whether a rate is advisory (live), binding (locked), or degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStatus {
    Live,
    Locked,
    Stale,
    Offline,
}

/// A rate as published to screens.
///
/// `previous_rate` and `variance` are for the live-update display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate: Rate,
    pub source: RateSource,
    pub status: RateStatus,
    pub timestamp: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub previous_rate: Option<Rate>,
    pub variance: Option<Decimal>,
}

impl ExchangeRate {
    /// A freshly fetched rate, superseding `previous` if there was one.
    pub fn live(
        rate: Rate,
        source: RateSource,
        timestamp: DateTime<Utc>,
        validity: Duration,
        previous: Option<&ExchangeRate>,
    ) -> Self {
        let previous_rate = previous.map(|p| p.rate);
        Self {
            rate,
            source,
            status: RateStatus::Live,
            timestamp,
            valid_until: timestamp + validity,
            previous_rate,
            variance: previous_rate.and_then(|p| rate.variance_from(p)),
        }
    }

    /// Status as of `now`; a live rate past its window reads as stale.
    pub fn status_at(&self, now: DateTime<Utc>) -> RateStatus {
        match self.status {
            RateStatus::Live if now > self.valid_until => RateStatus::Stale,
            status => status,
        }
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == RateStatus::Stale
    }

    /// Keeps the value but flags that the feed could not be reached.
    pub fn mark_offline(&mut self) {
        if self.status == RateStatus::Live {
            self.status = RateStatus::Offline;
        }
    }
}

/// A rate frozen for one transaction.
///
/// Fields are private: once created a lock never changes. Releasing it means
/// dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLock {
    locked_rate: Rate,
    source: RateSource,
    locked_at: DateTime<Utc>,
    locked_by: UserId,
    reason: Option<String>,
    context: TransactionContext,
}

impl RateLock {
    pub fn new(
        locked_rate: Rate,
        source: RateSource,
        locked_at: DateTime<Utc>,
        locked_by: UserId,
        reason: Option<String>,
        context: TransactionContext,
    ) -> Self {
        Self {
            locked_rate,
            source,
            locked_at,
            locked_by,
            reason,
            context,
        }
    }

    pub fn locked_rate(&self) -> Rate {
        self.locked_rate
    }
    pub fn source(&self) -> RateSource {
        self.source
    }
    pub fn locked_at(&self) -> DateTime<Utc> {
        self.locked_at
    }
    pub fn locked_by(&self) -> &UserId {
        &self.locked_by
    }
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
    pub fn context(&self) -> &TransactionContext {
        &self.context
    }
    pub fn is_manual(&self) -> bool {
        self.source == RateSource::Manual
    }

    /// The locked rate as an [`ExchangeRate`] for display.
    pub fn as_exchange_rate(&self) -> ExchangeRate {
        ExchangeRate {
            rate: self.locked_rate,
            source: self.source,
            status: RateStatus::Locked,
            timestamp: self.locked_at,
            valid_until: self.locked_at,
            previous_rate: None,
            variance: None,
        }
    }
}
