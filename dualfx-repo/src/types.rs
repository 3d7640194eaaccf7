//! Database row types and their conversion into domain types.
//!
//! SQLite stores identifiers, decimals and timestamps as TEXT.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use dualfx_types::{
    Award, OrderId, Rate, RateAuditEntry, RepoError, TransactionId, UserId,
    domain::AuditEntryId,
};

/// Audit log row from database.
#[derive(FromRow)]
pub struct DbAuditEntry {
    pub sequence: i64,
    pub id: String,
    pub previous_rate: Option<String>,
    pub new_rate: String,
    pub source: String,
    pub action: String,
    pub performed_by: String,
    pub timestamp: String,
    pub reason: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub prev_hash: String,
    pub hash: String,
}

impl DbAuditEntry {
    pub fn into_domain(self) -> Result<RateAuditEntry, RepoError> {
        Ok(RateAuditEntry {
            id: AuditEntryId::from_str(&self.id).map_err(|e| corrupt("id", e))?,
            sequence: u64::try_from(self.sequence).map_err(|e| corrupt("sequence", e))?,
            previous_rate: self.previous_rate.as_deref().map(parse_rate).transpose()?,
            new_rate: parse_rate(&self.new_rate)?,
            source: self.source.parse().map_err(|e| corrupt("source", e))?,
            action: self.action.parse().map_err(|e| corrupt("action", e))?,
            performed_by: UserId::from(self.performed_by),
            timestamp: parse_timestamp(&self.timestamp)?,
            reason: self.reason,
            transaction_id: self
                .transaction_id
                .as_deref()
                .map(TransactionId::from_str)
                .transpose()
                .map_err(|e| corrupt("transaction_id", e))?,
            order_id: self.order_id.map(OrderId::from),
            prev_hash: self.prev_hash,
            hash: self.hash,
        })
    }
}

/// Award row from database. The full award is kept as JSON; `status` is a
/// copy used for compare-and-set updates.
#[derive(FromRow)]
pub struct DbAward {
    pub payload: String,
}

impl DbAward {
    pub fn into_domain(self) -> Result<Award, RepoError> {
        serde_json::from_str(&self.payload).map_err(|e| corrupt("payload", e))
    }
}

pub fn award_payload(award: &Award) -> Result<String, RepoError> {
    serde_json::to_string(award).map_err(|e| RepoError::Database(e.to_string()))
}

/// Timestamps keep nanoseconds so audit hashes still verify after a round trip.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt("timestamp", e))
}

fn parse_rate(s: &str) -> Result<Rate, RepoError> {
    let value = Decimal::from_str(s).map_err(|e| corrupt("rate", e))?;
    Rate::new(value).map_err(|e| corrupt("rate", e))
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> RepoError {
    RepoError::Database(format!("Invalid {} in row: {}", column, err))
}
