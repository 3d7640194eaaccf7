//! Append-only rate audit log entries.
//!
//! Entries are hash-chained: each one commits to the hash of the entry before
//! it, so an edited or deleted row is detectable by [`verify_chain`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use dualfx_rates::Rate;

use super::ids::{AuditEntryId, OrderId, TransactionContext, TransactionId, UserId};
use super::rate::RateSource;
use crate::error::DomainError;

/// `prev_hash` of the first entry in a log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Lock,
    Unlock,
    Update,
    ManualOverride,
}

impl AsRef<str> for AuditAction {
    fn as_ref(&self) -> &str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Update => "update",
            Self::ManualOverride => "manual_override",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lock" => Ok(Self::Lock),
            "unlock" => Ok(Self::Unlock),
            "update" => Ok(Self::Update),
            "manual_override" => Ok(Self::ManualOverride),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// An audit entry before the log has assigned its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub previous_rate: Option<Rate>,
    pub new_rate: Rate,
    pub source: RateSource,
    pub action: AuditAction,
    pub performed_by: UserId,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub context: TransactionContext,
}

impl NewAuditEntry {
    /// Fixes the entry at `sequence`, chained onto `prev_hash`.
    pub fn seal(self, sequence: u64, prev_hash: &str) -> RateAuditEntry {
        let mut entry = RateAuditEntry {
            id: AuditEntryId::new(),
            sequence,
            previous_rate: self.previous_rate,
            new_rate: self.new_rate,
            source: self.source,
            action: self.action,
            performed_by: self.performed_by,
            timestamp: self.timestamp,
            reason: self.reason,
            transaction_id: self.context.transaction_id,
            order_id: self.context.order_id,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }
}

/// One immutable row of the rate audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateAuditEntry {
    pub id: AuditEntryId,
    /// 1-based position in the log.
    pub sequence: u64,
    pub previous_rate: Option<Rate>,
    pub new_rate: Rate,
    pub source: RateSource,
    pub action: AuditAction,
    pub performed_by: UserId,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub order_id: Option<OrderId>,
    pub prev_hash: String,
    pub hash: String,
}

impl RateAuditEntry {
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_uuid().as_bytes());
        hasher.update(self.sequence.to_le_bytes());
        field(&mut hasher, &self.previous_rate.map(|r| r.to_string()).unwrap_or_default());
        field(&mut hasher, &self.new_rate.to_string());
        field(&mut hasher, self.source.as_ref());
        field(&mut hasher, self.action.as_ref());
        field(&mut hasher, self.performed_by.as_str());
        field(
            &mut hasher,
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
        field(&mut hasher, self.reason.as_deref().unwrap_or_default());
        field(
            &mut hasher,
            &self.transaction_id.map(|t| t.to_string()).unwrap_or_default(),
        );
        field(
            &mut hasher,
            self.order_id.as_ref().map(|o| o.as_str()).unwrap_or_default(),
        );
        field(&mut hasher, &self.prev_hash);
        hex::encode(hasher.finalize())
    }

    pub fn is_lock(&self) -> bool {
        matches!(self.action, AuditAction::Lock | AuditAction::ManualOverride)
    }
}

fn field(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0]);
}

/// Checks sequence numbers, back-links and hashes of a whole log, in order.
pub fn verify_chain(entries: &[RateAuditEntry]) -> Result<(), DomainError> {
    let mut prev = GENESIS_HASH;
    for (i, entry) in entries.iter().enumerate() {
        let expected_sequence = i as u64 + 1;
        if entry.sequence != expected_sequence
            || entry.prev_hash != prev
            || entry.hash != entry.compute_hash()
        {
            return Err(DomainError::AuditChainBroken {
                sequence: expected_sequence,
            });
        }
        prev = entry.hash.as_str();
    }
    Ok(())
}

/// The rate that was locked at `at`, replayed from one transaction's entries.
///
/// `update` entries describe the advisory live rate and never bind anything.
pub fn rate_in_effect(entries: &[RateAuditEntry], at: DateTime<Utc>) -> Option<Rate> {
    let mut sorted: Vec<&RateAuditEntry> = entries.iter().filter(|e| e.timestamp <= at).collect();
    sorted.sort_by_key(|e| e.sequence);

    let mut locked = None;
    for entry in sorted {
        match entry.action {
            AuditAction::Lock | AuditAction::ManualOverride => locked = Some(entry.new_rate),
            AuditAction::Unlock => locked = None,
            AuditAction::Update => {}
        }
    }
    locked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn rate(v: Decimal) -> Rate {
        Rate::new(v).unwrap()
    }

    fn entry(action: AuditAction, new_rate: Decimal, at: DateTime<Utc>) -> NewAuditEntry {
        NewAuditEntry {
            previous_rate: None,
            new_rate: rate(new_rate),
            source: RateSource::ReserveBank,
            action,
            performed_by: UserId::from("cashier-1"),
            timestamp: at,
            reason: None,
            context: TransactionContext::for_order(OrderId::from("ORD-9")),
        }
    }

    fn chain(entries: Vec<NewAuditEntry>) -> Vec<RateAuditEntry> {
        let mut out: Vec<RateAuditEntry> = Vec::new();
        for (i, e) in entries.into_iter().enumerate() {
            let prev = out.last().map(|p| p.hash.clone()).unwrap_or(GENESIS_HASH.into());
            out.push(e.seal(i as u64 + 1, &prev));
        }
        out
    }

    #[test]
    fn test_seal_links_to_previous() {
        let now = Utc::now();
        let log = chain(vec![
            entry(AuditAction::Lock, dec!(32.5), now),
            entry(AuditAction::Unlock, dec!(33), now),
        ]);
        assert_eq!(log[0].prev_hash, GENESIS_HASH);
        assert_eq!(log[1].prev_hash, log[0].hash);
        assert_eq!(log[0].hash.len(), 64);
        assert!(verify_chain(&log).is_ok());
    }

    #[test]
    fn test_tampered_rate_breaks_chain() {
        let now = Utc::now();
        let mut log = chain(vec![
            entry(AuditAction::Lock, dec!(32.5), now),
            entry(AuditAction::Unlock, dec!(33), now),
        ]);
        log[0].new_rate = rate(dec!(30));
        assert_eq!(
            verify_chain(&log),
            Err(DomainError::AuditChainBroken { sequence: 1 })
        );
    }

    #[test]
    fn test_deleted_entry_breaks_chain() {
        let now = Utc::now();
        let mut log = chain(vec![
            entry(AuditAction::Lock, dec!(32.5), now),
            entry(AuditAction::Unlock, dec!(33), now),
            entry(AuditAction::Lock, dec!(33), now),
        ]);
        log.remove(1);
        assert_eq!(
            verify_chain(&log),
            Err(DomainError::AuditChainBroken { sequence: 2 })
        );
    }

    #[test]
    fn test_rate_in_effect_replays_locks() {
        let t0 = Utc::now();
        let log = chain(vec![
            entry(AuditAction::Lock, dec!(32.5), t0),
            entry(AuditAction::Update, dec!(33), t0 + Duration::minutes(1)),
            entry(AuditAction::Unlock, dec!(33), t0 + Duration::minutes(5)),
            entry(AuditAction::ManualOverride, dec!(1250), t0 + Duration::minutes(6)),
        ]);

        assert_eq!(rate_in_effect(&log, t0 - Duration::seconds(1)), None);
        assert_eq!(rate_in_effect(&log, t0 + Duration::minutes(2)), Some(rate(dec!(32.5))));
        assert_eq!(rate_in_effect(&log, t0 + Duration::minutes(5)), None);
        assert_eq!(rate_in_effect(&log, t0 + Duration::minutes(7)), Some(rate(dec!(1250))));
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::ManualOverride.to_string(), "manual_override");
        assert_eq!("unlock".parse::<AuditAction>().unwrap(), AuditAction::Unlock);
        assert!("delete".parse::<AuditAction>().is_err());
    }
}
