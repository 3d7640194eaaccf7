//! In-memory repository adapter.
//!
//! Used by the desk binary when no database is configured, and by tests.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use dualfx_types::{
    AuditLogRepository, Award, AwardId, AwardRepository, AwardStatus, NewAuditEntry, OrderId,
    RateAuditEntry, RepoError, TransactionId, domain::GENESIS_HASH,
};

#[derive(Default)]
pub struct MemoryRepo {
    audit: Mutex<Vec<RateAuditEntry>>,
    awards: DashMap<AwardId, Award>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn audit_filtered(&self, keep: impl Fn(&RateAuditEntry) -> bool) -> Vec<RateAuditEntry> {
        self.audit.lock().iter().filter(|e| keep(e)).cloned().collect()
    }
}

#[async_trait]
impl AuditLogRepository for MemoryRepo {
    async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError> {
        let mut log = self.audit.lock();
        let prev_hash = log
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let sealed = entry.seal(log.len() as u64 + 1, &prev_hash);
        log.push(sealed.clone());
        Ok(sealed)
    }

    async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError> {
        Ok(self.audit.lock().clone())
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<RateAuditEntry>, RepoError> {
        Ok(self.audit_filtered(|e| e.order_id.as_ref() == Some(order_id)))
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<RateAuditEntry>, RepoError> {
        Ok(self.audit_filtered(|e| e.transaction_id == Some(transaction_id)))
    }
}

#[async_trait]
impl AwardRepository for MemoryRepo {
    async fn insert_award(&self, award: &Award) -> Result<(), RepoError> {
        match self.awards.entry(award.id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!(
                "award {} already exists",
                award.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(award.clone());
                Ok(())
            }
        }
    }

    async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError> {
        Ok(self.awards.get(&id).map(|a| a.clone()))
    }

    async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError> {
        let mut awards: Vec<Award> = self
            .awards
            .iter()
            .filter(|a| &a.order_id == order_id)
            .map(|a| a.clone())
            .collect();
        awards.sort_by_key(|a| a.created_at);
        Ok(awards)
    }

    async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError> {
        let mut stored = self.awards.get_mut(&award.id).ok_or(RepoError::NotFound)?;
        if stored.status != expected {
            return Err(RepoError::Conflict(format!(
                "award {} is {}, expected {}",
                award.id, stored.status, expected
            )));
        }
        *stored = award.clone();
        Ok(())
    }
}
