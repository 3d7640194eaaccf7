//! Repository port traits.
//!
//! Adapters (SQLite, in-memory) implement these. The audit log is
//! append-only and has no update or delete operation.

use crate::domain::{
    Award, AwardId, AwardStatus, NewAuditEntry, OrderId, RateAuditEntry, TransactionId,
};
use crate::error::RepoError;

/// Durable, append-only store for rate audit entries.
///
/// `append` MUST assign the next sequence number and chain the entry onto the
/// current head atomically.
#[async_trait::async_trait]
pub trait AuditLogRepository: Send + Sync + 'static {
    /// Seals and stores an entry at the head of the log.
    async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError>;

    /// Every entry, in sequence order.
    async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError>;

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<RateAuditEntry>, RepoError>;

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<RateAuditEntry>, RepoError>;
}

/// Store for medical-aid awards.
#[async_trait::async_trait]
pub trait AwardRepository: Send + Sync + 'static {
    async fn insert_award(&self, award: &Award) -> Result<(), RepoError>;

    async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError>;

    async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError>;

    /// Replaces the stored award only if its status is still `expected`.
    ///
    /// Returns [`RepoError::Conflict`] when another writer got there first.
    async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError>;
}

// Shared handles: one adapter can back several services.

#[async_trait::async_trait]
impl<T: AuditLogRepository + ?Sized> AuditLogRepository for std::sync::Arc<T> {
    async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError> {
        (**self).append(entry).await
    }

    async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError> {
        (**self).list().await
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<RateAuditEntry>, RepoError> {
        (**self).list_for_order(order_id).await
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<RateAuditEntry>, RepoError> {
        (**self).list_for_transaction(transaction_id).await
    }
}

#[async_trait::async_trait]
impl<T: AwardRepository + ?Sized> AwardRepository for std::sync::Arc<T> {
    async fn insert_award(&self, award: &Award) -> Result<(), RepoError> {
        (**self).insert_award(award).await
    }

    async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError> {
        (**self).get_award(id).await
    }

    async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError> {
        (**self).list_awards_for_order(order_id).await
    }

    async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError> {
        (**self).update_award(award, expected).await
    }
}
