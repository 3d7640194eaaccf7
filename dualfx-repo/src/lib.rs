//! # Rate Desk Repository
//!
//! Concrete repository implementations (adapters) for the rate desk.
//! This crate provides the storage adapters that implement the
//! `AuditLogRepository` and `AwardRepository` ports.

use async_trait::async_trait;
use dualfx_types::{
    AuditLogRepository, Award, AwardId, AwardRepository, AwardStatus, NewAuditEntry, OrderId,
    RateAuditEntry, RepoError, TransactionId,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
mod types;


pub use memory::MemoryRepo;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepo;

/// URL selecting the in-memory adapter.
pub const MEMORY_URL: &str = "memory://";

/// Unified repository wrapper over the available adapters.
pub enum Repo {
    Memory(MemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteRepo),
}

/// Build and initialize a repository from a database URL.
///
/// This function:
/// 1. Picks the adapter from the URL scheme
/// 2. Connects and runs migrations (SQLite)
/// 3. Returns a ready-to-use `Repo`
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("memory://").await?;
///
/// // SQLite (with `sqlite` feature)
/// let repo = build_repo("sqlite://rate-desk.db?mode=rwc").await?;
/// ```
pub async fn build_repo(database_url: &str) -> anyhow::Result<Repo> {
    Repo::new(database_url).await
}

impl Repo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        if database_url == MEMORY_URL {
            tracing::warn!("Using in-memory storage; the audit log will not survive a restart");
            return Ok(Repo::Memory(MemoryRepo::new()));
        }

        #[cfg(feature = "sqlite")]
        if database_url.starts_with("sqlite:") {
            let inner = SqliteRepo::new(database_url).await?;
            tracing::info!("Connected to SQLite");
            return Ok(Repo::Sqlite(inner));
        }

        anyhow::bail!("Unsupported DATABASE_URL: {}", database_url)
    }

    fn audit(&self) -> &dyn AuditLogRepository {
        match self {
            Repo::Memory(r) => r,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r,
        }
    }

    fn awards(&self) -> &dyn AwardRepository {
        match self {
            Repo::Memory(r) => r,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Port implementations for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditLogRepository for Repo {
    async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError> {
        self.audit().append(entry).await
    }

    async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError> {
        self.audit().list().await
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<RateAuditEntry>, RepoError> {
        self.audit().list_for_order(order_id).await
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<RateAuditEntry>, RepoError> {
        self.audit().list_for_transaction(transaction_id).await
    }
}

#[async_trait]
impl AwardRepository for Repo {
    async fn insert_award(&self, award: &Award) -> Result<(), RepoError> {
        self.awards().insert_award(award).await
    }

    async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError> {
        self.awards().get_award(id).await
    }

    async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError> {
        self.awards().list_awards_for_order(order_id).await
    }

    async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError> {
        self.awards().update_award(award, expected).await
    }
}
