//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use dualfx_types::{
    AuditLogRepository, Award, AwardId, AwardRepository, AwardStatus, NewAuditEntry, OrderId,
    RateAuditEntry, RepoError, TransactionId, domain::GENESIS_HASH,
};

use crate::types::{DbAuditEntry, DbAward, award_payload, format_timestamp};

const AUDIT_COLUMNS: &str = "sequence, id, previous_rate, new_rate, source, action, performed_by, \
     timestamp, reason, transaction_id, order_id, prev_hash, hash";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
    /// Serialises audit appends so each one chains onto the true head.
    append_lock: Mutex<()>,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure on-disk SQLite target directory exists.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if !in_memory {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to `:memory:` opens its own empty database.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        let repo = Self {
            pool,
            append_lock: Mutex::new(()),
        };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for ddl in [
            include_str!("../migrations/0001_create_rate_audit_log.sql"),
            include_str!("../migrations/0002_create_awards.sql"),
        ] {
            sqlx::raw_sql(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        }
        Ok(())
    }

    async fn audit_where(
        &self,
        clause: &str,
        value: String,
    ) -> Result<Vec<RateAuditEntry>, RepoError> {
        let sql = format!(
            "SELECT {} FROM rate_audit_log WHERE {} = ? ORDER BY sequence ASC",
            AUDIT_COLUMNS, clause
        );
        let rows: Vec<DbAuditEntry> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbAuditEntry::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit log
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditLogRepository for SqliteRepo {
    async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError> {
        let _guard = self.append_lock.lock().await;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let head: Option<(i64, String)> = sqlx::query_as(
            r#"SELECT sequence, hash FROM rate_audit_log ORDER BY sequence DESC LIMIT 1"#,
        )
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let (sequence, prev_hash) = match head {
            Some((seq, hash)) => (seq as u64 + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        };
        let sealed = entry.seal(sequence, &prev_hash);

        let result = sqlx::query(
            r#"INSERT INTO rate_audit_log
               (sequence, id, previous_rate, new_rate, source, action, performed_by,
                timestamp, reason, transaction_id, order_id, prev_hash, hash)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(sealed.sequence as i64)
        .bind(sealed.id.to_string())
        .bind(sealed.previous_rate.map(|r| r.to_string()))
        .bind(sealed.new_rate.to_string())
        .bind(sealed.source.to_string())
        .bind(sealed.action.to_string())
        .bind(sealed.performed_by.as_str())
        .bind(format_timestamp(sealed.timestamp))
        .bind(&sealed.reason)
        .bind(sealed.transaction_id.map(|t| t.to_string()))
        .bind(sealed.order_id.as_ref().map(|o| o.as_str()))
        .bind(&sealed.prev_hash)
        .bind(&sealed.hash)
        .execute(&mut *db_tx)
        .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return Err(RepoError::Conflict(format!(
                        "audit sequence {} already taken",
                        sequence
                    )));
                }
            }
            return Err(RepoError::Database(e.to_string()));
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(sealed)
    }

    async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError> {
        let sql = format!(
            "SELECT {} FROM rate_audit_log ORDER BY sequence ASC",
            AUDIT_COLUMNS
        );
        let rows: Vec<DbAuditEntry> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbAuditEntry::into_domain).collect()
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<RateAuditEntry>, RepoError> {
        self.audit_where("order_id", order_id.to_string()).await
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<RateAuditEntry>, RepoError> {
        self.audit_where("transaction_id", transaction_id.to_string())
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Awards
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AwardRepository for SqliteRepo {
    async fn insert_award(&self, award: &Award) -> Result<(), RepoError> {
        let payload = award_payload(award)?;
        let now = format_timestamp(chrono::Utc::now());

        let result = sqlx::query(
            r#"INSERT INTO awards (id, order_id, status, payload, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(award.id.to_string())
        .bind(award.order_id.as_str())
        .bind(award.status.to_string())
        .bind(&payload)
        .bind(format_timestamp(award.created_at))
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_database_error() {
                Some(db_err) if db_err.is_unique_violation() => Err(RepoError::Conflict(
                    format!("award {} already exists", award.id),
                )),
                _ => Err(RepoError::Database(e.to_string())),
            },
        }
    }

    async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError> {
        let row: Option<DbAward> = sqlx::query_as(r#"SELECT payload FROM awards WHERE id = ?"#)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbAward::into_domain).transpose()
    }

    async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError> {
        let rows: Vec<DbAward> = sqlx::query_as(
            r#"SELECT payload FROM awards WHERE order_id = ? ORDER BY created_at ASC"#,
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbAward::into_domain).collect()
    }

    async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError> {
        let payload = award_payload(award)?;
        let now = format_timestamp(chrono::Utc::now());

        let result = sqlx::query(
            r#"UPDATE awards SET status = ?, payload = ?, updated_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(award.status.to_string())
        .bind(&payload)
        .bind(&now)
        .bind(award.id.to_string())
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.get_award(award.id).await? {
                None => Err(RepoError::NotFound),
                Some(current) => Err(RepoError::Conflict(format!(
                    "award {} is {}, expected {}",
                    award.id, current.status, expected
                ))),
            };
        }
        Ok(())
    }
}
