//! Domain models for the rate desk.

pub mod audit;
pub mod claim;
pub mod ids;
pub mod money;
pub mod rate;

pub use audit::{
    AuditAction, GENESIS_HASH, NewAuditEntry, RateAuditEntry, rate_in_effect, verify_chain,
};
pub use claim::{Award, AwardStatus, Shortfall, ShortfallPayment};
pub use ids::{AuditEntryId, AwardId, OrderId, TransactionContext, TransactionId, UserId};
pub use money::MonetaryAmount;
pub use rate::{ExchangeRate, RateLock, RateSource, RateStatus};
