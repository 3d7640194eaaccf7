//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The services depend on these traits, not concrete implementations.

mod provider;
mod repository;

pub use provider::{ProviderError, RateProvider, RateQuote};
pub use repository::{AuditLogRepository, AwardRepository};
