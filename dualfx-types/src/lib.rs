//! # Dual-Currency Types
//!
//! Domain types, validators and port traits for the USD/ZWG rate desk.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (MonetaryAmount, ExchangeRate, RateLock, Award, audit entries)
//! - `validation` - Award, shortfall and manual-rate rules
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto` - Requests and subscription events crossing the service boundary
//! - `error` - Domain, repository and application error types

pub mod config;
pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;
pub mod validation;

// Re-export commonly used types
pub use config::RateLockConfig;
pub use domain::{
    AuditAction, Award, AwardId, AwardStatus, ExchangeRate, MonetaryAmount, NewAuditEntry,
    OrderId, RateAuditEntry, RateLock, RateSource, RateStatus, Shortfall, ShortfallPayment,
    TransactionContext, TransactionId, UserId,
};
pub use dto::*;
pub use dualfx_rates::{CurrencyCode, Equivalents, Rate};
pub use error::{AppError, DomainError, InvalidRateReason, LockStateError, RepoError};
pub use ports::{AuditLogRepository, AwardRepository, ProviderError, RateProvider, RateQuote};
