//! Exchange rate provider port.
//!
//! Implementations can be a Reserve Bank feed, a clinic-maintained table,
//! a simulated feed for demos, or a scripted mock in tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::RateSource;

/// A raw quote as returned by a provider, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuote {
    /// ZWG per 1 USD.
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Error type for rate provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed rate from {rate_source}: {detail}")]
    Malformed {
        rate_source: RateSource,
        detail: String,
    },

    #[error("Unsupported rate source: {0}")]
    UnsupportedSource(RateSource),
}

/// Port trait for exchange rate providers.
#[async_trait::async_trait]
pub trait RateProvider: Send + Sync + 'static {
    /// Fetch the current ZWG-per-USD rate from `source`.
    async fn fetch_rate(&self, source: RateSource) -> Result<RateQuote, ProviderError>;
}
