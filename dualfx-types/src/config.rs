//! Rate lock policy.
//!
//! The manual-rate band and variance limits are desk policy, not regulation,
//! so every threshold is configurable.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::RateSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLockConfig {
    /// Demand a reason for every lock, not only manual overrides.
    pub require_lock_reason: bool,
    /// Lowest manual rate accepted (ZWG per USD).
    pub min_manual_rate: Decimal,
    /// Highest manual rate accepted (ZWG per USD).
    pub max_manual_rate: Decimal,
    /// Largest deviation, in percent, of a manual rate from the live rate.
    pub max_variance_percent: Decimal,
    pub refresh_interval_secs: u64,
    pub validity_minutes: i64,
    /// Parallel-market quotes age faster.
    pub parallel_validity_minutes: i64,
    pub default_source: RateSource,
    /// Append an `update` audit entry whenever the live rate changes.
    pub audit_rate_updates: bool,
}

impl Default for RateLockConfig {
    fn default() -> Self {
        Self {
            require_lock_reason: false,
            min_manual_rate: Decimal::ONE_HUNDRED,
            max_manual_rate: Decimal::from(10_000),
            max_variance_percent: Decimal::TEN,
            refresh_interval_secs: 30,
            validity_minutes: 30,
            parallel_validity_minutes: 15,
            default_source: RateSource::ReserveBank,
            audit_rate_updates: true,
        }
    }
}

impl RateLockConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// How long a freshly fetched rate from `source` stays current.
    pub fn validity_for(&self, source: RateSource) -> chrono::Duration {
        match source {
            RateSource::Parallel => chrono::Duration::minutes(self.parallel_validity_minutes),
            _ => chrono::Duration::minutes(self.validity_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = RateLockConfig::default();
        assert_eq!(config.min_manual_rate, dec!(100));
        assert_eq!(config.max_manual_rate, dec!(10000));
        assert_eq!(config.max_variance_percent, dec!(10));
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_parallel_expires_sooner() {
        let config = RateLockConfig::default();
        assert!(
            config.validity_for(RateSource::Parallel)
                < config.validity_for(RateSource::ReserveBank)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RateLockConfig =
            serde_json::from_str(r#"{"require_lock_reason": true, "max_variance_percent": "5"}"#)
                .unwrap();
        assert!(config.require_lock_reason);
        assert_eq!(config.max_variance_percent, dec!(5));
        assert_eq!(config.refresh_interval_secs, 30);
    }
}
