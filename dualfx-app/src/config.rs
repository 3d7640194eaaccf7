//! Configuration loading from environment.

use std::env;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;

use dualfx_repo::MEMORY_URL;
use dualfx_types::{RateLockConfig, RateSource};

/// Application configuration.
pub struct Config {
    pub database_url: String,
    /// Recorded as `performed_by` on locks taken from this desk.
    pub desk_user: String,
    /// Reserve Bank rate the simulated feed centres on.
    pub base_rate: Decimal,
    pub rate: RateLockConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, applying defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut rate = RateLockConfig::default();

        if let Some(source) = lookup("RATE_SOURCE") {
            rate.default_source = RateSource::from_str(&source).map_err(anyhow::Error::msg)?;
        }
        if let Some(secs) = parsed(&lookup, "RATE_REFRESH_SECS")? {
            rate.refresh_interval_secs = secs;
        }
        if let Some(min) = parsed(&lookup, "RATE_MIN_MANUAL")? {
            rate.min_manual_rate = min;
        }
        if let Some(max) = parsed(&lookup, "RATE_MAX_MANUAL")? {
            rate.max_manual_rate = max;
        }
        if let Some(pct) = parsed(&lookup, "RATE_MAX_VARIANCE_PCT")? {
            rate.max_variance_percent = pct;
        }
        if let Some(required) = parsed(&lookup, "RATE_REQUIRE_REASON")? {
            rate.require_lock_reason = required;
        }
        if rate.min_manual_rate > rate.max_manual_rate {
            anyhow::bail!(
                "RATE_MIN_MANUAL ({}) is above RATE_MAX_MANUAL ({})",
                rate.min_manual_rate,
                rate.max_manual_rate
            );
        }

        let base_rate = parsed(&lookup, "RATE_BASE_ZWG")?.unwrap_or(Decimal::new(2650, 2));
        if base_rate <= Decimal::ZERO {
            anyhow::bail!("RATE_BASE_ZWG must be positive");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| MEMORY_URL.to_string()),
            desk_user: lookup("DESK_USER").unwrap_or_else(|| "desk".to_string()),
            base_rate,
            rate,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{} has an invalid value: {}", key, raw))
        })
        .transpose()
}
