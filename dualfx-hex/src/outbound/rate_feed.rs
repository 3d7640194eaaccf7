//! Simulated rate feed for demos and development.
//!
//! Each source quotes at a fixed premium over the Reserve Bank base rate and
//! wanders by a bounded random amount on every fetch. Quotes are quantised to
//! two decimal places like a real published rate.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::debug;

use dualfx_rates::round_money;
use dualfx_types::{ProviderError, RateProvider, RateQuote, RateSource};

/// Premium over the base rate and maximum swing, both in basis points.
fn source_profile(source: RateSource) -> Option<(i64, i64)> {
    match source {
        RateSource::ReserveBank => Some((0, 20)),
        RateSource::Interbank => Some((150, 50)),
        RateSource::ClinicRate => Some((500, 0)),
        RateSource::Parallel => Some((2500, 300)),
        RateSource::Manual => None,
    }
}

pub struct SimulatedRateFeed {
    base_rate: Decimal,
    fluctuation: AtomicBool,
    offline: AtomicBool,
}

impl SimulatedRateFeed {
    /// A feed centred on `base_rate` ZWG per USD.
    pub fn new(base_rate: Decimal) -> Self {
        Self {
            base_rate,
            fluctuation: AtomicBool::new(true),
            offline: AtomicBool::new(false),
        }
    }

    /// A feed that always quotes its base rate plus the source premium.
    pub fn fixed(base_rate: Decimal) -> Self {
        let feed = Self::new(base_rate);
        feed.disable_fluctuation();
        feed
    }

    pub fn enable_fluctuation(&self) {
        self.fluctuation.store(true, Ordering::Relaxed);
    }

    pub fn disable_fluctuation(&self) {
        self.fluctuation.store(false, Ordering::Relaxed);
    }

    /// Simulates the upstream feed going down (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn quote_for(&self, premium_bps: i64, swing_bps: i64) -> Option<Decimal> {
        let swing = if swing_bps > 0 && self.fluctuation.load(Ordering::Relaxed) {
            rand::rng().random_range(-swing_bps..=swing_bps)
        } else {
            0
        };
        let factor = Decimal::ONE + Decimal::new(premium_bps + swing, 4);
        self.base_rate.checked_mul(factor).map(round_money)
    }
}

#[async_trait]
impl RateProvider for SimulatedRateFeed {
    async fn fetch_rate(&self, source: RateSource) -> Result<RateQuote, ProviderError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(ProviderError::Unavailable(format!(
                "{} feed is offline",
                source
            )));
        }
        let (premium, swing) =
            source_profile(source).ok_or(ProviderError::UnsupportedSource(source))?;

        let rate = self
            .quote_for(premium, swing)
            .ok_or_else(|| ProviderError::Malformed {
                rate_source: source,
                detail: format!("base rate {} is out of range", self.base_rate),
            })?;
        debug!(source = %source, rate = %rate, "Simulated quote");
        Ok(RateQuote {
            rate,
            timestamp: Utc::now(),
        })
    }
}
