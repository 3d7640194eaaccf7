//! Rate Lock Application Service
//!
//! Owns the live/locked rate state for one point-of-sale screen, runs the
//! background refresh while unlocked, and writes every lock transition to
//! the audit log before it takes effect.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use dualfx_types::validation::{require_reason, validate_manual_rate};
use dualfx_types::{
    AppError, AuditAction, AuditLogRepository, CurrencyCode, DomainError, Equivalents, ExchangeRate,
    LockRequest, LockStateError, MonetaryAmount, NewAuditEntry, ProviderError, Rate,
    RateAuditEntry, RateEvent, RateLock, RateLockConfig, RateProvider, RateQuote, RateSource,
    TransactionContext, UserId,
};

/// Performer recorded on entries the service writes on its own behalf.
pub const SYSTEM_USER: &str = "system";

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct LockState {
    live: Option<ExchangeRate>,
    lock: Option<RateLock>,
}

#[derive(Default)]
struct Refresher {
    enabled: bool,
    handle: Option<JoinHandle<()>>,
}

struct Inner<P, A> {
    provider: P,
    audit: A,
    config: RateLockConfig,
    state: Mutex<LockState>,
    events: broadcast::Sender<RateEvent>,
    refresher: parking_lot::Mutex<Refresher>,
}

/// Application service for the exchange rate lock.
///
/// Generic over the rate provider and audit log ports. Cloning is cheap and
/// every clone shares the same state.
pub struct RateLockService<P: RateProvider, A: AuditLogRepository> {
    inner: Arc<Inner<P, A>>,
}

impl<P: RateProvider, A: AuditLogRepository> Clone for RateLockService<P, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RateProvider, A: AuditLogRepository> RateLockService<P, A> {
    /// Creates a new service. No rate is fetched until asked.
    pub fn new(provider: P, audit: A, config: RateLockConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                provider,
                audit,
                config,
                state: Mutex::new(LockState::default()),
                events,
                refresher: parking_lot::Mutex::new(Refresher::default()),
            }),
        }
    }

    pub fn config(&self) -> &RateLockConfig {
        &self.inner.config
    }

    /// Returns a reference to the underlying audit log.
    pub fn audit_log(&self) -> &A {
        &self.inner.audit
    }

    /// Receives every subsequent [`RateEvent`]. Drop the receiver to
    /// unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<RateEvent> {
        self.inner.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The rate every amount on the screen must use: the locked rate if one
    /// is held, otherwise the advisory live rate with its status as of now.
    pub async fn current_rate(&self) -> Option<ExchangeRate> {
        let state = self.inner.state.lock().await;
        if let Some(lock) = &state.lock {
            return Some(lock.as_exchange_rate());
        }
        state.live.clone().map(|mut live| {
            live.status = live.status_at(Utc::now());
            live
        })
    }

    pub async fn live_rate(&self) -> Option<ExchangeRate> {
        self.inner.state.lock().await.live.clone()
    }

    pub async fn active_lock(&self) -> Option<RateLock> {
        self.inner.state.lock().await.lock.clone()
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.state.lock().await.lock.is_some()
    }

    /// Both equivalents of `amount` at the locked rate.
    pub async fn quote(&self, amount: &MonetaryAmount) -> Result<Equivalents, AppError> {
        let state = self.inner.state.lock().await;
        let lock = state.lock.as_ref().ok_or(DomainError::from(LockStateError::NotLocked))?;
        Ok(amount.equivalents(lock.locked_rate())?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Live rate
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetches from the configured default source.
    pub async fn fetch_live_rate(&self) -> Result<ExchangeRate, AppError> {
        self.fetch_live_rate_from(self.inner.config.default_source)
            .await
    }

    /// Fetches a live rate and makes it the current live rate.
    ///
    /// An existing lock is never touched; while locked the fetched value is
    /// advisory only.
    #[instrument(skip(self))]
    pub async fn fetch_live_rate_from(&self, source: RateSource) -> Result<ExchangeRate, AppError> {
        let fetched = self.inner.provider.fetch_rate(source).await;
        let mut state = self.inner.state.lock().await;
        self.inner.record_fetch(&mut state, source, fetched).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lock state machine
    // ─────────────────────────────────────────────────────────────────────────

    /// Freezes a rate for the transaction in `req.context`.
    ///
    /// Without `manual_rate` the latest live rate is locked, stale or not.
    /// The audit entry is written before the lock takes effect; if the write
    /// fails the service stays unlocked.
    #[instrument(skip(self, req), fields(performed_by = %req.performed_by, manual = req.manual_rate.is_some()))]
    pub async fn lock(&self, req: LockRequest) -> Result<RateLock, AppError> {
        let mut state = self.inner.state.lock().await;

        let result = self.inner.prepare_lock(&state, &req);
        let (rate, source, action, reason) = match result {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Lock rejected");
                return Err(e);
            }
        };

        if action == AuditAction::Lock {
            if let Some(live) = &state.live {
                if live.is_stale_at(Utc::now()) {
                    warn!(rate = %rate, valid_until = %live.valid_until, "Locking a stale rate");
                }
            }
        }

        let now = Utc::now();
        let entry = NewAuditEntry {
            previous_rate: state.live.as_ref().map(|l| l.rate),
            new_rate: rate,
            source,
            action,
            performed_by: req.performed_by.clone(),
            timestamp: now,
            reason: reason.clone(),
            context: req.context.clone(),
        };
        self.inner.append_audit(entry).await?;

        let lock = RateLock::new(rate, source, now, req.performed_by, reason, req.context);
        state.lock = Some(lock.clone());
        drop(state);

        self.inner.abort_refresh();
        let _ = self.inner.events.send(RateEvent::Locked {
            rate,
            currency: CurrencyCode::ZWG,
            source,
            locked_at: now,
        });

        info!(rate = %rate, source = %source, action = %action, "Rate locked");
        Ok(lock)
    }

    /// Releases the lock. A reason is always required.
    ///
    /// Records `previous_rate = locked rate` and `new_rate = current live
    /// rate`, then resumes the background refresh if it was running.
    #[instrument(skip(self, performed_by))]
    pub async fn unlock(
        &self,
        reason: &str,
        performed_by: impl Into<UserId>,
    ) -> Result<RateAuditEntry, AppError> {
        let performed_by = performed_by.into();
        let mut state = self.inner.state.lock().await;

        let lock = match state.lock.as_ref() {
            Some(lock) => lock.clone(),
            None => {
                warn!("Unlock rejected: no rate is locked");
                return Err(DomainError::from(LockStateError::NotLocked).into());
            }
        };
        let reason = require_reason(Some(reason)).inspect_err(|e| {
            warn!(error = %e, "Unlock rejected");
        })?;

        let entry = self
            .inner
            .release(&state, &lock, reason.clone(), performed_by)
            .await?;
        state.lock = None;
        drop(state);

        let _ = self.inner.events.send(RateEvent::Unlocked {
            previous_rate: lock.locked_rate(),
            reason,
        });
        info!(rate = %lock.locked_rate(), "Rate unlocked");

        self.inner.resume_refresh(self.clone_inner());
        Ok(entry)
    }

    /// Ends the owning transaction: releases any lock (audited as `unlock`)
    /// and stops the background refresh.
    ///
    /// Returns the unlock entry, or `None` if nothing was locked.
    #[instrument(skip(self, performed_by))]
    pub async fn complete(
        &self,
        reason: &str,
        performed_by: impl Into<UserId>,
    ) -> Result<Option<RateAuditEntry>, AppError> {
        self.stop_refresh();

        let mut state = self.inner.state.lock().await;
        let Some(lock) = state.lock.clone() else {
            debug!("Transaction completed without a lock");
            return Ok(None);
        };
        let reason = require_reason(Some(reason))?;

        let entry = self
            .inner
            .release(&state, &lock, reason.clone(), performed_by.into())
            .await?;
        state.lock = None;
        drop(state);

        let _ = self.inner.events.send(RateEvent::Unlocked {
            previous_rate: lock.locked_rate(),
            reason,
        });
        info!(rate = %lock.locked_rate(), "Transaction completed, rate released");
        Ok(Some(entry))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts re-fetching the live rate every `refresh_interval` while
    /// unlocked. Must be called from within a tokio runtime.
    pub fn start_refresh(&self) {
        {
            let mut refresher = self.inner.refresher.lock();
            refresher.enabled = true;
        }
        self.inner.resume_refresh(self.clone_inner());
    }

    /// Stops the background refresh. It stays stopped across unlocks.
    pub fn stop_refresh(&self) {
        let mut refresher = self.inner.refresher.lock();
        refresher.enabled = false;
        if let Some(handle) = refresher.handle.take() {
            handle.abort();
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .refresher
            .lock()
            .handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn clone_inner(&self) -> Arc<Inner<P, A>> {
        Arc::clone(&self.inner)
    }
}

impl<P: RateProvider, A: AuditLogRepository> Inner<P, A> {
    /// Picks the rate, source, audit action and reason for a lock request.
    fn prepare_lock(
        &self,
        state: &LockState,
        req: &LockRequest,
    ) -> Result<(Rate, RateSource, AuditAction, Option<String>), AppError> {
        if let Some(lock) = &state.lock {
            return Err(DomainError::from(LockStateError::AlreadyLocked(lock.locked_rate())).into());
        }

        match req.manual_rate {
            Some(candidate) => {
                let reason = require_reason(req.reason.as_deref())?;
                let live = state.live.as_ref().map(|l| l.rate);
                let rate = validate_manual_rate(candidate, live, &self.config)?;
                Ok((rate, RateSource::Manual, AuditAction::ManualOverride, Some(reason)))
            }
            None => {
                let live = state.live.as_ref().ok_or(DomainError::from(LockStateError::NoLiveRate))?;
                let reason = if self.config.require_lock_reason {
                    Some(require_reason(req.reason.as_deref())?)
                } else {
                    req.reason
                        .as_deref()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                };
                Ok((live.rate, live.source, AuditAction::Lock, reason))
            }
        }
    }

    /// Applies a completed fetch to the state, or marks the live rate offline.
    async fn record_fetch(
        &self,
        state: &mut LockState,
        source: RateSource,
        fetched: Result<RateQuote, ProviderError>,
    ) -> Result<ExchangeRate, AppError> {
        let rate = fetched.and_then(|quote| {
            Rate::new(quote.rate)
                .map(|rate| (rate, quote.timestamp))
                .map_err(|e| ProviderError::Malformed {
                    rate_source: source,
                    detail: e.to_string(),
                })
        });

        let (rate, timestamp) = match rate {
            Ok(ok) => ok,
            Err(e) => {
                warn!(source = %source, error = %e, "Rate fetch failed, keeping last good rate");
                if let Some(live) = state.live.as_mut() {
                    live.mark_offline();
                }
                let _ = self.events.send(RateEvent::RefreshFailed {
                    source,
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let next = ExchangeRate::live(
            rate,
            source,
            timestamp,
            self.config.validity_for(source),
            state.live.as_ref(),
        );

        if self.config.audit_rate_updates {
            if let Some(previous) = next.previous_rate.filter(|p| *p != rate) {
                let entry = NewAuditEntry {
                    previous_rate: Some(previous),
                    new_rate: rate,
                    source,
                    action: AuditAction::Update,
                    performed_by: UserId::from(SYSTEM_USER),
                    timestamp,
                    reason: None,
                    context: TransactionContext::detached(),
                };
                // A failed write is logged in append_audit and does not block the update.
                let _ = self.append_audit(entry).await;
            }
        }

        debug!(rate = %rate, source = %source, variance = ?next.variance, "Live rate updated");
        state.live = Some(next.clone());
        let _ = self.events.send(RateEvent::LiveRateUpdated(next.clone()));
        Ok(next)
    }

    /// Writes the `unlock` entry for `lock`. Does not clear the state.
    async fn release(
        &self,
        state: &LockState,
        lock: &RateLock,
        reason: String,
        performed_by: UserId,
    ) -> Result<RateAuditEntry, AppError> {
        let entry = NewAuditEntry {
            previous_rate: Some(lock.locked_rate()),
            new_rate: state
                .live
                .as_ref()
                .map(|l| l.rate)
                .unwrap_or(lock.locked_rate()),
            source: lock.source(),
            action: AuditAction::Unlock,
            performed_by,
            timestamp: Utc::now(),
            reason: Some(reason),
            context: lock.context().clone(),
        };
        self.append_audit(entry).await
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, AppError> {
        let action = entry.action;
        self.audit.append(entry).await.map_err(|e| {
            error!(action = %action, error = %e, "Failed to append rate audit entry");
            AppError::from(e)
        })
    }

    fn abort_refresh(&self) {
        if let Some(handle) = self.refresher.lock().handle.take() {
            handle.abort();
            debug!("Background refresh paused for lock");
        }
    }

    /// Spawns the refresh worker if it is enabled and not already running.
    fn resume_refresh(&self, this: Arc<Self>) {
        let mut refresher = self.refresher.lock();
        if !refresher.enabled {
            return;
        }
        if refresher.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        refresher.handle = Some(tokio::spawn(refresh_worker(this)));
    }

    /// One tick of the background refresh.
    async fn refresh_tick(&self) {
        let source = self.config.default_source;
        let fetched = self.provider.fetch_rate(source).await;

        let mut state = self.state.lock().await;
        if state.lock.is_some() {
            debug!("Discarding fetch that completed after a lock");
            return;
        }
        // Failures are logged and published inside record_fetch.
        let _ = self.record_fetch(&mut state, source, fetched).await;
    }
}

#[instrument(skip(inner), fields(source = %inner.config.default_source))]
async fn refresh_worker<P: RateProvider, A: AuditLogRepository>(inner: Arc<Inner<P, A>>) {
    let period = inner.config.refresh_interval();
    info!(interval_secs = period.as_secs(), "Starting background rate refresh");

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        inner.refresh_tick().await;
    }
}
