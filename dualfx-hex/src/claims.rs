//! Medical-aid Claim Service
//!
//! Records awards against the locked rate and drives them through
//! `awarded → shortfall_paid → settled` (or `rejected`).

use chrono::Utc;
use tracing::{info, instrument, warn};

use dualfx_types::{
    AppError, AuditLogRepository, Award, AwardId, AwardRepository, DomainError,
    LockStateError, MonetaryAmount, OrderId, RateLock, RateProvider, RecordAwardRequest,
    RepoError, ShortfallPaymentRequest,
};

use crate::RateLockService;

/// Application service for medical-aid awards.
///
/// Generic over `R: AwardRepository`. Every state change is stored with a
/// compare-and-set on the previous status.
pub struct ClaimService<R: AwardRepository> {
    repo: R,
}

impl<R: AwardRepository> ClaimService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Records an award priced at the rate currently locked on `rates`.
    ///
    /// Fails with `NotLocked` when the transaction holds no lock, so an award
    /// can never be priced at a rate that has since been released.
    #[instrument(skip(self, rates, req), fields(order_id = %req.order_id))]
    pub async fn record_award<P, A>(
        &self,
        rates: &RateLockService<P, A>,
        req: RecordAwardRequest,
    ) -> Result<Award, AppError>
    where
        P: RateProvider,
        A: AuditLogRepository,
    {
        let Some(lock) = rates.active_lock().await else {
            warn!("Award rejected: no rate is locked");
            return Err(DomainError::from(LockStateError::NotLocked).into());
        };
        self.record_at(&lock, req).await
    }

    async fn record_at(&self, lock: &RateLock, req: RecordAwardRequest) -> Result<Award, AppError> {
        if let Some(locked_for) = &lock.context().order_id {
            if locked_for != &req.order_id {
                let err = DomainError::ValidationError(format!(
                    "The rate lock belongs to order {}",
                    locked_for
                ));
                warn!(error = %err, "Award rejected");
                return Err(err.into());
            }
        }

        let award = MonetaryAmount::new(req.order_total, req.order_currency)
            .and_then(|order_total| {
                Award::record(
                    req.order_id,
                    req.claim_reference,
                    req.amount,
                    req.currency,
                    order_total,
                    lock.locked_rate(),
                    Utc::now(),
                )
            })
            .inspect_err(|e| warn!(code = e.code(), error = %e, "Award rejected"))?;

        self.repo.insert_award(&award).await?;
        info!(
            award_id = %award.id,
            usd = %award.equivalents.usd,
            zwg = %award.equivalents.zwg,
            shortfall = %award.shortfall.amount,
            status = %award.status,
            "Award recorded"
        );
        Ok(award)
    }

    pub async fn get_award(&self, id: AwardId) -> Result<Award, AppError> {
        self.repo
            .get_award(id)
            .await?
            .ok_or_else(|| DomainError::AwardNotFound(id).into())
    }

    pub async fn list_awards(&self, order_id: &OrderId) -> Result<Vec<Award>, AppError> {
        self.repo
            .list_awards_for_order(order_id)
            .await
            .map_err(Into::into)
    }

    /// Records the patient's shortfall payment. A second payment fails with
    /// `AlreadyPaid` and leaves the first untouched.
    #[instrument(skip(self, req), fields(award_id = %req.award_id))]
    pub async fn pay_shortfall(&self, req: ShortfallPaymentRequest) -> Result<Award, AppError> {
        let id = req.award_id;
        self.transition(id, |award| {
            award.apply_shortfall_payment(
                req.amount,
                req.currency,
                req.recorded_by.clone(),
                Utc::now(),
            )
        })
        .await
    }

    /// Marks the provider's disbursement as received.
    #[instrument(skip(self))]
    pub async fn mark_settled(&self, id: AwardId) -> Result<Award, AppError> {
        self.transition(id, |award| award.mark_settled(Utc::now()))
            .await
    }

    /// Withdraws an award that is still `awarded`.
    #[instrument(skip(self))]
    pub async fn reject_award(&self, id: AwardId, reason: &str) -> Result<Award, AppError> {
        self.transition(id, |award| award.reject(reason)).await
    }

    /// Loads, mutates and conditionally stores an award.
    ///
    /// On a lost race the mutation is replayed against the fresh copy so the
    /// caller gets the domain error (e.g. `AlreadyPaid`) rather than a
    /// storage conflict.
    async fn transition<F>(&self, id: AwardId, apply: F) -> Result<Award, AppError>
    where
        F: Fn(&mut Award) -> Result<(), DomainError>,
    {
        let mut award = self.get_award(id).await?;
        let expected = award.status;

        if let Err(e) = apply(&mut award) {
            warn!(award_id = %id, code = e.code(), error = %e, "Award transition rejected");
            return Err(e.into());
        }

        match self.repo.update_award(&award, expected).await {
            Ok(()) => {
                info!(award_id = %id, from = %expected, to = %award.status, "Award updated");
                Ok(award)
            }
            Err(RepoError::Conflict(detail)) => {
                let mut fresh = self.get_award(id).await?;
                match apply(&mut fresh) {
                    Err(e) => {
                        warn!(award_id = %id, code = e.code(), error = %e, "Award transition lost a race");
                        Err(e.into())
                    }
                    Ok(()) => Err(AppError::Conflict(detail)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
