//! RateLockService and ClaimService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Barrier;

    use dualfx_repo::MemoryRepo;
    use dualfx_types::domain::{GENESIS_HASH, verify_chain};
    use dualfx_types::{
        AppError, AuditAction, AuditLogRepository, Award, AwardId, AwardRepository, AwardStatus,
        CurrencyCode,
        DomainError, InvalidRateReason, LockRequest, LockStateError, MonetaryAmount,
        NewAuditEntry, OrderId, ProviderError, RateAuditEntry, RateEvent, RateLockConfig,
        RateProvider, RateQuote, RateSource, RateStatus, RecordAwardRequest, RepoError,
        ShortfallPaymentRequest, TransactionContext, TransactionId, UserId,
    };

    use crate::{ClaimService, RateLockService};

    // ─────────────────────────────────────────────────────────────────────────
    // Mock ports
    // ─────────────────────────────────────────────────────────────────────────

    /// Provider that replays a script of quotes, then reports itself down.
    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        script: Arc<Mutex<VecDeque<Result<Decimal, ProviderError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub fn with_rates(rates: &[Decimal]) -> Self {
            let provider = Self::default();
            for rate in rates {
                provider.push(Ok(*rate));
            }
            provider
        }

        pub fn push(&self, next: Result<Decimal, ProviderError>) {
            self.script.lock().unwrap().push_back(next);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for ScriptedProvider {
        async fn fetch_rate(&self, _source: RateSource) -> Result<RateQuote, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Unavailable("script exhausted".into())));
            next.map(|rate| RateQuote {
                rate,
                timestamp: Utc::now(),
            })
        }
    }

    /// Audit log kept in a Vec, with a switch to simulate storage failure.
    #[derive(Clone, Default)]
    pub struct MockAudit {
        entries: Arc<Mutex<Vec<RateAuditEntry>>>,
        failing: Arc<AtomicBool>,
    }

    impl MockAudit {
        pub fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn entries(&self) -> Vec<RateAuditEntry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn actions(&self) -> Vec<AuditAction> {
            self.entries().iter().map(|e| e.action).collect()
        }
    }

    #[async_trait]
    impl AuditLogRepository for MockAudit {
        async fn append(&self, entry: NewAuditEntry) -> Result<RateAuditEntry, RepoError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RepoError::Database("disk I/O error".into()));
            }
            let mut entries = self.entries.lock().unwrap();
            let prev = entries
                .last()
                .map(|e| e.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string());
            let sealed = entry.seal(entries.len() as u64 + 1, &prev);
            entries.push(sealed.clone());
            Ok(sealed)
        }

        async fn list(&self) -> Result<Vec<RateAuditEntry>, RepoError> {
            Ok(self.entries())
        }

        async fn list_for_order(
            &self,
            order_id: &OrderId,
        ) -> Result<Vec<RateAuditEntry>, RepoError> {
            Ok(self
                .entries()
                .into_iter()
                .filter(|e| e.order_id.as_ref() == Some(order_id))
                .collect())
        }

        async fn list_for_transaction(
            &self,
            transaction_id: TransactionId,
        ) -> Result<Vec<RateAuditEntry>, RepoError> {
            Ok(self
                .entries()
                .into_iter()
                .filter(|e| e.transaction_id == Some(transaction_id))
                .collect())
        }
    }

    type Service = RateLockService<ScriptedProvider, MockAudit>;

    fn service_with(rates: &[Decimal], config: RateLockConfig) -> (Service, ScriptedProvider, MockAudit) {
        let provider = ScriptedProvider::with_rates(rates);
        let audit = MockAudit::default();
        let service = RateLockService::new(provider.clone(), audit.clone(), config);
        (service, provider, audit)
    }

    fn service(rates: &[Decimal]) -> (Service, ScriptedProvider, MockAudit) {
        service_with(rates, RateLockConfig::default())
    }

    fn order_ctx(order: &str) -> TransactionContext {
        TransactionContext::for_order(OrderId::from(order))
    }

    fn usd(amount: Decimal) -> MonetaryAmount {
        MonetaryAmount::new(amount, CurrencyCode::USD).unwrap()
    }

    fn domain(err: AppError) -> DomainError {
        match err {
            AppError::Domain(e) => e,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Live rate
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_publishes_live_rate_with_variance() {
        let (service, _, _) = service(&[dec!(32.5), dec!(33)]);

        let first = service.fetch_live_rate().await.unwrap();
        assert_eq!(first.rate.value(), dec!(32.5));
        assert_eq!(first.status, RateStatus::Live);
        assert_eq!(first.variance, None);

        let second = service.fetch_live_rate().await.unwrap();
        assert_eq!(second.previous_rate, Some(first.rate));
        assert_eq!(second.variance, Some(dec!(1.54)));
        assert_eq!(service.current_rate().await.unwrap().rate.value(), dec!(33));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_good_rate() {
        let (service, provider, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        let mut events = service.subscribe();

        provider.push(Err(ProviderError::Unavailable("RBZ timeout".into())));
        let result = service.fetch_live_rate().await;
        assert!(matches!(result, Err(AppError::Provider(_))));

        let live = service.live_rate().await.unwrap();
        assert_eq!(live.rate.value(), dec!(32.5));
        assert_eq!(live.status, RateStatus::Offline);
        assert!(matches!(
            events.recv().await.unwrap(),
            RateEvent::RefreshFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_structurally_bad_quote_is_not_published() {
        let (service, provider, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();

        provider.push(Ok(dec!(32.555)));
        provider.push(Ok(dec!(-1)));
        for _ in 0..2 {
            let result = service.fetch_live_rate().await;
            assert!(matches!(
                result,
                Err(AppError::Provider(ProviderError::Malformed { .. }))
            ));
        }
        assert_eq!(service.live_rate().await.unwrap().rate.value(), dec!(32.5));
    }

    #[tokio::test]
    async fn test_rate_changes_are_audited_as_updates() {
        let (service, _, audit) = service(&[dec!(32.5), dec!(32.5), dec!(33)]);
        for _ in 0..3 {
            service.fetch_live_rate().await.unwrap();
        }
        assert_eq!(audit.actions(), vec![AuditAction::Update]);
        let update = &audit.entries()[0];
        assert_eq!(update.previous_rate.map(|r| r.value()), Some(dec!(32.5)));
        assert_eq!(update.new_rate.value(), dec!(33));
    }

    #[tokio::test]
    async fn test_update_auditing_can_be_disabled() {
        let config = RateLockConfig {
            audit_rate_updates: false,
            ..RateLockConfig::default()
        };
        let (service, _, audit) = service_with(&[dec!(32.5), dec!(33)], config);
        service.fetch_live_rate().await.unwrap();
        service.fetch_live_rate().await.unwrap();
        assert!(audit.entries().is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_lock_then_convert() {
        let (service, _, audit) = service(&[dec!(32.5), dec!(33)]);
        service.fetch_live_rate().await.unwrap();

        let lock = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-100")))
            .await
            .unwrap();
        assert_eq!(lock.locked_rate().value(), dec!(32.5));

        let quote = service.quote(&usd(dec!(100))).await.unwrap();
        assert_eq!(quote.zwg, dec!(3250.00));

        // A later fetch is advisory only.
        service.fetch_live_rate().await.unwrap();
        let quote = service.quote(&usd(dec!(100))).await.unwrap();
        assert_eq!(quote.zwg, dec!(3250.00));

        let current = service.current_rate().await.unwrap();
        assert_eq!(current.rate.value(), dec!(32.5));
        assert_eq!(current.status, RateStatus::Locked);

        let entries = audit.entries();
        assert_eq!(entries[0].action, AuditAction::Lock);
        assert_eq!(entries[0].order_id, Some(OrderId::from("ORD-100")));
    }

    #[tokio::test]
    async fn test_lock_requires_live_rate() {
        let (service, _, _) = service(&[]);
        let err = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-1")))
            .await
            .unwrap_err();
        assert_eq!(domain(err), LockStateError::NoLiveRate.into());
    }

    #[tokio::test]
    async fn test_lock_while_locked_is_an_error() {
        let (service, _, audit) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        let first = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-1")))
            .await
            .unwrap();

        let err = service
            .lock(LockRequest::manual(
                dec!(33),
                "customer asked",
                "cashier-1",
                order_ctx("ORD-1"),
            ))
            .await
            .unwrap_err();
        assert_eq!(
            domain(err),
            LockStateError::AlreadyLocked(first.locked_rate()).into()
        );
        assert_eq!(service.active_lock().await, Some(first));
        assert_eq!(audit.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_policy_can_demand_lock_reason() {
        let config = RateLockConfig {
            require_lock_reason: true,
            ..RateLockConfig::default()
        };
        let (service, _, _) = service_with(&[dec!(32.5)], config);
        service.fetch_live_rate().await.unwrap();

        let err = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-1")))
            .await
            .unwrap_err();
        assert_eq!(err.field(), "reason");
        assert!(!service.is_locked().await);

        let lock = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-1")).with_reason("walk-in"))
            .await
            .unwrap();
        assert_eq!(lock.reason(), Some("walk-in"));
    }

    #[tokio::test]
    async fn test_manual_override() {
        let (service, _, audit) = service(&[]);
        let lock = service
            .lock(LockRequest::manual(
                dec!(1250),
                "clinic board rate",
                "supervisor",
                order_ctx("ORD-2"),
            ))
            .await
            .unwrap();

        assert!(lock.is_manual());
        assert_eq!(lock.source(), RateSource::Manual);
        let entry = &audit.entries()[0];
        assert_eq!(entry.action, AuditAction::ManualOverride);
        assert_eq!(entry.reason.as_deref(), Some("clinic board rate"));
        assert_eq!(entry.performed_by, UserId::from("supervisor"));
    }

    #[tokio::test]
    async fn test_manual_override_needs_reason() {
        let (service, _, audit) = service(&[]);
        let mut req = LockRequest::manual(dec!(1250), "", "cashier-1", order_ctx("ORD-3"));
        req.reason = Some("   ".into());

        let err = service.lock(req).await.unwrap_err();
        assert_eq!(domain(err), LockStateError::ReasonRequired.into());
        assert!(!service.is_locked().await);
        assert!(audit.entries().is_empty());
    }

    #[tokio::test]
    async fn test_manual_override_bounded_by_live_variance() {
        let (service, _, _) = service(&[dec!(1000)]);
        service.fetch_live_rate().await.unwrap();

        let err = service
            .lock(LockRequest::manual(
                dec!(1200),
                "parallel market",
                "cashier-1",
                order_ctx("ORD-4"),
            ))
            .await
            .unwrap_err();
        let DomainError::InvalidRate { reason, .. } = domain(err) else {
            panic!("expected InvalidRate");
        };
        assert!(matches!(reason, InvalidRateReason::ExcessiveVariance { .. }));

        let lock = service
            .lock(LockRequest::manual(
                dec!(1080),
                "parallel market",
                "cashier-1",
                order_ctx("ORD-4"),
            ))
            .await
            .unwrap();
        assert_eq!(lock.locked_rate().value(), dec!(1080));
    }

    #[tokio::test]
    async fn test_lock_fails_cleanly_when_audit_write_fails() {
        let (service, _, audit) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        audit.fail_writes(true);

        let err = service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-5")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(!err.is_recoverable());
        assert!(!service.is_locked().await);
    }

    #[tokio::test]
    async fn test_quote_requires_lock() {
        let (service, _, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        let err = service.quote(&usd(dec!(100))).await.unwrap_err();
        assert_eq!(domain(err), LockStateError::NotLocked.into());
    }

    #[tokio::test]
    async fn test_subscribers_are_told_about_locks() {
        let (service, _, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        let mut events = service.subscribe();

        service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-6")))
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            RateEvent::Locked {
                rate,
                currency,
                source,
                ..
            } => {
                assert_eq!(rate.value(), dec!(32.5));
                assert_eq!(currency, CurrencyCode::ZWG);
                assert_eq!(source, RateSource::ReserveBank);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unlock and completion
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unlock_records_locked_and_live_rates() {
        let (service, _, audit) = service(&[dec!(32.5), dec!(33)]);
        service.fetch_live_rate().await.unwrap();
        service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-7")))
            .await
            .unwrap();
        service.fetch_live_rate().await.unwrap();

        let entry = service.unlock("price re-quoted", "cashier-1").await.unwrap();
        assert_eq!(entry.action, AuditAction::Unlock);
        assert_eq!(entry.previous_rate.map(|r| r.value()), Some(dec!(32.5)));
        assert_eq!(entry.new_rate.value(), dec!(33));
        assert_eq!(entry.order_id, Some(OrderId::from("ORD-7")));
        assert!(!service.is_locked().await);
        assert!(verify_chain(&audit.entries()).is_ok());
    }

    #[tokio::test]
    async fn test_unlock_errors() {
        let (service, _, _) = service(&[dec!(32.5)]);
        let err = service.unlock("no reason", "cashier-1").await.unwrap_err();
        assert_eq!(domain(err), LockStateError::NotLocked.into());

        service.fetch_live_rate().await.unwrap();
        service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-8")))
            .await
            .unwrap();
        let err = service.unlock("  ", "cashier-1").await.unwrap_err();
        assert_eq!(domain(err), LockStateError::ReasonRequired.into());
        assert!(service.is_locked().await);
    }

    #[tokio::test]
    async fn test_complete_releases_lock() {
        let (service, _, audit) = service(&[dec!(32.5)]);
        assert_eq!(
            service.complete("sale committed", "cashier-1").await.unwrap(),
            None
        );

        service.fetch_live_rate().await.unwrap();
        service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-9")))
            .await
            .unwrap();
        let entry = service
            .complete("sale committed", "cashier-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.action, AuditAction::Unlock);
        assert!(!service.is_locked().await);
        assert_eq!(audit.actions(), vec![AuditAction::Lock, AuditAction::Unlock]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background refresh
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ticks_while_unlocked() {
        let (service, provider, _) = service(&[dec!(32.5), dec!(33), dec!(34)]);
        service.fetch_live_rate().await.unwrap();
        service.start_refresh();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(service.live_rate().await.unwrap().rate.value(), dec!(33));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.live_rate().await.unwrap().rate.value(), dec!(34));
        service.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_freezes_rate_against_refresh() {
        let rates: Vec<Decimal> = (0..20).map(|i| dec!(32.5) + Decimal::from(i)).collect();
        let (service, provider, _) = service(&rates);
        service.fetch_live_rate().await.unwrap();
        service.start_refresh();
        assert!(service.is_refreshing());

        service
            .lock(LockRequest::live("cashier-1", order_ctx("ORD-10")))
            .await
            .unwrap();
        assert!(!service.is_refreshing());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(provider.calls(), 1);
        let quote = service.quote(&usd(dec!(100))).await.unwrap();
        assert_eq!(quote.zwg, dec!(3250.00));
        assert_eq!(
            service.current_rate().await.unwrap().rate.value(),
            dec!(32.5)
        );

        service.unlock("customer left", "cashier-1").await.unwrap();
        assert!(service.is_refreshing());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(provider.calls(), 2);
        service.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_survives_provider_outage() {
        let (service, provider, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        service.start_refresh();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(provider.calls(), 3);
        let live = service.live_rate().await.unwrap();
        assert_eq!(live.rate.value(), dec!(32.5));
        assert_eq!(live.status, RateStatus::Offline);
        assert!(service.is_refreshing());

        provider.push(Ok(dec!(33)));
        tokio::time::sleep(Duration::from_secs(30)).await;
        let live = service.live_rate().await.unwrap();
        assert_eq!(live.rate.value(), dec!(33));
        assert_eq!(live.status, RateStatus::Live);
        service.stop_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_stops_refresh() {
        let (service, _, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        service.start_refresh();
        service.complete("screen closed", "cashier-1").await.unwrap();
        assert!(!service.is_refreshing());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Claims
    // ─────────────────────────────────────────────────────────────────────────

    async fn locked_at_32_5(order: &str) -> Service {
        let (service, _, _) = service(&[dec!(32.5)]);
        service.fetch_live_rate().await.unwrap();
        service
            .lock(LockRequest::live("cashier-1", order_ctx(order)))
            .await
            .unwrap();
        service
    }

    fn award_req(order: &str, amount: Decimal, currency: CurrencyCode) -> RecordAwardRequest {
        RecordAwardRequest {
            order_id: OrderId::from(order),
            claim_reference: Some("CIMAS-2211".into()),
            amount,
            currency,
            order_total: dec!(200),
            order_currency: CurrencyCode::USD,
        }
    }

    fn payment(award_id: AwardId, amount: Decimal, currency: CurrencyCode) -> ShortfallPaymentRequest {
        ShortfallPaymentRequest {
            award_id,
            amount,
            currency,
            recorded_by: UserId::from("till-1"),
        }
    }

    #[tokio::test]
    async fn test_full_award_lifecycle() {
        let rates = locked_at_32_5("ORD-20").await;
        let claims = ClaimService::new(MemoryRepo::new());

        let award = claims
            .record_award(&rates, award_req("ORD-20", dec!(150), CurrencyCode::USD))
            .await
            .unwrap();
        assert_eq!(award.status, AwardStatus::Awarded);
        assert_eq!(award.shortfall.amount, dec!(50));

        let paid = claims
            .pay_shortfall(payment(award.id, dec!(50), CurrencyCode::USD))
            .await
            .unwrap();
        assert_eq!(paid.status, AwardStatus::ShortfallPaid);

        let settled = claims.mark_settled(award.id).await.unwrap();
        assert_eq!(settled.status, AwardStatus::Settled);

        let err = claims.mark_settled(award.id).await.unwrap_err();
        assert_eq!(domain(err), DomainError::AlreadySettled(award.id));
    }

    #[tokio::test]
    async fn test_award_exceeding_order_is_rejected() {
        let rates = locked_at_32_5("ORD-21").await;
        let claims = ClaimService::new(MemoryRepo::new());

        let err = claims
            .record_award(&rates, award_req("ORD-21", dec!(7000), CurrencyCode::ZWG))
            .await
            .unwrap_err();
        assert_eq!(
            domain(err),
            DomainError::ExceedsOrderTotal {
                award_usd: dec!(215.38),
                order_total_usd: dec!(200),
            }
        );
        let stored = claims
            .list_awards(&OrderId::from("ORD-21"))
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_award_must_use_the_orders_lock() {
        let rates = locked_at_32_5("ORD-22").await;
        let claims = ClaimService::new(MemoryRepo::new());
        let err = claims
            .record_award(&rates, award_req("ORD-99", dec!(100), CurrencyCode::USD))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_shortfall_payment_is_idempotent() {
        let rates = locked_at_32_5("ORD-23").await;
        let claims = ClaimService::new(MemoryRepo::new());
        let award = claims
            .record_award(&rates, award_req("ORD-23", dec!(150), CurrencyCode::USD))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            claims.pay_shortfall(payment(award.id, dec!(50), CurrencyCode::USD)),
            claims.pay_shortfall(payment(award.id, dec!(1625), CurrencyCode::ZWG)),
        );
        let first = first.unwrap();
        assert!(matches!(
            domain(second.unwrap_err()),
            DomainError::AlreadyPaid { .. }
        ));

        let stored = claims.get_award(award.id).await.unwrap();
        assert_eq!(stored, first);
        let paid_with = stored.shortfall.payment.unwrap();
        assert_eq!(paid_with.amount.currency(), CurrencyCode::USD);
    }

    /// Award store whose writes wait until `writers` updates are in flight.
    struct GatedAwards {
        inner: MemoryRepo,
        gate: Barrier,
        updates: AtomicUsize,
    }

    impl GatedAwards {
        fn new(writers: usize) -> Self {
            Self {
                inner: MemoryRepo::new(),
                gate: Barrier::new(writers),
                updates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AwardRepository for GatedAwards {
        async fn insert_award(&self, award: &Award) -> Result<(), RepoError> {
            self.inner.insert_award(award).await
        }

        async fn get_award(&self, id: AwardId) -> Result<Option<Award>, RepoError> {
            self.inner.get_award(id).await
        }

        async fn list_awards_for_order(&self, order_id: &OrderId) -> Result<Vec<Award>, RepoError> {
            self.inner.list_awards_for_order(order_id).await
        }

        async fn update_award(&self, award: &Award, expected: AwardStatus) -> Result<(), RepoError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.gate.wait().await;
            self.inner.update_award(award, expected).await
        }
    }

    #[tokio::test]
    async fn test_losing_payment_race_reports_already_paid() {
        let rates = locked_at_32_5("ORD-25").await;
        let claims = ClaimService::new(GatedAwards::new(2));
        let award = claims
            .record_award(&rates, award_req("ORD-25", dec!(150), CurrencyCode::USD))
            .await
            .unwrap();

        // Both payments read `awarded` before either write lands.
        let (usd, zwg) = tokio::join!(
            claims.pay_shortfall(payment(award.id, dec!(50), CurrencyCode::USD)),
            claims.pay_shortfall(payment(award.id, dec!(1625), CurrencyCode::ZWG)),
        );
        assert_eq!(claims.repo().updates.load(Ordering::SeqCst), 2);

        let (winner, loser, winning_currency) = match (usd, zwg) {
            (Ok(paid), Err(e)) => (paid, e, CurrencyCode::USD),
            (Err(e), Ok(paid)) => (paid, e, CurrencyCode::ZWG),
            (usd, zwg) => panic!("expected exactly one payment to land: {usd:?} / {zwg:?}"),
        };
        assert!(!matches!(loser, AppError::Conflict(_)));
        assert!(matches!(domain(loser), DomainError::AlreadyPaid { .. }));

        let stored = claims.get_award(award.id).await.unwrap();
        assert_eq!(stored, winner);
        assert_eq!(stored.status, AwardStatus::ShortfallPaid);
        let paid_with = stored.shortfall.payment.unwrap();
        assert_eq!(paid_with.amount.currency(), winning_currency);
    }

    #[tokio::test]
    async fn test_award_after_unlock_is_refused() {
        let rates = locked_at_32_5("ORD-26").await;
        rates.unlock("wrong patient", "cashier-1").await.unwrap();
        let claims = ClaimService::new(MemoryRepo::new());

        let err = claims
            .record_award(&rates, award_req("ORD-26", dec!(150), CurrencyCode::USD))
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::LockState(LockStateError::NotLocked));
        assert!(claims
            .list_awards(&OrderId::from("ORD-26"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unconvertible_award_is_rejected() {
        let rates = locked_at_32_5("ORD-27").await;
        let claims = ClaimService::new(MemoryRepo::new());

        let err = claims
            .record_award(&rates, award_req("ORD-27", Decimal::MAX, CurrencyCode::USD))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(
            domain(err),
            DomainError::AmountOutOfRange {
                value: Decimal::MAX,
                rate: dec!(32.5),
            }
        );
    }

    #[tokio::test]
    async fn test_reject_award() {
        let rates = locked_at_32_5("ORD-24").await;
        let claims = ClaimService::new(MemoryRepo::new());
        let award = claims
            .record_award(&rates, award_req("ORD-24", dec!(150), CurrencyCode::USD))
            .await
            .unwrap();

        let rejected = claims
            .reject_award(award.id, "membership lapsed")
            .await
            .unwrap();
        assert_eq!(rejected.status, AwardStatus::Rejected);

        let err = claims
            .pay_shortfall(payment(award.id, dec!(50), CurrencyCode::USD))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_unknown_award() {
        let claims = ClaimService::new(MemoryRepo::new());
        let id = AwardId::new();
        let err = claims.mark_settled(id).await.unwrap_err();
        assert_eq!(domain(err), DomainError::AwardNotFound(id));
    }
}
