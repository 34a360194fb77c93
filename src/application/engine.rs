use crate::domain::enrollment::{Enrollment, EnrollmentId, NewEnrollment};
use crate::domain::events::EnrollmentEvent;
use crate::domain::money::Amount;
use crate::domain::policy::BillingPolicy;
use crate::domain::ports::{
    Clock, ClockBox, EnrollmentFilter, EnrollmentStore, EnrollmentStoreBox, Notifier, NotifierBox,
};
use crate::domain::reminder::ReminderPayload;
use crate::domain::sweep::{SweepItem, SweepItemFailure, SweepOutcome, sweep_enrollment};
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Limits for one sweep and for conflict retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// Enrollments processed at the same time.
    pub concurrency: usize,
    /// Budget for a single enrollment, including its retries.
    pub item_timeout: Duration,
    /// Extra attempts after a `PersistenceConflict` before giving up.
    pub conflict_retries: u32,
}

impl SweepSettings {
    pub fn new(concurrency: usize, item_timeout: Duration, conflict_retries: u32) -> Result<Self> {
        if concurrency == 0 {
            return Err(BillingError::ValidationError(
                "Sweep concurrency must be at least 1".to_string(),
            ));
        }
        if item_timeout.is_zero() {
            return Err(BillingError::ValidationError(
                "Sweep item timeout must be positive".to_string(),
            ));
        }
        Ok(Self {
            concurrency,
            item_timeout,
            conflict_retries,
        })
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            concurrency: 16,
            item_timeout: Duration::from_secs(5),
            conflict_retries: 3,
        }
    }
}

/// Outcome of a payment applied through the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub enrollment: Enrollment,
    pub events: Vec<EnrollmentEvent>,
}

pub type SweepReport = SweepOutcome;

/// Drives enrollment transitions against the configured collaborators.
///
/// Each operation loads the enrollment, applies a pure transition, and writes
/// it back with an optimistic version check. A conflicting concurrent write
/// makes the engine reload and re-apply, up to `conflict_retries` times.
pub struct BillingEngine {
    store: Arc<dyn EnrollmentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: BillingPolicy,
    settings: SweepSettings,
}

impl BillingEngine {
    /// Creates a new `BillingEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Where enrollments are loaded from and saved to.
    /// * `notifier` - Receives events produced by `enroll` and `record_payment`.
    /// * `clock` - Source of "today" for every due-date computation.
    pub fn new(store: EnrollmentStoreBox, notifier: NotifierBox, clock: ClockBox) -> Self {
        Self {
            store: Arc::from(store),
            notifier: Arc::from(notifier),
            clock: Arc::from(clock),
            policy: BillingPolicy::default(),
            settings: SweepSettings::default(),
        }
    }

    pub fn with_policy(mut self, policy: BillingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: SweepSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Opens a new enrollment and publishes its creation events.
    pub async fn enroll(&self, new: NewEnrollment) -> Result<Enrollment> {
        let (enrollment, events) = Enrollment::open(new, self.clock.now(), &self.policy)?;
        self.store.insert(enrollment.clone()).await?;
        info!(
            enrollment_id = enrollment.id,
            status = %enrollment.payment_status,
            "Enrollment opened"
        );
        self.publish(&events).await;
        Ok(enrollment)
    }

    /// Inserts an enrollment that already has state, e.g. from an import.
    pub async fn import(&self, enrollment: Enrollment) -> Result<()> {
        enrollment.validate()?;
        self.store.insert(enrollment).await
    }

    pub async fn get(&self, id: EnrollmentId) -> Result<Enrollment> {
        self.store
            .get(id)
            .await?
            .ok_or(BillingError::NotFound(id))
    }

    pub async fn all(&self) -> Result<Vec<Enrollment>> {
        self.store.all().await
    }

    /// Applies one installment payment and publishes the resulting events.
    pub async fn record_payment(&self, id: EnrollmentId, amount: Amount) -> Result<PaymentReceipt> {
        let policy = self.policy;
        let (enrollment, events) = apply_with_retry(
            self.store.as_ref(),
            id,
            None,
            self.settings.conflict_retries,
            |e| e.record_payment(amount, &policy).map(Some),
        )
        .await?;
        let events = events.unwrap_or_default();
        info!(
            enrollment_id = id,
            paid = enrollment.installments_paid,
            total = enrollment.total_installments,
            status = %enrollment.payment_status,
            "Payment recorded"
        );
        self.publish(&events).await;
        Ok(PaymentReceipt { enrollment, events })
    }

    /// Recomputes and persists payment/access status for today.
    pub async fn refresh_access(&self, id: EnrollmentId) -> Result<Enrollment> {
        let today = self.today();
        let policy = self.policy;
        let (enrollment, event) = apply_with_retry(
            self.store.as_ref(),
            id,
            None,
            self.settings.conflict_retries,
            |e| e.update_access_status(today, &policy),
        )
        .await?;
        if let Some(event) = event {
            self.notifier.publish(&event).await;
        }
        Ok(enrollment)
    }

    pub async fn days_until_due(&self, id: EnrollmentId) -> Result<i64> {
        self.get(id).await?.days_until_due(self.today())
    }

    pub async fn is_overdue(&self, id: EnrollmentId) -> Result<bool> {
        Ok(self.get(id).await?.is_overdue(self.today()))
    }

    /// Builds the reminder for one enrollment without changing it.
    pub async fn reminder(&self, id: EnrollmentId) -> Result<ReminderPayload> {
        self.get(id).await?.reminder(self.today())
    }

    /// Refreshes every open installment enrollment and collects reminders.
    ///
    /// Enrollments are processed on a bounded set of tasks, each with its own
    /// timeout. Nothing is dispatched here; the caller decides what to send.
    /// Only a failure to list the enrollments fails the whole call.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let today = self.today();
        let candidates = self
            .store
            .find(&EnrollmentFilter::open_installments())
            .await?;
        debug!(count = candidates.len(), %today, "Starting sweep");

        let permits = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut pending: HashSet<EnrollmentId> = HashSet::with_capacity(candidates.len());
        let mut tasks = JoinSet::new();

        for enrollment in candidates {
            let id = enrollment.id;
            pending.insert(id);
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let policy = self.policy;
            let settings = self.settings;

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (id, Err(BillingError::InternalError(Box::new(e)))),
                };
                let work = sweep_stored(store.as_ref(), enrollment, today, &policy, settings);
                let result = match tokio::time::timeout(settings.item_timeout, work).await {
                    Ok(result) => result,
                    Err(_) => Err(BillingError::Timeout {
                        enrollment: id,
                        timeout_ms: settings.item_timeout.as_millis(),
                    }),
                };
                (id, result)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    if let Err(e) = &result {
                        warn!(enrollment_id = id, error = %e, "Sweep item failed");
                    }
                    report.record(id, result);
                }
                Err(e) => warn!(error = %e, "Sweep task aborted"),
            }
        }

        // Tasks that panicked never reported their id.
        let mut lost: Vec<EnrollmentId> = pending.into_iter().collect();
        lost.sort_unstable();
        for id in lost {
            report.processed += 1;
            report.failures.push(SweepItemFailure {
                enrollment_id: id,
                error: BillingError::InternalError(Box::new(std::io::Error::other(
                    "sweep task aborted",
                ))),
            });
        }

        report.reminders.sort_by_key(|r| r.enrollment_id);
        report.failures.sort_by_key(|f| f.enrollment_id);
        info!(
            processed = report.processed,
            reminders = report.reminders.len(),
            transitions = report.events.len(),
            failures = report.failures.len(),
            "Sweep finished"
        );
        Ok(report)
    }

    async fn publish(&self, events: &[EnrollmentEvent]) {
        for event in events {
            self.notifier.publish(event).await;
        }
    }
}

/// Sweeps one enrollment that came out of the store.
async fn sweep_stored(
    store: &dyn EnrollmentStore,
    enrollment: Enrollment,
    today: NaiveDate,
    policy: &BillingPolicy,
    settings: SweepSettings,
) -> Result<SweepItem> {
    let id = enrollment.id;
    let (_, item) = apply_with_retry(
        store,
        id,
        Some(enrollment),
        settings.conflict_retries,
        |e| {
            let item = sweep_enrollment(e, today, policy)?;
            Ok(Some(item))
        },
    )
    .await?;
    item.ok_or(BillingError::NotFound(id))
}

/// Loads (unless `preloaded`), transitions and saves, retrying on conflicts.
///
/// `transition` returns `Some(output)`; the enrollment is only written when it
/// actually changed.
async fn apply_with_retry<T, F>(
    store: &dyn EnrollmentStore,
    id: EnrollmentId,
    preloaded: Option<Enrollment>,
    retries: u32,
    mut transition: F,
) -> Result<(Enrollment, Option<T>)>
where
    F: FnMut(&mut Enrollment) -> Result<Option<T>>,
{
    let mut current = preloaded;
    let mut attempt = 0;
    loop {
        let original = match current.take() {
            Some(e) => e,
            None => store.get(id).await?.ok_or(BillingError::NotFound(id))?,
        };
        let mut updated = original.clone();
        let output = transition(&mut updated)?;
        if updated == original {
            return Ok((updated, output));
        }

        match store.save(&updated).await {
            Ok(version) => {
                updated.version = version;
                return Ok((updated, output));
            }
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                debug!(enrollment_id = id, attempt, "Version conflict, reloading");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enrollment::{AccessStatus, PaymentStatus, PaymentType};
    use crate::domain::money::Currency;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::InMemoryEnrollmentStore;
    use crate::infrastructure::notifier::TracingNotifier;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn enrollment(id: EnrollmentId, total: u32, paid: u32, due: NaiveDate) -> Enrollment {
        Enrollment {
            id,
            learner_id: id + 100,
            course_id: 1,
            course_name: "Machine Learning".to_string(),
            payment_type: PaymentType::Installment,
            payment_status: PaymentStatus::Active,
            installment_amount: Amount::new(dec!(200)).unwrap(),
            currency: Currency::new("USD").unwrap(),
            total_installments: total,
            installments_paid: paid,
            next_payment_due: Some(due),
            access_status: AccessStatus::Granted,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            version: 0,
        }
    }

    fn engine(store: InMemoryEnrollmentStore, today: NaiveDate) -> BillingEngine {
        BillingEngine::new(
            Box::new(store),
            Box::new(TracingNotifier),
            Box::new(FixedClock::on(today)),
        )
    }

    /// Store whose first `conflicts` saves are rejected as stale.
    struct ConflictingStore {
        inner: InMemoryEnrollmentStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl EnrollmentStore for ConflictingStore {
        async fn insert(&self, enrollment: Enrollment) -> Result<()> {
            self.inner.insert(enrollment).await
        }
        async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
            self.inner.get(id).await
        }
        async fn find(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
            self.inner.find(filter).await
        }
        async fn all(&self) -> Result<Vec<Enrollment>> {
            self.inner.all().await
        }
        async fn save(&self, enrollment: &Enrollment) -> Result<u64> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(BillingError::PersistenceConflict {
                    enrollment: enrollment.id,
                    expected: enrollment.version,
                    found: enrollment.version + 1,
                });
            }
            self.inner.save(enrollment).await
        }
    }

    #[tokio::test]
    async fn test_record_payment_persists() {
        let store = InMemoryEnrollmentStore::new();
        store.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let engine = engine(store.clone(), day(1, 20));

        let receipt = engine
            .record_payment(1, Amount::new(dec!(200)).unwrap())
            .await
            .unwrap();

        assert_eq!(receipt.enrollment.installments_paid, 2);
        assert_eq!(receipt.enrollment.version, 1);
        let stored = store.get(1).await.unwrap().unwrap();
        assert_eq!(stored, receipt.enrollment);
        assert_eq!(stored.next_payment_due, Some(day(3, 3)));
    }

    #[tokio::test]
    async fn test_rejected_payment_is_not_persisted() {
        let store = InMemoryEnrollmentStore::new();
        store.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let engine = engine(store.clone(), day(1, 20));

        let result = engine
            .record_payment(1, Amount::new(dec!(150)).unwrap())
            .await;

        assert!(matches!(
            result,
            Err(BillingError::InvalidPaymentAmount { .. })
        ));
        let stored = store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.installments_paid, 1);
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn test_unknown_enrollment() {
        let engine = engine(InMemoryEnrollmentStore::new(), day(1, 20));
        assert!(matches!(
            engine.record_payment(42, Amount::new(dec!(1)).unwrap()).await,
            Err(BillingError::NotFound(42))
        ));
        assert!(matches!(
            engine.days_until_due(42).await,
            Err(BillingError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let inner = InMemoryEnrollmentStore::new();
        inner.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let store = ConflictingStore {
            inner: inner.clone(),
            conflicts: AtomicU32::new(2),
        };
        let engine = BillingEngine::new(
            Box::new(store),
            Box::new(TracingNotifier),
            Box::new(FixedClock::on(day(1, 20))),
        );

        let receipt = engine
            .record_payment(1, Amount::new(dec!(200)).unwrap())
            .await
            .unwrap();

        assert_eq!(receipt.enrollment.installments_paid, 2);
        assert_eq!(inner.get(1).await.unwrap().unwrap().installments_paid, 2);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_retries() {
        let inner = InMemoryEnrollmentStore::new();
        inner.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let store = ConflictingStore {
            inner: inner.clone(),
            conflicts: AtomicU32::new(10),
        };
        let engine = BillingEngine::new(
            Box::new(store),
            Box::new(TracingNotifier),
            Box::new(FixedClock::on(day(1, 20))),
        )
        .with_settings(SweepSettings::new(4, Duration::from_secs(1), 1).unwrap());

        let result = engine
            .record_payment(1, Amount::new(dec!(200)).unwrap())
            .await;

        assert!(matches!(
            result,
            Err(BillingError::PersistenceConflict { .. })
        ));
        assert_eq!(inner.get(1).await.unwrap().unwrap().installments_paid, 1);
    }

    #[tokio::test]
    async fn test_refresh_access_writes_only_on_change() {
        let store = InMemoryEnrollmentStore::new();
        store.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let engine = engine(store.clone(), day(2, 5));

        let first = engine.refresh_access(1).await.unwrap();
        let second = engine.refresh_access(1).await.unwrap();

        assert_eq!(first.payment_status, PaymentStatus::Overdue);
        assert_eq!(first, second);
        assert_eq!(store.get(1).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_queries_use_injected_clock() {
        let store = InMemoryEnrollmentStore::new();
        store.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        let engine = engine(store, day(2, 4));

        assert_eq!(engine.days_until_due(1).await.unwrap(), -3);
        assert!(engine.is_overdue(1).await.unwrap());
        let reminder = engine.reminder(1).await.unwrap();
        assert_eq!(reminder.days_until_due, 3);
    }

    #[tokio::test]
    async fn test_enroll_stores_new_enrollment() {
        let engine = engine(InMemoryEnrollmentStore::new(), day(3, 1));
        let new = NewEnrollment {
            id: 5,
            learner_id: 50,
            course_id: 2,
            course_name: "Cloud Architecture".to_string(),
            payment_type: PaymentType::Installment,
            installment_amount: Amount::new(dec!(80)).unwrap(),
            currency: Currency::new("USD").unwrap(),
            total_installments: 3,
            first_payment_captured: true,
        };

        let e = engine.enroll(new.clone()).await.unwrap();
        assert_eq!(e.next_payment_due, Some(day(3, 31)));
        assert_eq!(engine.get(5).await.unwrap(), e);
        assert!(matches!(
            engine.enroll(new).await,
            Err(BillingError::AlreadyExists(5))
        ));
    }

    #[tokio::test]
    async fn test_sweep_collects_failures_and_reminders() {
        let store = InMemoryEnrollmentStore::new();
        store.insert(enrollment(1, 4, 1, day(2, 1))).await.unwrap();
        store.insert(enrollment(2, 4, 1, day(1, 20))).await.unwrap();
        let mut broken = enrollment(3, 4, 1, day(2, 1));
        broken.next_payment_due = None;
        store.insert(broken).await.unwrap();
        store.insert(enrollment(4, 4, 1, day(3, 1))).await.unwrap();
        let engine = engine(store.clone(), day(2, 4));

        let report = engine.sweep().await.unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.reminders.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].enrollment_id, 3);
        assert_eq!(
            store.get(1).await.unwrap().unwrap().payment_status,
            PaymentStatus::Overdue
        );
        assert_eq!(
            store.get(2).await.unwrap().unwrap().payment_status,
            PaymentStatus::Blocked
        );
        assert_eq!(
            store.get(4).await.unwrap().unwrap().payment_status,
            PaymentStatus::Active
        );
    }
}
