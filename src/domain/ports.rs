use super::enrollment::{Enrollment, EnrollmentId, PaymentStatus, PaymentType};
use super::events::EnrollmentEvent;
use super::reminder::ReminderPayload;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Selects enrollments by payment type, optionally excluding one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub payment_type: Option<PaymentType>,
    pub exclude_status: Option<PaymentStatus>,
}

impl EnrollmentFilter {
    /// Installment enrollments that are not completed yet.
    pub fn open_installments() -> Self {
        Self {
            payment_type: Some(PaymentType::Installment),
            exclude_status: Some(PaymentStatus::Completed),
        }
    }

    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.payment_type
            .is_none_or(|t| enrollment.payment_type == t)
            && self
                .exclude_status
                .is_none_or(|s| enrollment.payment_status != s)
    }
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Stores a brand new enrollment; fails with `AlreadyExists` on a known id.
    async fn insert(&self, enrollment: Enrollment) -> Result<()>;
    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;
    async fn find(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>>;
    async fn all(&self) -> Result<Vec<Enrollment>>;
    /// Writes `enrollment` if the stored version still equals `enrollment.version`.
    ///
    /// Returns the new version, or `PersistenceConflict` when someone else
    /// saved in between.
    async fn save(&self, enrollment: &Enrollment) -> Result<u64>;
}

/// Delivery side of reminders and events. Failures stay inside the notifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The payload names the learner and course, so no enrollment is passed.
    async fn send_reminder(&self, reminder: &ReminderPayload);
    async fn publish(&self, event: &EnrollmentEvent);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for all due-date arithmetic.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub type EnrollmentStoreBox = Box<dyn EnrollmentStore>;
pub type NotifierBox = Box<dyn Notifier>;
pub type ClockBox = Box<dyn Clock>;
pub type EnrollmentStoreFactory = Box<dyn Fn() -> EnrollmentStoreBox + Send + Sync>;
