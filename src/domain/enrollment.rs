use super::events::EnrollmentEvent;
use super::money::{Amount, Currency};
use super::policy::BillingPolicy;
use super::reminder::ReminderPayload;
use crate::error::{BillingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type EnrollmentId = u64;
pub type LearnerId = u64;
pub type CourseId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Full,
    Installment,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Installment => "installment",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle of an enrollment.
///
/// `pending -> active <-> overdue -> blocked`, `active -> completed`.
/// `completed` never changes again; `blocked` only leaves through
/// administrative reactivation, which this crate does not perform.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Active,
    Completed,
    Overdue,
    Blocked,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
            Self::Blocked => "blocked",
        }
    }

    fn accepts_payment(&self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Overdue)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the learner can see the course content.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    #[default]
    Granted,
    Restricted,
}

/// Request to open an enrollment, as handed over by the catalog API.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnrollment {
    pub id: EnrollmentId,
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub course_name: String,
    pub payment_type: PaymentType,
    pub installment_amount: Amount,
    pub currency: Currency,
    pub total_installments: u32,
    /// Whether the first (or only) payment was captured at checkout.
    pub first_payment_captured: bool,
}

/// One learner's purchase of one course.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Enrollment {
    pub id: EnrollmentId,
    #[serde(rename = "learner")]
    pub learner_id: LearnerId,
    #[serde(rename = "course")]
    pub course_id: CourseId,
    pub course_name: String,
    pub payment_type: PaymentType,
    pub payment_status: PaymentStatus,
    pub installment_amount: Amount,
    pub currency: Currency,
    pub total_installments: u32,
    pub installments_paid: u32,
    pub next_payment_due: Option<NaiveDate>,
    pub access_status: AccessStatus,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
}

impl Enrollment {
    /// Opens a new enrollment and returns it with the events to emit.
    pub fn open(
        new: NewEnrollment,
        created_at: DateTime<Utc>,
        policy: &BillingPolicy,
    ) -> Result<(Self, Vec<EnrollmentEvent>)> {
        if new.total_installments == 0 {
            return Err(BillingError::ValidationError(format!(
                "Enrollment {} must have at least one installment",
                new.id
            )));
        }
        if new.payment_type == PaymentType::Full && new.total_installments != 1 {
            return Err(BillingError::ValidationError(format!(
                "Full-payment enrollment {} must have exactly one installment",
                new.id
            )));
        }

        let enrolled_on = created_at.date_naive();
        let installments_paid = u32::from(new.first_payment_captured);
        let (payment_status, next_payment_due) = if installments_paid == new.total_installments {
            (PaymentStatus::Completed, None)
        } else {
            match (new.payment_type, new.first_payment_captured) {
                (PaymentType::Full, _) => (PaymentStatus::Pending, None),
                (PaymentType::Installment, true) => (
                    PaymentStatus::Active,
                    Some(policy.next_due_date(enrolled_on)?),
                ),
                (PaymentType::Installment, false) => (PaymentStatus::Pending, Some(enrolled_on)),
            }
        };

        let enrollment = Self {
            id: new.id,
            learner_id: new.learner_id,
            course_id: new.course_id,
            course_name: new.course_name,
            payment_type: new.payment_type,
            payment_status,
            installment_amount: new.installment_amount,
            currency: new.currency,
            total_installments: new.total_installments,
            installments_paid,
            next_payment_due,
            access_status: AccessStatus::Granted,
            created_at,
            version: 0,
        };

        let mut events = vec![EnrollmentEvent::Enrolled {
            enrollment_id: enrollment.id,
            status: enrollment.payment_status,
        }];
        if enrollment.payment_status == PaymentStatus::Completed {
            events.push(EnrollmentEvent::Completed {
                enrollment_id: enrollment.id,
            });
        }
        Ok((enrollment, events))
    }

    /// Checks every data-model invariant.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| {
            Err(BillingError::ValidationError(format!(
                "Enrollment {}: {msg}",
                self.id
            )))
        };

        if self.total_installments == 0 {
            return fail("total_installments must be at least 1");
        }
        if self.installments_paid > self.total_installments {
            return fail("installments_paid exceeds total_installments");
        }
        if self.payment_type == PaymentType::Full {
            if self.total_installments != 1 {
                return fail("full payment must have exactly one installment");
            }
            if self.next_payment_due.is_some() {
                return fail("full payment cannot have a due date");
            }
        }
        if self.payment_status == PaymentStatus::Completed {
            if self.installments_paid != self.total_installments {
                return fail("completed enrollment must have every installment paid");
            }
            if self.next_payment_due.is_some() {
                return fail("completed enrollment cannot have a due date");
            }
        } else if self.installments_paid == self.total_installments {
            return fail("fully paid enrollment must be completed");
        }
        if self.payment_type == PaymentType::Installment
            && self.payment_status != PaymentStatus::Completed
            && self.next_payment_due.is_none()
        {
            return fail("open installment enrollment must have a due date");
        }
        if self.access_status == AccessStatus::Restricted
            && !matches!(
                self.payment_status,
                PaymentStatus::Overdue | PaymentStatus::Blocked
            )
        {
            return fail("access can only be restricted while overdue or blocked");
        }
        Ok(())
    }

    /// Installment enrollment that still has payments outstanding.
    pub fn is_open_installment(&self) -> bool {
        self.payment_type == PaymentType::Installment
            && self.payment_status != PaymentStatus::Completed
    }

    /// Amount still owed across the remaining installments.
    pub fn outstanding_balance(&self) -> rust_decimal::Decimal {
        self.installment_amount
            .times(self.total_installments - self.installments_paid.min(self.total_installments))
    }

    /// Signed calendar days from `today` to the next due date; negative when overdue.
    pub fn days_until_due(&self, today: NaiveDate) -> Result<i64> {
        let due = self.due_date()?;
        Ok((due - today).num_days())
    }

    /// True iff a due date exists and `today` is past it.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.next_payment_due.is_some_and(|due| today > due)
    }

    /// Applies one captured installment payment.
    ///
    /// The enrollment is left untouched when this returns an error.
    pub fn record_payment(
        &mut self,
        amount: Amount,
        policy: &BillingPolicy,
    ) -> Result<Vec<EnrollmentEvent>> {
        if self.payment_type != PaymentType::Installment
            || !self.payment_status.accepts_payment()
        {
            return Err(BillingError::PaymentNotAccepted {
                enrollment: self.id,
                payment_type: self.payment_type,
                status: self.payment_status,
            });
        }
        if amount != self.installment_amount {
            return Err(BillingError::InvalidPaymentAmount {
                enrollment: self.id,
                expected: self.installment_amount.value(),
                actual: amount.value(),
            });
        }
        if self.installments_paid >= self.total_installments {
            return Err(BillingError::ValidationError(format!(
                "Enrollment {} has no installments left to pay",
                self.id
            )));
        }

        let due = self.due_date()?;
        let installments_paid = self.installments_paid + 1;
        let completed = installments_paid == self.total_installments;
        // Advance from the previous due date, not from the payment day.
        let next_payment_due = if completed {
            None
        } else {
            Some(policy.next_due_date(due)?)
        };

        self.installments_paid = installments_paid;
        self.next_payment_due = next_payment_due;
        self.access_status = AccessStatus::Granted;
        self.payment_status = if completed {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Active
        };

        let mut events = vec![EnrollmentEvent::PaymentRecorded {
            enrollment_id: self.id,
            installment: installments_paid,
            of: self.total_installments,
            amount,
            currency: self.currency.clone(),
            next_payment_due,
        }];
        if completed {
            events.push(EnrollmentEvent::Completed {
                enrollment_id: self.id,
            });
        }
        Ok(events)
    }

    /// Recomputes payment and access status for `today`.
    ///
    /// Idempotent: a second call with the same `today` changes nothing and
    /// returns `None`. Returns the transition event when something changed.
    pub fn update_access_status(
        &mut self,
        today: NaiveDate,
        policy: &BillingPolicy,
    ) -> Result<Option<EnrollmentEvent>> {
        if !self.is_open_installment() {
            self.access_status = AccessStatus::Granted;
            return Ok(None);
        }
        if self.payment_status == PaymentStatus::Blocked {
            self.access_status = AccessStatus::Restricted;
            return Ok(None);
        }

        let days_until_due = self.days_until_due(today)?;
        let (status, access) = if days_until_due < 0 && policy.exceeds_grace(-days_until_due) {
            (PaymentStatus::Blocked, AccessStatus::Restricted)
        } else if days_until_due < 0 {
            (PaymentStatus::Overdue, self.access_status)
        } else {
            (PaymentStatus::Active, AccessStatus::Granted)
        };

        if status == self.payment_status && access == self.access_status {
            return Ok(None);
        }

        let from = self.payment_status;
        self.payment_status = status;
        self.access_status = access;
        Ok(Some(EnrollmentEvent::StatusChanged {
            enrollment_id: self.id,
            from,
            to: status,
            access,
        }))
    }

    /// Builds the reminder for an enrollment that still owes money.
    pub fn reminder(&self, today: NaiveDate) -> Result<ReminderPayload> {
        let next_payment_due = self.due_date()?;
        Ok(ReminderPayload {
            enrollment_id: self.id,
            learner_id: self.learner_id,
            course_id: self.course_id,
            course_name: self.course_name.clone(),
            is_overdue: self.is_overdue(today),
            days_until_due: (next_payment_due - today).num_days().unsigned_abs(),
            amount: self.installment_amount,
            currency: self.currency.clone(),
            next_payment_due,
            outstanding: self.outstanding_balance(),
        })
    }

    fn due_date(&self) -> Result<NaiveDate> {
        if self.payment_type == PaymentType::Full {
            return Err(BillingError::NoDueDate {
                enrollment: self.id,
                reason: "full payment has no installment schedule",
            });
        }
        if self.payment_status == PaymentStatus::Completed {
            return Err(BillingError::NoDueDate {
                enrollment: self.id,
                reason: "all installments are paid",
            });
        }
        self.next_payment_due.ok_or(BillingError::NoDueDate {
            enrollment: self.id,
            reason: "due date missing",
        })
    }
}
