//! Batch pass over open installment enrollments.
//!
//! The sweep refreshes each enrollment's status and gathers the reminders
//! that should go out. It never sends anything and never stops on a bad
//! record: failures are collected next to the successes.

use super::enrollment::{Enrollment, EnrollmentId};
use super::events::EnrollmentEvent;
use super::policy::BillingPolicy;
use super::reminder::ReminderPayload;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;

/// One enrollment that could not be processed during a sweep.
#[derive(Debug)]
pub struct SweepItemFailure {
    pub enrollment_id: EnrollmentId,
    pub error: BillingError,
}

/// Result of sweeping a single enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepItem {
    /// `None` once the enrollment no longer owes anything.
    pub reminder: Option<ReminderPayload>,
    /// Status transition caused by this sweep, if any.
    pub event: Option<EnrollmentEvent>,
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub processed: usize,
    pub reminders: Vec<ReminderPayload>,
    pub events: Vec<EnrollmentEvent>,
    pub failures: Vec<SweepItemFailure>,
}

impl SweepOutcome {
    pub fn record(&mut self, enrollment_id: EnrollmentId, result: Result<SweepItem>) {
        self.processed += 1;
        match result {
            Ok(item) => {
                self.reminders.extend(item.reminder);
                self.events.extend(item.event);
            }
            Err(error) => self.failures.push(SweepItemFailure {
                enrollment_id,
                error,
            }),
        }
    }
}

/// Refreshes one enrollment and builds its reminder.
///
/// On error the enrollment is left as it was.
pub fn sweep_enrollment(
    enrollment: &mut Enrollment,
    today: NaiveDate,
    policy: &BillingPolicy,
) -> Result<SweepItem> {
    let event = enrollment.update_access_status(today, policy)?;
    let reminder = if enrollment.is_open_installment() {
        Some(enrollment.reminder(today)?)
    } else {
        None
    };
    Ok(SweepItem { reminder, event })
}

/// Sweeps every open installment enrollment in `enrollments`, in place.
///
/// Full-payment and completed enrollments are skipped and not counted.
pub fn sweep_overdue_reminders(
    enrollments: &mut [Enrollment],
    today: NaiveDate,
    policy: &BillingPolicy,
) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    for enrollment in enrollments.iter_mut().filter(|e| e.is_open_installment()) {
        let result = sweep_enrollment(enrollment, today, policy);
        outcome.record(enrollment.id, result);
    }
    outcome
}
