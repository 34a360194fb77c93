#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use enrollment_billing::domain::enrollment::{
    AccessStatus, Enrollment, EnrollmentId, PaymentStatus, PaymentType,
};
use enrollment_billing::domain::events::EnrollmentEvent;
use enrollment_billing::domain::money::{Amount, Currency};
use enrollment_billing::domain::ports::Notifier;
use enrollment_billing::domain::reminder::ReminderPayload;
use rust_decimal::Decimal;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const ENROLLMENT_HEADER: &str = "id,learner,course,course_name,payment_type,payment_status,installment_amount,currency,total_installments,installments_paid,next_payment_due,access_status,created_at";

pub const FIXTURE: &str = "tests/fixtures/enrollments.csv";

/// The day the fixture is evaluated against.
pub const FIXTURE_TODAY: &str = "2026-03-15";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// An active installment enrollment with `paid` of `total` installments.
pub fn installment(id: EnrollmentId, total: u32, paid: u32, due: NaiveDate, amount: Decimal) -> Enrollment {
    Enrollment {
        id,
        learner_id: 1000 + id,
        course_id: 1,
        course_name: "Full-Stack Bootcamp".to_string(),
        payment_type: PaymentType::Installment,
        payment_status: PaymentStatus::Active,
        installment_amount: Amount::new(amount).unwrap(),
        currency: Currency::new("USD").unwrap(),
        total_installments: total,
        installments_paid: paid,
        next_payment_due: Some(due),
        access_status: AccessStatus::Granted,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        version: 0,
    }
}

/// Writes an enrollments CSV with the standard header.
pub fn enrollments_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{ENROLLMENT_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

pub fn payments_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "enrollment, amount").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

/// Notifier that remembers everything it was handed.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    pub reminders: Arc<Mutex<Vec<ReminderPayload>>>,
    pub events: Arc<Mutex<Vec<EnrollmentEvent>>>,
}

impl RecordingNotifier {
    pub fn reminder_count(&self) -> usize {
        self.reminders.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_reminder(&self, reminder: &ReminderPayload) {
        self.reminders.lock().unwrap().push(reminder.clone());
    }

    async fn publish(&self, event: &EnrollmentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
