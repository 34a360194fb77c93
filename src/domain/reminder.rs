use super::enrollment::{CourseId, EnrollmentId, LearnerId};
use super::money::{Amount, Currency};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// What a learner needs to be told about their next installment.
///
/// `days_until_due` is always the absolute distance to the due date; read it
/// together with `is_overdue`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderPayload {
    #[serde(rename = "enrollment")]
    pub enrollment_id: EnrollmentId,
    #[serde(rename = "learner")]
    pub learner_id: LearnerId,
    #[serde(skip)]
    pub course_id: CourseId,
    pub course_name: String,
    #[serde(rename = "overdue")]
    pub is_overdue: bool,
    #[serde(rename = "days")]
    pub days_until_due: u64,
    pub amount: Amount,
    pub currency: Currency,
    pub next_payment_due: NaiveDate,
    /// Everything still owed, this installment included.
    pub outstanding: Decimal,
}
