use super::enrollment::{AccessStatus, EnrollmentId, PaymentStatus};
use super::money::{Amount, Currency};
use chrono::NaiveDate;
use serde::Serialize;

/// Something the notification side should hear about.
///
/// Transitions return these instead of dispatching them, leaving delivery to
/// whoever drives the transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnrollmentEvent {
    Enrolled {
        enrollment_id: EnrollmentId,
        status: PaymentStatus,
    },
    PaymentRecorded {
        enrollment_id: EnrollmentId,
        installment: u32,
        of: u32,
        amount: Amount,
        currency: Currency,
        next_payment_due: Option<NaiveDate>,
    },
    Completed {
        enrollment_id: EnrollmentId,
    },
    StatusChanged {
        enrollment_id: EnrollmentId,
        from: PaymentStatus,
        to: PaymentStatus,
        access: AccessStatus,
    },
}

impl EnrollmentEvent {
    pub fn enrollment_id(&self) -> EnrollmentId {
        match self {
            Self::Enrolled { enrollment_id, .. }
            | Self::PaymentRecorded { enrollment_id, .. }
            | Self::Completed { enrollment_id }
            | Self::StatusChanged { enrollment_id, .. } => *enrollment_id,
        }
    }
}
