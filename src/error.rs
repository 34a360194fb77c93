use crate::domain::enrollment::{EnrollmentId, PaymentStatus, PaymentType};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invalid payment amount for enrollment {enrollment}: expected {expected}, got {actual}")]
    InvalidPaymentAmount {
        enrollment: EnrollmentId,
        expected: Decimal,
        actual: Decimal,
    },
    #[error("Enrollment {enrollment} has no payment due date: {reason}")]
    NoDueDate {
        enrollment: EnrollmentId,
        reason: &'static str,
    },
    #[error(
        "Concurrent update on enrollment {enrollment}: expected version {expected}, found {found}"
    )]
    PersistenceConflict {
        enrollment: EnrollmentId,
        expected: u64,
        found: u64,
    },
    #[error("Enrollment {enrollment} ({payment_type}, {status}) does not accept installment payments")]
    PaymentNotAccepted {
        enrollment: EnrollmentId,
        payment_type: PaymentType,
        status: PaymentStatus,
    },
    #[error("Enrollment {0} not found")]
    NotFound(EnrollmentId),
    #[error("Enrollment {0} already exists")]
    AlreadyExists(EnrollmentId),
    #[error("Processing enrollment {enrollment} timed out after {timeout_ms}ms")]
    Timeout {
        enrollment: EnrollmentId,
        timeout_ms: u128,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BillingError {
    /// Whether re-running the whole operation against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
