use crate::domain::enrollment::Enrollment;
use crate::error::{BillingError, Result};
use std::io::Read;

/// Reads enrollment snapshots from a CSV source.
///
/// Expected header:
/// `id,learner,course,course_name,payment_type,payment_status,installment_amount,currency,total_installments,installments_paid,next_payment_due,access_status,created_at`
///
/// Each row is checked against the enrollment invariants; a row that breaks
/// one is yielded as an error without stopping the stream.
pub struct EnrollmentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EnrollmentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads, deserializes and validates enrollments.
    pub fn enrollments(self) -> impl Iterator<Item = Result<Enrollment>> {
        self.reader.into_deserialize().map(|result| {
            let enrollment: Enrollment = result.map_err(BillingError::from)?;
            enrollment.validate()?;
            Ok(enrollment)
        })
    }
}
