use crate::domain::enrollment::EnrollmentId;
use crate::domain::money::Amount;
use crate::error::{BillingError, Result};
use serde::Deserialize;
use std::io::Read;

/// One captured installment payment: `enrollment,amount`.
#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
pub struct PaymentRecord {
    pub enrollment: EnrollmentId,
    pub amount: Amount,
}

/// Reads captured payments from a CSV source, in file order.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn payments(self) -> impl Iterator<Item = Result<PaymentRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
