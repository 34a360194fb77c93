use crate::error::BillingError;
use chrono::{Days, NaiveDate};

/// Business rules for installment billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    /// Calendar days between two consecutive installment due dates.
    pub billing_interval_days: u32,
    /// Days past the due date an enrollment stays viewable before it is blocked.
    pub grace_period_days: u32,
}

impl BillingPolicy {
    pub const DEFAULT_BILLING_INTERVAL_DAYS: u32 = 30;
    pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 7;

    pub fn new(billing_interval_days: u32, grace_period_days: u32) -> Result<Self, BillingError> {
        if billing_interval_days == 0 {
            return Err(BillingError::ValidationError(
                "Billing interval must be at least one day".to_string(),
            ));
        }
        Ok(Self {
            billing_interval_days,
            grace_period_days,
        })
    }

    /// The due date one billing period after `due`.
    pub fn next_due_date(&self, due: NaiveDate) -> Result<NaiveDate, BillingError> {
        due.checked_add_days(Days::new(u64::from(self.billing_interval_days)))
            .ok_or_else(|| {
                BillingError::ValidationError(format!("Due date overflow after {due}"))
            })
    }

    /// True once an enrollment has been overdue for longer than the grace period.
    pub fn exceeds_grace(&self, days_overdue: i64) -> bool {
        days_overdue > i64::from(self.grace_period_days)
    }
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            billing_interval_days: Self::DEFAULT_BILLING_INTERVAL_DAYS,
            grace_period_days: Self::DEFAULT_GRACE_PERIOD_DAYS,
        }
    }
}
