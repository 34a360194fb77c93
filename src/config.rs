//! Command-line and environment configuration.
//!
//! Every tunable can be given as a flag or through the environment; flags win.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BILLING_INTERVAL_DAYS` | 30 |
//! | `BILLING_GRACE_DAYS` | 7 |
//! | `BILLING_SWEEP_CONCURRENCY` | 16 |
//! | `BILLING_SWEEP_ITEM_TIMEOUT_MS` | 5000 |
//! | `BILLING_CONFLICT_RETRIES` | 3 |
//! | `BILLING_REMINDER_INTERVAL_SECS` | 86400 |
//! | `BILLING_OVERDUE_INTERVAL_SECS` | 21600 |

use crate::application::engine::SweepSettings;
use crate::application::scheduler::Schedule;
use crate::domain::policy::BillingPolicy;
use crate::error::Result;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Days between two installment due dates
    #[arg(long, env = "BILLING_INTERVAL_DAYS", default_value_t = BillingPolicy::DEFAULT_BILLING_INTERVAL_DAYS)]
    pub billing_interval_days: u32,

    /// Days an overdue enrollment stays viewable before it is blocked
    #[arg(long, env = "BILLING_GRACE_DAYS", default_value_t = BillingPolicy::DEFAULT_GRACE_PERIOD_DAYS)]
    pub grace_period_days: u32,
}

impl PolicyArgs {
    pub fn policy(&self) -> Result<BillingPolicy> {
        BillingPolicy::new(self.billing_interval_days, self.grace_period_days)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    /// Enrollments processed concurrently during a sweep
    #[arg(long, env = "BILLING_SWEEP_CONCURRENCY", default_value_t = 16)]
    pub concurrency: usize,

    /// Time budget for a single enrollment in a sweep, in milliseconds
    #[arg(long, env = "BILLING_SWEEP_ITEM_TIMEOUT_MS", default_value_t = 5000)]
    pub item_timeout_ms: u64,

    /// Retries after a concurrent-write conflict
    #[arg(long, env = "BILLING_CONFLICT_RETRIES", default_value_t = 3)]
    pub conflict_retries: u32,
}

impl SweepArgs {
    pub fn settings(&self) -> Result<SweepSettings> {
        SweepSettings::new(
            self.concurrency,
            Duration::from_millis(self.item_timeout_ms),
            self.conflict_retries,
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Seconds between reminder runs
    #[arg(long, env = "BILLING_REMINDER_INTERVAL_SECS", default_value_t = 86_400)]
    pub reminder_interval_secs: u64,

    /// Seconds between overdue checks
    #[arg(long, env = "BILLING_OVERDUE_INTERVAL_SECS", default_value_t = 21_600)]
    pub overdue_interval_secs: u64,
}

impl ScheduleArgs {
    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::new(
            Duration::from_secs(self.reminder_interval_secs),
            Duration::from_secs(self.overdue_interval_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        sweep: SweepArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.policy.policy().unwrap(), BillingPolicy::default());
        assert_eq!(cli.sweep.settings().unwrap(), SweepSettings::default());
        assert_eq!(cli.schedule.schedule().unwrap(), Schedule::default());
    }

    #[test]
    fn test_flags_override() {
        let cli = TestCli::parse_from([
            "test",
            "--grace-period-days",
            "3",
            "--concurrency",
            "2",
        ]);
        assert_eq!(cli.policy.policy().unwrap().grace_period_days, 3);
        assert_eq!(cli.sweep.settings().unwrap().concurrency, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cli = TestCli::parse_from(["test", "--concurrency", "0", "--billing-interval-days", "0"]);
        assert!(cli.sweep.settings().is_err());
        assert!(cli.policy.policy().is_err());
    }
}
