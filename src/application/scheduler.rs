//! Recurring jobs on top of [`BillingEngine`].
//!
//! The runner owns the cadence; the engine owns none. Each job kind carries a
//! running flag, so a tick that arrives while the previous run of the same
//! job is still going is skipped rather than overlapped.

use super::engine::{BillingEngine, SweepReport};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::error::{BillingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Sweep, then send every reminder and publish every transition.
    Reminders,
    /// Sweep and publish transitions only.
    OverdueCheck,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reminders => "reminders",
            Self::OverdueCheck => "overdue-check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub reminder_interval: Duration,
    pub overdue_check_interval: Duration,
}

impl Schedule {
    pub fn new(reminder_interval: Duration, overdue_check_interval: Duration) -> Result<Self> {
        if reminder_interval.is_zero() || overdue_check_interval.is_zero() {
            return Err(BillingError::ValidationError(
                "Job intervals must be positive".to_string(),
            ));
        }
        Ok(Self {
            reminder_interval,
            overdue_check_interval,
        })
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            reminder_interval: Duration::from_secs(24 * 60 * 60),
            overdue_check_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub job: Job,
    pub processed: usize,
    pub reminders_sent: usize,
    pub events_published: usize,
    pub failures: usize,
}

/// Clears a running flag when the run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobRunner {
    engine: Arc<BillingEngine>,
    schedule: Schedule,
    reminders_running: AtomicBool,
    overdue_running: AtomicBool,
}

impl JobRunner {
    pub fn new(engine: Arc<BillingEngine>, schedule: Schedule) -> Self {
        Self {
            engine,
            schedule,
            reminders_running: AtomicBool::new(false),
            overdue_running: AtomicBool::new(false),
        }
    }

    /// Runs `job` once. Returns `Ok(None)` when a run of the same job is
    /// already in progress.
    pub async fn run_job(&self, job: Job) -> Result<Option<JobSummary>> {
        let flag = match job {
            Job::Reminders => &self.reminders_running,
            Job::OverdueCheck => &self.overdue_running,
        };
        let Some(_guard) = RunGuard::acquire(flag) else {
            warn!(job = job.name(), "Previous run still in progress, skipping");
            return Ok(None);
        };

        let report = self.engine.sweep().await?;
        let summary = self.dispatch(job, &report).await;
        info!(
            job = job.name(),
            processed = summary.processed,
            reminders = summary.reminders_sent,
            events = summary.events_published,
            failures = summary.failures,
            "Job finished"
        );
        Ok(Some(summary))
    }

    async fn dispatch(&self, job: Job, report: &SweepReport) -> JobSummary {
        let notifier = self.engine.notifier();
        for failure in &report.failures {
            warn!(
                job = job.name(),
                enrollment_id = failure.enrollment_id,
                error = %failure.error,
                "Enrollment skipped"
            );
        }

        let mut reminders_sent = 0;
        if job == Job::Reminders {
            for reminder in &report.reminders {
                notifier.send_reminder(reminder).await;
                reminders_sent += 1;
            }
        }
        for event in &report.events {
            notifier.publish(event).await;
        }

        JobSummary {
            job,
            processed: report.processed,
            reminders_sent,
            events_published: report.events.len(),
            failures: report.failures.len(),
        }
    }

    /// Runs both jobs on their intervals until `shutdown` resolves.
    ///
    /// Both tickers fire immediately on start. Runs already in progress when
    /// `shutdown` resolves are awaited so their events still go out.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut reminders = interval(self.schedule.reminder_interval);
        reminders.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut overdue = interval(self.schedule.overdue_check_interval);
        overdue.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            reminder_interval = ?self.schedule.reminder_interval,
            overdue_check_interval = ?self.schedule.overdue_check_interval,
            "Starting job runner"
        );

        let mut running = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            let job = tokio::select! {
                _ = &mut shutdown => break,
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join(joined);
                    continue;
                }
                _ = overdue.tick() => Job::OverdueCheck,
                _ = reminders.tick() => Job::Reminders,
            };

            let runner = Arc::clone(&self);
            running.spawn(async move {
                if let Err(e) = runner.run_job(job).await {
                    error!(job = job.name(), error = %e, "Job failed");
                }
            });
        }

        if !running.is_empty() {
            info!(in_flight = running.len(), "Waiting for running jobs");
        }
        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }
        info!("Job runner stopped");
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Job task aborted");
    }
}
