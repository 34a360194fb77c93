use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use enrollment_billing::application::engine::BillingEngine;
use enrollment_billing::application::scheduler::JobRunner;
use enrollment_billing::config::{PolicyArgs, ScheduleArgs, SweepArgs};
use enrollment_billing::domain::ports::{ClockBox, EnrollmentStoreBox};
use enrollment_billing::error::BillingError;
use enrollment_billing::infrastructure::clock::{FixedClock, SystemClock};
use enrollment_billing::infrastructure::in_memory::InMemoryEnrollmentStore;
use enrollment_billing::infrastructure::notifier::TracingNotifier;
#[cfg(feature = "storage-rocksdb")]
use enrollment_billing::infrastructure::rocksdb::RocksDBStore;
use enrollment_billing::interfaces::csv::enrollment_reader::EnrollmentReader;
use enrollment_billing::interfaces::csv::payment_reader::PaymentReader;
use enrollment_billing::interfaces::csv::reminder_writer::ReminderWriter;
use enrollment_billing::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply captured payments, run one sweep and print the due reminders
    Sweep(SweepCommand),
    /// Run the reminder and overdue-check jobs until interrupted
    Schedule(ScheduleCommand),
}

#[derive(Args)]
struct EngineArgs {
    /// Input enrollments CSV file
    enrollments: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Evaluate due dates as of this day (YYYY-MM-DD) instead of today
    #[arg(long)]
    today: Option<NaiveDate>,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(Args)]
struct SweepCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Captured payments CSV file (enrollment, amount), applied in order
    #[arg(long)]
    payments: Option<PathBuf>,

    /// Output format for reminders
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,
}

#[derive(Args)]
struct ScheduleCommand {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    schedule: ScheduleArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Sweep(cmd) => sweep(cmd).await,
        Command::Schedule(cmd) => schedule(cmd).await,
    }
}

async fn sweep(cmd: SweepCommand) -> Result<()> {
    let engine = build_engine(&cmd.engine).await?;

    if let Some(path) = cmd.payments {
        apply_payments(&engine, &path).await?;
    }

    let report = engine.sweep().await.into_diagnostic()?;
    for failure in &report.failures {
        warn!(
            enrollment_id = failure.enrollment_id,
            error = %failure.error,
            "Error sweeping enrollment"
        );
    }
    for event in &report.events {
        engine.notifier().publish(event).await;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cmd.format {
        OutputFormat::Csv => ReminderWriter::new(&mut out)
            .write_reminders(&report.reminders)
            .into_diagnostic()?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &report.reminders).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
    }

    Ok(())
}

async fn schedule(cmd: ScheduleCommand) -> Result<()> {
    let schedule = cmd.schedule.schedule().into_diagnostic()?;
    let engine = build_engine(&cmd.engine).await?;

    let runner = Arc::new(JobRunner::new(Arc::new(engine), schedule));
    runner
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    Ok(())
}

/// Builds the engine and seeds its store from the enrollments file.
async fn build_engine(args: &EngineArgs) -> Result<BillingEngine> {
    let policy = args.policy.policy().into_diagnostic()?;
    let settings = args.sweep.settings().into_diagnostic()?;
    let clock: ClockBox = match args.today {
        Some(day) => Box::new(FixedClock::on(day)),
        None => Box::new(SystemClock),
    };

    let store = open_store(args.db_path.as_deref())?;
    let engine = BillingEngine::new(store, Box::new(TracingNotifier), clock)
        .with_policy(policy)
        .with_settings(settings);

    let file = File::open(&args.enrollments).into_diagnostic()?;
    for result in EnrollmentReader::new(file).enrollments() {
        match result {
            Ok(enrollment) => {
                let id = enrollment.id;
                match engine.import(enrollment).await {
                    Ok(()) => {}
                    Err(BillingError::AlreadyExists(_)) => {
                        debug!(enrollment_id = id, "Keeping stored enrollment");
                    }
                    Err(e) => warn!(enrollment_id = id, error = %e, "Error importing enrollment"),
                }
            }
            Err(e) => warn!(error = %e, "Error reading enrollment"),
        }
    }

    let enrollments = engine.all().await.into_diagnostic()?;
    info!(enrollments = enrollments.len(), "Store ready");

    Ok(engine)
}

async fn apply_payments(engine: &BillingEngine, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for result in PaymentReader::new(file).payments() {
        match result {
            Ok(payment) => {
                if let Err(e) = engine.record_payment(payment.enrollment, payment.amount).await {
                    warn!(
                        enrollment_id = payment.enrollment,
                        error = %e,
                        "Error recording payment"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Error reading payment"),
        }
    }
    Ok(())
}

fn open_store(db_path: Option<&Path>) -> Result<EnrollmentStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Box::new(InMemoryEnrollmentStore::new()))
        }
        None => Ok(Box::new(InMemoryEnrollmentStore::new())),
    }
}
