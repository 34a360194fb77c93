//! Application layer containing the orchestration around the domain.
//!
//! `BillingEngine` is the entry point for single-enrollment operations and
//! for sweeps; `JobRunner` invokes sweeps on a fixed cadence and hands their
//! output to the notifier.

pub mod engine;
pub mod scheduler;
