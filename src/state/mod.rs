//! State module for tracking harvest progress
//!
//! This module provides the state shared between workers and the
//! checkpoint loggers, plus the per-job download state machine.
//!
//! # Components
//!
//! - `JobQueue`: pending listing URLs, popped by workers
//! - `ResultSink`: append-only collection of completed records
//! - `FailureLedger`: append-only collection of failed jobs and their reasons
//! - `FetchState`: the stages a package download goes through

mod fetch_state;
mod job_queue;
mod ledger;
mod sink;

// Re-export main types
pub use fetch_state::FetchState;
pub use job_queue::{Job, JobQueue};
pub use ledger::{is_terminal_reason, retry_jobs, FailureLedger, NOT_A_THEME_EXTENSION};
pub use sink::ResultSink;
