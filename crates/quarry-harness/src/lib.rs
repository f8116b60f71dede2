//! # quarry-harness
//!
//! Deterministic scenario runner and structured JSONL logging for the
//! quarry allocator substrate. The harness drives a [`quarry_core::Manager`]
//! through seeded traces, audits the heap after every step, and emits a
//! machine-readable log of what happened.

#![forbid(unsafe_code)]

pub mod scenario;
pub mod structured_log;

pub use scenario::{ShowcaseStage, TraceConfig, TraceReport, run_trace, showcase};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, validate_log_line};
