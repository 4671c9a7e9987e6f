//! Gauntlet Tasks - Parallel test orchestration engine
//!
//! This crate runs a set of independent checks over a bounded worker pool
//! with per-attempt timeouts, linear-backoff retries, fail-fast on required
//! tasks, live progress reporting, resource sampling and report generation.

pub mod aggregate;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod progress;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod task;

pub use aggregate::{RunCounters, RunTotals};
pub use error::{EngineError, Result};
pub use executor::{Backoff, RetryExecutor, TaskOutcome, TaskStatus};
pub use monitor::{
    ProcessSampler, ResourceMonitor, ResourceReading, ResourceSample, ResourceUtilization, Sampler,
};
pub use progress::{
    CollectingReporter, ConsoleReporter, Phase, ProgressEvent, ProgressReporter, ProgressSnapshot,
    ReporterRegistry, TracingReporter,
};
pub use report::{ReportFormat, ReportGenerator, RunReport};
pub use runner::{Orchestrator, RunSummary};
pub use schedule::prioritize;
pub use task::{Check, CheckFn, TaskDefinition};
