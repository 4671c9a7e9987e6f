//! Run controller: fans prioritized tasks out to a bounded worker pool

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gauntlet_core::config::validation::validate_run_config;
use gauntlet_core::{ReportConfig, RunConfig};

use crate::aggregate::{Aggregation, Aggregator, RunCounters, RunTotals};
use crate::error::Result;
use crate::executor::{RetryExecutor, TaskOutcome, TaskStatus};
use crate::monitor::{export_csv, ProcessSampler, ResourceMonitor, ResourceSample};
use crate::progress::{ProgressReporter, TracingReporter};
use crate::report::{ReportFormat, ReportGenerator, ReportParts, RunReport};
use crate::schedule::prioritize;
use crate::task::TaskDefinition;

const STOPPED_BY_CALLER: &str = "stopped by caller";

/// Outcome of [`Orchestrator::run_and_persist`].
///
/// The report is always present; persistence failures are kept apart so a
/// caller can tell "tasks failed" from "could not write the report".
#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    pub samples: Vec<ResourceSample>,
    pub persisted: Result<()>,
}

struct Execution {
    report: RunReport,
    samples: Vec<ResourceSample>,
}

type Queue = Arc<Mutex<VecDeque<TaskDefinition>>>;

/// Cancellation for one run, carrying the first reason it was triggered
#[derive(Clone)]
struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Only the first reason sticks; later triggers just cancel again.
    fn trigger(&self, reason: String) {
        if self.reason.set(reason).is_ok() {
            if let Some(reason) = self.reason.get() {
                warn!(%reason, "aborting run");
            }
        }
        self.token.cancel();
    }

    fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    fn reason(&self) -> Option<String> {
        if let Some(reason) = self.reason.get() {
            Some(reason.clone())
        } else if self.token.is_cancelled() {
            Some(STOPPED_BY_CALLER.to_string())
        } else {
            None
        }
    }
}

/// Executes a set of tasks with bounded parallelism, retries and fail-fast
pub struct Orchestrator {
    config: RunConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    counters: Mutex<Arc<RunCounters>>,
    suite: Option<String>,
}

impl Orchestrator {
    /// Create an orchestrator; rejects a config with zero workers or zero timeouts
    pub fn new(config: RunConfig) -> Result<Self> {
        validate_run_config(&config)?;
        Ok(Self {
            config,
            reporter: Arc::new(TracingReporter),
            cancel: CancellationToken::new(),
            counters: Mutex::new(Arc::new(RunCounters::default())),
            suite: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Name the suite in the report environment and headers
    pub fn with_suite_name(mut self, name: impl Into<String>) -> Self {
        self.suite = Some(name.into());
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that stops any current or future run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new tasks; in-flight tasks run to completion
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Totals of the current (or most recent) run, readable while it is in flight
    pub fn progress(&self) -> RunTotals {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot()
    }

    /// Run all tasks and build the report
    pub async fn run(&self, tasks: Vec<TaskDefinition>) -> Result<RunReport> {
        Ok(self.execute(tasks).await.report)
    }

    /// Run all tasks, then write every configured report target
    pub async fn run_and_persist(
        &self,
        tasks: Vec<TaskDefinition>,
        targets: &ReportConfig,
    ) -> Result<RunSummary> {
        let Execution { report, samples } = self.execute(tasks).await;
        let persisted = persist(&report, &samples, targets);
        if let Err(ref e) = persisted {
            error!(error = %e, "failed to persist run report");
        }

        Ok(RunSummary {
            report,
            samples,
            persisted,
        })
    }

    async fn execute(&self, tasks: Vec<TaskDefinition>) -> Execution {
        let start_time = Utc::now();
        let started = Instant::now();
        let submitted = tasks.len();
        let counters = Arc::new(RunCounters::default());
        *self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = counters.clone();

        if tasks.is_empty() {
            debug!("no tasks to run");
            return Execution {
                report: RunReport::assemble(ReportParts {
                    start_time,
                    end_time: Utc::now(),
                    elapsed: started.elapsed(),
                    submitted: 0,
                    totals: Default::default(),
                    outcomes: Vec::new(),
                    environment: self.environment(),
                    resources: Default::default(),
                    events: Vec::new(),
                    abort_reason: None,
                }),
                samples: Vec::new(),
            };
        }

        let ordered = prioritize(&tasks);
        let workers = self.config.workers.min(ordered.len());
        info!(tasks = submitted, workers, "starting run");

        let mut monitor = ResourceMonitor::new(self.config.sample_interval());
        monitor.start(ProcessSampler::current());

        let abort = AbortSignal::new(self.cancel.child_token());
        let timer = self.config.run_timeout().map(|limit| {
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = abort.token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        abort.trigger(format!("run timeout of {:?} exceeded", limit));
                    }
                }
            })
        });

        let (aggregation, aggregator, events) = Aggregation::start(
            counters,
            submitted,
            self.reporter.clone(),
            self.config.record_events,
        );
        let executor = RetryExecutor::new(&self.config, events);
        let queue: Queue = Arc::new(Mutex::new(ordered.into_iter().collect()));

        let handles: Vec<JoinHandle<bool>> = (0..workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    queue.clone(),
                    executor.clone(),
                    aggregator.clone(),
                    abort.clone(),
                    self.config.skip_unstarted,
                ))
            })
            .collect();
        drop(executor);

        let mut dropped = false;
        for handle in handles {
            match handle.await {
                Ok(left_unstarted) => dropped |= left_unstarted,
                Err(e) => error!(error = %e, "worker failed"),
            }
        }

        // A timer firing after the last task finished must not count as an abort.
        if let Some(timer) = timer {
            timer.abort();
        }

        let unstarted: Vec<TaskDefinition> = lock(&queue).drain(..).collect();
        let abort_reason = if dropped || !unstarted.is_empty() {
            abort.reason()
        } else {
            None
        };
        if !unstarted.is_empty() {
            if self.config.skip_unstarted {
                for task in &unstarted {
                    aggregator.record(TaskOutcome::skipped(task)).await;
                }
            } else {
                debug!(count = unstarted.len(), "tasks never started");
            }
        }
        drop(aggregator);

        let collected = aggregation.finish().await;
        let samples = monitor.stop().await.to_vec();
        let resources = monitor.summary();
        let elapsed = started.elapsed();

        info!(
            passed = collected.totals.passed,
            failed = collected.totals.failed,
            skipped = collected.totals.skipped,
            retries = collected.totals.retries,
            aborted = abort_reason.is_some(),
            duration_ms = elapsed.as_millis() as u64,
            "run finished"
        );

        Execution {
            report: RunReport::assemble(ReportParts {
                start_time,
                end_time: Utc::now(),
                elapsed,
                submitted,
                totals: collected.totals,
                outcomes: collected.outcomes,
                environment: self.environment(),
                resources,
                events: collected.events,
                abort_reason,
            }),
            samples,
        }
    }

    fn environment(&self) -> BTreeMap<String, String> {
        let mut environment = BTreeMap::from([
            ("max_workers".to_string(), self.config.workers.to_string()),
            ("max_retries".to_string(), self.config.max_retries.to_string()),
            ("timeout".to_string(), format!("{:?}", self.config.timeout())),
            ("backoff".to_string(), format!("{:?}", self.config.backoff_unit())),
            (
                "platform".to_string(),
                format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            ),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ]);
        if let Some(ref suite) = self.suite {
            environment.insert("suite".to_string(), suite.clone());
        }
        environment
    }
}

fn lock(queue: &Queue) -> std::sync::MutexGuard<'_, VecDeque<TaskDefinition>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns true if the worker dequeued a task it then never started
async fn worker(
    id: usize,
    queue: Queue,
    executor: RetryExecutor,
    aggregator: Aggregator,
    abort: AbortSignal,
    skip_unstarted: bool,
) -> bool {
    debug!(worker = id, "worker started");

    loop {
        if abort.is_triggered() {
            break;
        }
        let Some(task) = lock(&queue).pop_front() else {
            break;
        };
        // Cancelled between the check and the dequeue: never start it.
        if abort.is_triggered() {
            if skip_unstarted {
                aggregator.record(TaskOutcome::skipped(&task)).await;
            }
            debug!(worker = id, task = %task.name, "dropped dequeued task");
            return true;
        }

        let outcome = executor.execute(&task).await;
        let required_failed = task.required && outcome.status == TaskStatus::Failed;
        aggregator.record(outcome).await;

        if required_failed {
            abort.trigger(format!("required task '{}' failed", task.name));
        }
    }

    debug!(worker = id, "worker finished");
    false
}

fn persist(report: &RunReport, samples: &[ResourceSample], targets: &ReportConfig) -> Result<()> {
    ReportGenerator::write_to_file(report, ReportFormat::Json, &targets.json)?;
    info!(path = %targets.json.display(), "wrote JSON report");

    ReportGenerator::write_to_file(report, ReportFormat::Html, &targets.html)?;
    info!(path = %targets.html.display(), "wrote HTML report");

    if let Some(ref path) = targets.junit {
        ReportGenerator::write_to_file(report, ReportFormat::Junit, path)?;
        info!(path = %path.display(), "wrote JUnit report");
    }

    if let Some(ref path) = targets.metrics_csv {
        export_csv(samples, path)?;
        info!(path = %path.display(), "wrote resource metrics");
    }

    Ok(())
}
