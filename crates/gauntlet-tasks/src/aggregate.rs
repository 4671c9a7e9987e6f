//! Result and progress aggregation
//!
//! Workers never share a mutable list. Terminal outcomes go through one
//! channel to a collector task that is the only owner of the outcome list;
//! progress events go through another channel to a task that drives the
//! reporters. Running totals are atomics so a snapshot is available at any
//! point during the run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::executor::{TaskOutcome, TaskStatus};
use crate::progress::{ProgressEvent, ProgressReporter, ProgressSnapshot};

const CHANNEL_CAPACITY: usize = 100;

/// Lock-free running totals for a run
#[derive(Debug, Default)]
pub struct RunCounters {
    passed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    retries: AtomicUsize,
}

/// Point-in-time copy of [`RunCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub retries: usize,
}

impl RunTotals {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

impl RunCounters {
    pub fn record(&self, outcome: &TaskOutcome) {
        let counter = match outcome.status {
            TaskStatus::Passed => &self.passed,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.retries
            .fetch_add(outcome.retries as usize, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> RunTotals {
        RunTotals {
            passed: self.passed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
        }
    }
}

/// Worker-side handle for recording terminal outcomes
#[derive(Debug, Clone)]
pub struct Aggregator {
    counters: Arc<RunCounters>,
    outcomes: mpsc::Sender<TaskOutcome>,
}

impl Aggregator {
    pub async fn record(&self, outcome: TaskOutcome) {
        self.counters.record(&outcome);
        if self.outcomes.send(outcome).await.is_err() {
            error!("outcome collector stopped before the run finished");
        }
    }
}

/// Everything gathered once all producers are done
#[derive(Debug, Default)]
pub struct Collected {
    pub outcomes: Vec<TaskOutcome>,
    pub events: Vec<ProgressEvent>,
    pub totals: RunTotals,
}

/// Owner of the collector and progress tasks
pub struct Aggregation {
    counters: Arc<RunCounters>,
    outcomes: JoinHandle<Vec<TaskOutcome>>,
    events: JoinHandle<Vec<ProgressEvent>>,
}

impl Aggregation {
    /// Spawn the collector and progress tasks, recording totals into `counters`.
    ///
    /// Returns the aggregation plus the two producer handles. `finish`
    /// completes once every clone of both producers has been dropped.
    pub fn start(
        counters: Arc<RunCounters>,
        total: usize,
        reporter: Arc<dyn ProgressReporter>,
        record_events: bool,
    ) -> (Self, Aggregator, mpsc::Sender<ProgressEvent>) {
        let (outcome_tx, outcome_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let aggregation = Self {
            counters: counters.clone(),
            outcomes: tokio::spawn(collect_outcomes(outcome_rx)),
            events: tokio::spawn(pump_progress(event_rx, reporter, total, record_events)),
        };
        let aggregator = Aggregator {
            counters,
            outcomes: outcome_tx,
        };

        (aggregation, aggregator, event_tx)
    }

    pub async fn finish(self) -> Collected {
        let outcomes = self.outcomes.await.unwrap_or_else(|e| {
            error!(error = %e, "outcome collector failed");
            Vec::new()
        });
        let events = self.events.await.unwrap_or_else(|e| {
            error!(error = %e, "progress reporter failed");
            Vec::new()
        });

        Collected {
            outcomes,
            events,
            totals: self.counters.snapshot(),
        }
    }
}

async fn collect_outcomes(mut rx: mpsc::Receiver<TaskOutcome>) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    outcomes
}

async fn pump_progress(
    mut rx: mpsc::Receiver<ProgressEvent>,
    reporter: Arc<dyn ProgressReporter>,
    total: usize,
    record_events: bool,
) -> Vec<ProgressEvent> {
    let mut snapshot = ProgressSnapshot::new(total);
    let mut trail = Vec::new();

    while let Some(event) = rx.recv().await {
        snapshot.observe(&event);
        reporter.report(&event, &snapshot);
        if record_events {
            trail.push(event);
        }
    }

    trail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CollectingReporter, Phase};
    use crate::task::TaskDefinition;

    fn outcome(name: &str, status: TaskStatus, retries: u32) -> TaskOutcome {
        let task = TaskDefinition::from_fn(name, || async { Ok(()) });
        let mut outcome = TaskOutcome::skipped(&task);
        outcome.status = status;
        outcome.retries = retries;
        outcome
    }

    #[test]
    fn test_counters_record() {
        let counters = RunCounters::default();
        counters.record(&outcome("a", TaskStatus::Passed, 1));
        counters.record(&outcome("b", TaskStatus::Failed, 2));
        counters.record(&outcome("c", TaskStatus::Skipped, 0));

        let totals = counters.snapshot();
        assert_eq!(totals.passed, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.skipped, 1);
        assert_eq!(totals.retries, 3);
        assert_eq!(totals.total(), 3);
    }

    #[tokio::test]
    async fn test_collects_from_concurrent_producers() {
        let reporter = Arc::new(CollectingReporter::default());
        let (aggregation, aggregator, events) =
            Aggregation::start(Arc::default(), 20, reporter.clone(), true);

        let mut handles = Vec::new();
        for i in 0..20 {
            let aggregator = aggregator.clone();
            let events = events.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("t{}", i);
                events
                    .send(ProgressEvent::new(&name, Phase::Completed, 0, "ok"))
                    .await
                    .unwrap();
                aggregator.record(outcome(&name, TaskStatus::Passed, 0)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(aggregator);
        drop(events);

        let collected = aggregation.finish().await;
        assert_eq!(collected.outcomes.len(), 20);
        assert_eq!(collected.events.len(), 20);
        assert_eq!(collected.totals.passed, 20);

        let last = reporter.entries().last().unwrap().1;
        assert_eq!(last.finished(), 20);
        assert_eq!(last.percent(), 100.0);
    }

    #[tokio::test]
    async fn test_events_not_kept_unless_requested() {
        let reporter = Arc::new(CollectingReporter::default());
        let (aggregation, aggregator, events) =
            Aggregation::start(Arc::default(), 1, reporter.clone(), false);

        events
            .send(ProgressEvent::new("a", Phase::Running, 0, "start"))
            .await
            .unwrap();
        drop(aggregator);
        drop(events);

        let collected = aggregation.finish().await;
        assert!(collected.events.is_empty());
        assert_eq!(reporter.events().len(), 1);
    }
}
