//! Retry executor: runs one task to a terminal outcome

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use gauntlet_core::RunConfig;

use crate::progress::{Phase, ProgressEvent};
use crate::task::{Check, TaskDefinition};

/// Terminal status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// The single, immutable record of how a task ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub name: String,
    pub category: String,
    pub required: bool,
    pub status: TaskStatus,
    pub duration_ms: u64,
    /// Present iff the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries consumed; never exceeds the effective retry budget
    pub retries: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TaskOutcome {
    fn finished(
        task: &TaskDefinition,
        status: TaskStatus,
        error: Option<String>,
        retries: u32,
        start_time: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: task.name.clone(),
            category: task.category.clone(),
            required: task.required,
            status,
            duration_ms: elapsed.as_millis() as u64,
            error,
            retries,
            start_time,
            end_time: Utc::now(),
        }
    }

    /// Outcome for a task that was never started
    pub fn skipped(task: &TaskDefinition) -> Self {
        let now = Utc::now();
        Self {
            name: task.name.clone(),
            category: task.category.clone(),
            required: task.required,
            status: TaskStatus::Skipped,
            duration_ms: 0,
            error: None,
            retries: 0,
            start_time: now,
            end_time: now,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Linear backoff: retry `n` waits `n × unit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub unit: Duration,
}

impl Backoff {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Delay before the given attempt (attempt 0 never waits)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }
}

/// Runs a task up to `1 + max_retries` times, each attempt under its own
/// timeout, and reports phase transitions on the progress channel.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    default_max_retries: u32,
    default_timeout: Duration,
    backoff: Backoff,
    events: mpsc::Sender<ProgressEvent>,
}

impl RetryExecutor {
    pub fn new(config: &RunConfig, events: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            default_max_retries: config.max_retries,
            default_timeout: config.timeout(),
            backoff: Backoff::new(config.backoff_unit()),
            events,
        }
    }

    /// Execute a task to a terminal outcome. Never panics on behalf of the task.
    pub async fn execute(&self, task: &TaskDefinition) -> TaskOutcome {
        let max_retries = task.effective_max_retries(self.default_max_retries);
        let timeout = task.effective_timeout(self.default_timeout);
        let start_time = Utc::now();
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            if attempt > 0 {
                warn!(
                    task = %task.name,
                    attempt,
                    max_retries,
                    reason = %last_error,
                    "retrying task"
                );
                self.emit(
                    task,
                    Phase::Retrying,
                    attempt,
                    format!("Retrying (attempt {}/{})", attempt + 1, max_retries + 1),
                )
                .await;
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            } else {
                self.emit(task, Phase::Running, 0, "Starting execution".to_string())
                    .await;
            }

            match run_attempt(task.check.clone(), timeout).await {
                Ok(()) => {
                    let outcome = TaskOutcome::finished(
                        task,
                        TaskStatus::Passed,
                        None,
                        attempt,
                        start_time,
                        started.elapsed(),
                    );
                    debug!(task = %task.name, attempt, "task passed");
                    self.emit(task, Phase::Completed, attempt, "Passed".to_string())
                        .await;
                    return outcome;
                }
                Err(reason) => {
                    debug!(task = %task.name, attempt, %reason, "attempt failed");
                    last_error = reason;
                }
            }
        }

        let outcome = TaskOutcome::finished(
            task,
            TaskStatus::Failed,
            Some(last_error.clone()),
            max_retries,
            start_time,
            started.elapsed(),
        );
        self.emit(
            task,
            Phase::Failed,
            max_retries,
            format!("Failed: {}", last_error),
        )
        .await;
        outcome
    }

    async fn emit(&self, task: &TaskDefinition, phase: Phase, retry: u32, message: String) {
        let event = ProgressEvent::new(&task.name, phase, retry, message);
        // The run may have stopped listening; progress is best-effort.
        let _ = self.events.send(event).await;
    }
}

/// Run one attempt on its own task so a panic or a hang can't take the
/// worker down with it.
async fn run_attempt(check: Arc<dyn Check>, timeout: Duration) -> Result<(), String> {
    let mut handle = tokio::spawn(async move { check.run().await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(format!(
            "task panicked: {}",
            panic_message(e.into_panic())
        )),
        Ok(Err(e)) => Err(format!("task aborted: {}", e)),
        Err(_) => {
            handle.abort();
            Err(format!("timed out after {:?}", timeout))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> RunConfig {
        RunConfig::default()
            .with_max_retries(2)
            .with_timeout(Duration::from_secs(5))
            .with_backoff(Duration::from_millis(1))
    }

    fn executor(config: &RunConfig) -> (RetryExecutor, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(100);
        (RetryExecutor::new(config, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<Phase> {
        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push(event.phase);
        }
        phases
    }

    fn flaky(failures: u32) -> TaskDefinition {
        let calls = Arc::new(AtomicU32::new(0));
        TaskDefinition::from_fn("flaky", move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err("not yet".to_string())
                } else {
                    Ok(())
                }
            }
        })
    }

    #[test]
    fn test_backoff_is_linear() {
        let backoff = Backoff::new(Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Passed.to_string(), "passed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
        assert_eq!(TaskStatus::Skipped.to_string(), "skipped");
    }

    #[tokio::test]
    async fn test_pass_first_attempt() {
        let (exec, mut rx) = executor(&config());
        let task = TaskDefinition::from_fn("ok", || async { Ok(()) });

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Passed);
        assert_eq!(outcome.retries, 0);
        assert!(outcome.error.is_none());
        assert_eq!(drain(&mut rx), vec![Phase::Running, Phase::Completed]);
    }

    #[tokio::test]
    async fn test_pass_after_retries_records_attempt_index() {
        let (exec, mut rx) = executor(&config());
        let task = flaky(2).with_max_retries(3);

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Passed);
        assert_eq!(outcome.retries, 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                Phase::Running,
                Phase::Retrying,
                Phase::Retrying,
                Phase::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_exhausts_budget() {
        let (exec, mut rx) = executor(&config());
        let task = TaskDefinition::from_fn("down", || async {
            Err("connection refused".to_string())
        });

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));
        assert_eq!(drain(&mut rx).last(), Some(&Phase::Failed));
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let (exec, _rx) = executor(&config());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let task = TaskDefinition::from_fn("once", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            }
        })
        .with_max_retries(0);

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_per_attempt() {
        let (exec, _rx) = executor(&config());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let task = TaskDefinition::from_fn("slow", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .with_timeout(Duration::from_millis(100))
        .with_max_retries(1);

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.retries, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.error.as_deref(), Some("timed out after 100ms"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (exec, _rx) = executor(&config());
        let task = TaskDefinition::from_fn("boom", || async {
            if true {
                panic!("dashboard exploded");
            }
            Ok(())
        })
        .with_max_retries(1);

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.retries, 1);
        assert_eq!(
            outcome.error.as_deref(),
            Some("task panicked: dashboard exploded")
        );
    }

    #[tokio::test]
    async fn test_panic_then_pass() {
        let (exec, _rx) = executor(&config());
        let calls = Arc::new(AtomicU32::new(0));
        let task = TaskDefinition::from_fn("recovering", move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first attempt");
                }
                Ok(())
            }
        });

        let outcome = exec.execute(&task).await;
        assert_eq!(outcome.status, TaskStatus::Passed);
        assert_eq!(outcome.retries, 1);
    }

    #[tokio::test]
    async fn test_closed_progress_channel_is_ignored() {
        let (exec, rx) = executor(&config());
        drop(rx);
        let task = TaskDefinition::from_fn("ok", || async { Ok(()) });
        assert_eq!(exec.execute(&task).await.status, TaskStatus::Passed);
    }
}
