//! Live progress reporting

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use console::style;
use serde::{Deserialize, Serialize};

/// Lifecycle phase carried by a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Running,
    Retrying,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and failed end a task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Running => "[RUNNING]",
            Self::Retrying => "[RETRY]",
            Self::Completed => "[PASSED]",
            Self::Failed => "[FAILED]",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transient status update emitted while a task executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task: String,
    pub phase: Phase,
    pub retry: u32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(task: impl Into<String>, phase: Phase, retry: u32, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            phase,
            retry,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Running tallies seen by the progress stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn finished(&self) -> usize {
        self.passed + self.failed
    }

    /// Finished tasks as a percentage of the total
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.finished() as f64 / self.total as f64 * 100.0
    }

    /// Fold a terminal event into the tallies
    pub fn observe(&mut self, event: &ProgressEvent) {
        match event.phase {
            Phase::Completed => self.passed += 1,
            Phase::Failed => self.failed += 1,
            Phase::Running | Phase::Retrying => {}
        }
    }
}

/// Trait for reporting task progress
pub trait ProgressReporter: Send + Sync {
    /// Handle an event; `progress` already includes it
    fn report(&self, event: &ProgressEvent, progress: &ProgressSnapshot);
}

/// Styled one-line-per-transition output on stdout
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn format_event(event: &ProgressEvent) -> String {
        let label = match event.phase {
            Phase::Running => style(event.phase.label()).blue(),
            Phase::Retrying => style(event.phase.label()).yellow(),
            Phase::Completed => style(event.phase.label()).green(),
            Phase::Failed => style(event.phase.label()).red(),
        };
        format!(
            "[{}] {} {}: {}",
            event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            label,
            event.task,
            event.message
        )
    }

    pub fn format_progress(progress: &ProgressSnapshot) -> String {
        format!(
            "Progress: {}/{} ({:.1}%) - Passed: {}, Failed: {}",
            progress.finished(),
            progress.total,
            progress.percent(),
            progress.passed,
            progress.failed
        )
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent, progress: &ProgressSnapshot) {
        println!("{}", Self::format_event(event));
        if event.phase.is_terminal() {
            println!("{}", Self::format_progress(progress));
            println!();
        }
    }
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &ProgressEvent, progress: &ProgressSnapshot) {
        match event.phase {
            Phase::Running => {
                tracing::info!(task = %event.task, "{}", event.message);
            }
            Phase::Retrying => {
                tracing::warn!(task = %event.task, retry = event.retry, "{}", event.message);
            }
            Phase::Completed => {
                tracing::info!(
                    task = %event.task,
                    finished = progress.finished(),
                    total = progress.total,
                    "{}",
                    event.message
                );
            }
            Phase::Failed => {
                tracing::error!(
                    task = %event.task,
                    finished = progress.finished(),
                    total = progress.total,
                    "{}",
                    event.message
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<(ProgressEvent, ProgressSnapshot)>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.entries().into_iter().map(|(e, _)| e).collect()
    }

    /// Events together with the tallies seen at the time
    pub fn entries(&self) -> Vec<(ProgressEvent, ProgressSnapshot)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, event: &ProgressEvent, progress: &ProgressSnapshot) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((event.clone(), *progress));
    }
}

/// Broadcasts events to a set of reporters
#[derive(Default)]
pub struct ReporterRegistry {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: ProgressReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn ProgressReporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ProgressReporter for ReporterRegistry {
    fn report(&self, event: &ProgressEvent, progress: &ProgressSnapshot) {
        for reporter in &self.reporters {
            reporter.report(event, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_percent() {
        let mut snap = ProgressSnapshot::new(4);
        assert_eq!(snap.percent(), 0.0);

        snap.observe(&ProgressEvent::new("a", Phase::Running, 0, ""));
        snap.observe(&ProgressEvent::new("a", Phase::Completed, 0, ""));
        snap.observe(&ProgressEvent::new("b", Phase::Failed, 2, ""));

        assert_eq!(snap.finished(), 2);
        assert_eq!(snap.percent(), 50.0);
    }

    #[test]
    fn test_snapshot_empty_total() {
        assert_eq!(ProgressSnapshot::new(0).percent(), 0.0);
    }

    #[test]
    fn test_format_event_contains_label_and_task() {
        console::set_colors_enabled(false);
        let event = ProgressEvent::new("loki", Phase::Retrying, 1, "Retrying (attempt 2/3)");
        let line = ConsoleReporter::format_event(&event);
        assert!(line.contains("[RETRY] loki: Retrying (attempt 2/3)"));
    }

    #[test]
    fn test_format_progress() {
        let snap = ProgressSnapshot {
            total: 3,
            passed: 1,
            failed: 1,
        };
        assert_eq!(
            ConsoleReporter::format_progress(&snap),
            "Progress: 2/3 (66.7%) - Passed: 1, Failed: 1"
        );
    }

    #[test]
    fn test_phase_terminal() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Running.is_terminal());
        assert!(!Phase::Retrying.is_terminal());
    }

    #[test]
    fn test_registry_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = ReporterRegistry::new();
        registry.register(TracingReporter);
        registry.register_shared(collecting.clone());
        assert_eq!(registry.len(), 2);

        let snap = ProgressSnapshot::new(1);
        registry.report(&ProgressEvent::new("a", Phase::Running, 0, "start"), &snap);

        assert_eq!(collecting.events().len(), 1);
        assert_eq!(collecting.entries()[0].1, snap);
    }

    #[test]
    fn test_empty_registry() {
        assert!(ReporterRegistry::new().is_empty());
    }
}
