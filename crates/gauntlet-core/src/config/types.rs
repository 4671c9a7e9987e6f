//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a Gauntlet suite
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suite name, shown in report headers
    pub name: Option<String>,

    /// Run parameters
    pub run: RunConfig,

    /// Report destinations
    pub report: ReportConfig,

    /// Verification tasks
    #[serde(rename = "task", alias = "tasks")]
    pub tasks: Vec<TaskConfig>,
}

/// Run-wide parameters, fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent workers
    pub workers: usize,

    /// Default retry budget for tasks that don't set their own
    pub max_retries: u32,

    /// Default per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Linear backoff unit in milliseconds; attempt `n` waits `n` units
    pub backoff_ms: u64,

    /// Optional wall-clock limit for the whole run
    pub run_timeout_ms: Option<u64>,

    /// Resource sampling cadence in milliseconds
    pub sample_interval_ms: u64,

    /// Record never-started tasks as skipped after an abort
    pub skip_unstarted: bool,

    /// Keep every progress event in the final report
    pub record_events: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 2,
            timeout_ms: 300_000,
            backoff_ms: 1_000,
            run_timeout_ms: None,
            sample_interval_ms: 1_000,
            skip_unstarted: false,
            record_events: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the default retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the default per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the backoff unit
    pub fn with_backoff(mut self, unit: Duration) -> Self {
        self.backoff_ms = unit.as_millis() as u64;
        self
    }

    /// Set a wall-clock limit for the run
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Record never-started tasks as skipped
    pub fn with_skip_unstarted(mut self, skip: bool) -> Self {
        self.skip_unstarted = skip;
        self
    }

    /// Keep the progress audit trail in the report
    pub fn with_record_events(mut self, record: bool) -> Self {
        self.record_events = record;
        self
    }
}

/// Where reports are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Machine-readable report
    pub json: PathBuf,

    /// Styled human-readable report
    pub html: PathBuf,

    /// Optional JUnit XML report
    pub junit: Option<PathBuf>,

    /// Optional CSV export of the raw resource samples
    pub metrics_csv: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            json: PathBuf::from("test-results/gauntlet-report.json"),
            html: PathBuf::from("test-results/gauntlet-report.html"),
            junit: None,
            metrics_csv: None,
        }
    }
}

/// A single verification task backed by a shell command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Unique task name
    pub name: String,

    /// Free-form grouping label
    pub category: String,

    /// Higher runs earlier
    pub priority: i32,

    /// A failure aborts the run
    pub required: bool,

    /// Overrides `run.max_retries`
    pub max_retries: Option<u32>,

    /// Overrides `run.timeout_ms`
    pub timeout_ms: Option<u64>,

    /// Shell command; exit code zero means pass
    pub command: String,

    /// Extra environment variables
    pub env: HashMap<String, String>,

    /// Working directory for the command
    pub working_dir: Option<PathBuf>,
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let run = RunConfig::default();
        assert_eq!(run.workers, 4);
        assert_eq!(run.max_retries, 2);
        assert_eq!(run.timeout(), Duration::from_secs(300));
        assert_eq!(run.backoff_unit(), Duration::from_secs(1));
        assert_eq!(run.sample_interval(), Duration::from_secs(1));
        assert!(run.run_timeout().is_none());
        assert!(!run.skip_unstarted);
    }

    #[test]
    fn test_run_config_builder() {
        let run = RunConfig::default()
            .with_workers(8)
            .with_max_retries(0)
            .with_timeout(Duration::from_millis(250))
            .with_run_timeout(Duration::from_secs(60));

        assert_eq!(run.workers, 8);
        assert_eq!(run.max_retries, 0);
        assert_eq!(run.timeout_ms, 250);
        assert_eq!(run.run_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_toml_tasks() {
        let config: Config = toml::from_str(
            r#"
            name = "monitoring"

            [run]
            workers = 2

            [[task]]
            name = "prometheus-ready"
            category = "metrics"
            priority = 10
            required = true
            command = "curl -sf http://localhost:9090/-/ready"

            [[task]]
            name = "loki-ready"
            max_retries = 5
            timeout_ms = 2000
            command = "true"
            "#,
        )
        .unwrap();

        assert_eq!(config.run.workers, 2);
        assert_eq!(config.run.max_retries, 2);
        assert_eq!(config.tasks.len(), 2);
        assert!(config.tasks[0].required);
        assert_eq!(config.tasks[1].max_retries, Some(5));
        assert_eq!(config.tasks[1].timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_yaml_tasks_alias() {
        let config: Config = serde_yaml::from_str(
            "tasks:\n  - name: grafana\n    command: \"true\"\n",
        )
        .unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].name, "grafana");
        assert_eq!(config.tasks[0].priority, 0);
    }
}
