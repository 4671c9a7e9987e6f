//! Process resource sampling

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{EngineError, Result};

/// One CPU/memory reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceReading {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// A timestamped reading, never mutated after it is taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Min/avg/max over a sample series; all zero when there are no samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    #[serde(rename = "min_cpu_percent")]
    pub min_cpu: f64,
    #[serde(rename = "avg_cpu_percent")]
    pub avg_cpu: f64,
    #[serde(rename = "max_cpu_percent")]
    pub max_cpu: f64,
    #[serde(rename = "min_memory_mb")]
    pub min_memory: f64,
    #[serde(rename = "avg_memory_mb")]
    pub avg_memory: f64,
    #[serde(rename = "max_memory_mb")]
    pub max_memory: f64,
    pub samples: usize,
}

impl ResourceUtilization {
    pub fn summarize(samples: &[ResourceSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let count = samples.len() as f64;
        let mut summary = Self {
            min_cpu: f64::INFINITY,
            min_memory: f64::INFINITY,
            max_cpu: f64::NEG_INFINITY,
            max_memory: f64::NEG_INFINITY,
            samples: samples.len(),
            ..Default::default()
        };
        let mut total_cpu = 0.0;
        let mut total_memory = 0.0;

        for s in samples {
            total_cpu += s.cpu_percent;
            total_memory += s.memory_mb;
            summary.min_cpu = summary.min_cpu.min(s.cpu_percent);
            summary.max_cpu = summary.max_cpu.max(s.cpu_percent);
            summary.min_memory = summary.min_memory.min(s.memory_mb);
            summary.max_memory = summary.max_memory.max(s.memory_mb);
        }

        // Clamp so float rounding can't push the mean outside [min, max].
        summary.avg_cpu = (total_cpu / count).clamp(summary.min_cpu, summary.max_cpu);
        summary.avg_memory = (total_memory / count).clamp(summary.min_memory, summary.max_memory);
        summary
    }
}

/// Source of resource readings
pub trait Sampler: Send + 'static {
    /// Take a reading, or `None` if the process can't be observed
    fn sample(&mut self) -> Option<ResourceReading>;
}

/// Samples CPU% and resident memory of the current process via `sysinfo`
pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    /// Sampler for this process, primed so the first reading has a CPU baseline
    pub fn current() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "cannot determine current pid, resource sampling disabled");
                None
            }
        };
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self { system, pid }
    }
}

impl Sampler for ProcessSampler {
    fn sample(&mut self) -> Option<ResourceReading> {
        let pid = self.pid?;
        // CPU usage is only computed on a full refresh.
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let process = self.system.process(pid)?;
        Some(ResourceReading {
            cpu_percent: process.cpu_usage() as f64,
            memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
        })
    }
}

struct Sampling {
    stop: CancellationToken,
    handle: JoinHandle<Vec<ResourceSample>>,
}

/// Periodically samples resource usage on its own task.
///
/// The sampling task owns the series while running; it is handed back on
/// [`ResourceMonitor::stop`], so reads never contend with sampling.
pub struct ResourceMonitor {
    interval: Duration,
    running: Option<Sampling>,
    samples: Vec<ResourceSample>,
}

impl ResourceMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: None,
            samples: Vec::new(),
        }
    }

    /// Start sampling. A second call while running is ignored.
    pub fn start(&mut self, sampler: impl Sampler) {
        if self.running.is_some() {
            warn!("resource monitor already running");
            return;
        }

        debug!(interval_ms = self.interval.as_millis() as u64, "starting resource monitor");
        let stop = CancellationToken::new();
        let handle = tokio::spawn(sample_loop(sampler, self.interval, stop.clone()));
        self.running = Some(Sampling { stop, handle });
    }

    /// Stop sampling and return every sample taken so far
    pub async fn stop(&mut self) -> &[ResourceSample] {
        if let Some(sampling) = self.running.take() {
            sampling.stop.cancel();
            match sampling.handle.await {
                Ok(samples) => self.samples.extend(samples),
                Err(e) => error!(error = %e, "resource sampling task failed"),
            }
            debug!(samples = self.samples.len(), "resource monitor stopped");
        }
        &self.samples
    }

    pub fn summary(&self) -> ResourceUtilization {
        ResourceUtilization::summarize(&self.samples)
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(sampling) = &self.running {
            sampling.stop.cancel();
        }
    }
}

async fn sample_loop(
    mut sampler: impl Sampler,
    interval: Duration,
    stop: CancellationToken,
) -> Vec<ResourceSample> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut samples = Vec::new();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(reading) = sampler.sample() {
                    samples.push(ResourceSample {
                        timestamp: Utc::now(),
                        cpu_percent: reading.cpu_percent,
                        memory_mb: reading.memory_mb,
                    });
                }
            }
        }
    }

    samples
}

/// Write a sample series as `Timestamp,CPU_Usage,Memory_MB` rows
pub fn export_csv(samples: &[ResourceSample], path: &Path) -> Result<()> {
    const WHAT: &str = "metrics CSV";

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::write(WHAT, path, e))?;
    }

    let mut out = String::from("Timestamp,CPU_Usage,Memory_MB\n");
    for s in samples {
        out.push_str(&format!(
            "{},{:.2},{:.2}\n",
            s.timestamp.format("%Y-%m-%d %H:%M:%S"),
            s.cpu_percent,
            s.memory_mb
        ));
    }

    let mut file = std::fs::File::create(path).map_err(|e| EngineError::write(WHAT, path, e))?;
    file.write_all(out.as_bytes())
        .map_err(|e| EngineError::write(WHAT, path, e))?;
    Ok(())
}
