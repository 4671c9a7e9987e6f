//! Run report and its renderings
//!
//! Every rendering is derived from the same [`RunReport`] value, so totals
//! and success rate always agree between formats.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::RunTotals;
use crate::error::{EngineError, Result};
use crate::executor::{TaskOutcome, TaskStatus};
use crate::monitor::ResourceUtilization;
use crate::progress::ProgressEvent;

/// The single persisted artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    /// Number of recorded outcomes; always passed + failed + skipped
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Number of tasks handed to the run
    pub submitted: usize,
    pub retry_count: usize,
    /// `passed / total * 100`, rounded to one decimal
    pub success_rate: f64,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Outcomes ordered by start time
    pub results: Vec<TaskOutcome>,
    pub environment: BTreeMap<String, String>,
    pub resources: ResourceUtilization,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ProgressEvent>,
}

/// Raw material for a report, gathered by the run controller
pub(crate) struct ReportParts {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed: Duration,
    pub submitted: usize,
    pub totals: RunTotals,
    pub outcomes: Vec<TaskOutcome>,
    pub environment: BTreeMap<String, String>,
    pub resources: ResourceUtilization,
    pub events: Vec<ProgressEvent>,
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub(crate) fn assemble(parts: ReportParts) -> Self {
        let mut results = parts.outcomes;
        // Collection order is completion order; sort here for a stable report.
        results.sort_by_key(|o| o.start_time);

        let totals = parts.totals;
        Self {
            start_time: parts.start_time,
            end_time: parts.end_time,
            duration_ms: parts.elapsed.as_millis() as u64,
            total: totals.total(),
            passed: totals.passed,
            failed: totals.failed,
            skipped: totals.skipped,
            submitted: parts.submitted,
            retry_count: totals.retries,
            success_rate: success_rate(totals.passed, totals.total()),
            aborted: parts.abort_reason.is_some(),
            abort_reason: parts.abort_reason,
            results,
            environment: parts.environment,
            resources: parts.resources,
            events: parts.events,
        }
    }

    /// No failures and no abort
    pub fn success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.results
            .iter()
            .filter(|r| r.status == TaskStatus::Failed)
    }

    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Suite name recorded in the environment, if the run had one
    pub fn suite(&self) -> Option<&str> {
        self.environment.get("suite").map(String::as_str)
    }
}

fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Available report renderings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Html,
    Pretty,
    Junit,
}

impl ReportFormat {
    fn describe(&self) -> &'static str {
        match self {
            Self::Json => "JSON report",
            Self::Html => "HTML report",
            Self::Pretty => "text report",
            Self::Junit => "JUnit report",
        }
    }
}

/// Report generator for various formats
pub struct ReportGenerator;

impl ReportGenerator {
    /// Generate report in the specified format
    pub fn generate(report: &RunReport, format: ReportFormat) -> Result<String> {
        Ok(match format {
            ReportFormat::Json => Self::generate_json(report)?,
            ReportFormat::Html => Self::generate_html(report),
            ReportFormat::Pretty => Self::generate_pretty(report),
            ReportFormat::Junit => Self::generate_junit(report),
        })
    }

    /// Generate JSON output
    pub fn generate_json(report: &RunReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Generate human-readable console output
    pub fn generate_pretty(report: &RunReport) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                    TEST EXECUTION SUMMARY\n");
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        if let Some(suite) = report.suite() {
            output.push_str(&format!("  Suite:      {}\n", suite));
        }
        output.push_str(&format!("  Start Time: {}\n", local_time(&report.start_time)));
        output.push_str(&format!("  End Time:   {}\n", local_time(&report.end_time)));
        output.push_str(&format!("  Duration:   {:?}\n", report.duration()));
        output.push_str("  ─────────────────────────────────────────────────────────────\n");
        output.push_str(&format!("  Total:   {}\n", report.total));
        output.push_str(&format!(
            "  Passed:  {} ({:.1}%)\n",
            report.passed, report.success_rate
        ));
        output.push_str(&format!("  Failed:  {}\n", report.failed));
        output.push_str(&format!("  Skipped: {}\n", report.skipped));
        output.push_str(&format!("  Retries: {}\n", report.retry_count));
        if report.submitted != report.total {
            output.push_str(&format!(
                "  Not run: {} of {} submitted\n",
                report.submitted - report.total,
                report.submitted
            ));
        }
        if let Some(ref reason) = report.abort_reason {
            output.push_str(&format!("  Aborted: {}\n", reason));
        }

        if report.failed > 0 {
            output.push_str("\n  Failed tests:\n");
            for result in report.failures() {
                output.push_str(&format!(
                    "    ✗ {}: {}\n",
                    result.name,
                    result.error.as_deref().unwrap_or("")
                ));
            }
        }

        let r = &report.resources;
        output.push_str("\n  Resource usage:\n");
        output.push_str(&format!(
            "    CPU:    {:.2}% avg, {:.2}% max\n",
            r.avg_cpu, r.max_cpu
        ));
        output.push_str(&format!(
            "    Memory: {:.2} MB avg, {:.2} MB max\n",
            r.avg_memory, r.max_memory
        ));
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        if report.success() {
            output.push_str("\n  ✓ All tests passed!\n\n");
        } else {
            output.push_str("\n  ✗ Some tests failed.\n\n");
        }

        output
    }

    /// Generate a standalone HTML page
    pub fn generate_html(report: &RunReport) -> String {
        let mut rows = String::new();
        for result in &report.results {
            let class = match result.status {
                TaskStatus::Passed => "success",
                TaskStatus::Failed => "error",
                TaskStatus::Skipped => "skip",
            };
            rows.push_str(&format!(
                "        <tr class=\"{}\">\n            <td>{}</td>\n            <td>{}</td>\n            <td>{}</td>\n            <td>{:?}</td>\n            <td>{}</td>\n            <td>{}</td>\n        </tr>\n",
                class,
                escape(&result.name),
                escape(&result.category),
                result.status,
                result.duration(),
                result.retries,
                escape(result.error.as_deref().unwrap_or("")),
            ));
        }

        let abort = match report.abort_reason {
            Some(ref reason) => format!(
                "    <p class=\"failed\">Run aborted: {}</p>\n",
                escape(reason)
            ),
            None => String::new(),
        };
        let heading = match report.suite() {
            Some(suite) => format!("{} - E2E Test Report", escape(suite)),
            None => "E2E Test Report".to_string(),
        };
        let r = &report.resources;

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{heading}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background-color: #f0f0f0; padding: 20px; border-radius: 5px; }}
        .summary {{ margin: 20px 0; }}
        .summary-item {{ display: inline-block; margin: 10px 20px 10px 0; }}
        .passed {{ color: green; }}
        .failed {{ color: red; }}
        .skipped {{ color: orange; }}
        table {{ border-collapse: collapse; width: 100%; margin-top: 20px; }}
        th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
        th {{ background-color: #f2f2f2; }}
        .error {{ background-color: #ffeeee; }}
        .success {{ background-color: #eeffee; }}
        .skip {{ background-color: #fff6e5; }}
        .progress-bar {{ width: 100%; height: 20px; background-color: #f0f0f0; border-radius: 10px; margin: 10px 0; }}
        .progress-fill {{ height: 100%; border-radius: 10px; background-color: #4CAF50; }}
    </style>
</head>
<body>
    <div class="header">
        <h1>{heading}</h1>
        <p>Started: {start}</p>
        <p>Finished: {end}</p>
        <p>Duration: {duration:?}</p>
    </div>

    <div class="summary">
        <h2>Summary</h2>
        <div class="summary-item">Total Tests: <strong id="total">{total}</strong></div>
        <div class="summary-item passed">Passed: <strong id="passed">{passed}</strong></div>
        <div class="summary-item failed">Failed: <strong id="failed">{failed}</strong></div>
        <div class="summary-item skipped">Skipped: <strong id="skipped">{skipped}</strong></div>
        <div class="summary-item">Retries: <strong>{retries}</strong></div>
    </div>
{abort}
    <div class="progress-bar">
        <div class="progress-fill" style="width: {rate:.1}%"></div>
    </div>
    <p>Success Rate: <span id="success-rate">{rate:.1}%</span></p>

    <h2>Test Results</h2>
    <table>
        <tr>
            <th>Test Name</th>
            <th>Category</th>
            <th>Status</th>
            <th>Duration</th>
            <th>Retries</th>
            <th>Error</th>
        </tr>
{rows}    </table>

    <h2>Resource Utilization</h2>
    <table>
        <tr>
            <th>Metric</th>
            <th>Minimum</th>
            <th>Average</th>
            <th>Maximum</th>
        </tr>
        <tr>
            <td>CPU Usage</td>
            <td>{min_cpu:.2}%</td>
            <td>{avg_cpu:.2}%</td>
            <td>{max_cpu:.2}%</td>
        </tr>
        <tr>
            <td>Memory Usage</td>
            <td>{min_mem:.2} MB</td>
            <td>{avg_mem:.2} MB</td>
            <td>{max_mem:.2} MB</td>
        </tr>
    </table>
</body>
</html>
"#,
            heading = heading,
            start = local_time(&report.start_time),
            end = local_time(&report.end_time),
            duration = report.duration(),
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            retries = report.retry_count,
            abort = abort,
            rate = report.success_rate,
            rows = rows,
            min_cpu = r.min_cpu,
            avg_cpu = r.avg_cpu,
            max_cpu = r.max_cpu,
            min_mem = r.min_memory,
            avg_mem = r.avg_memory,
            max_mem = r.max_memory,
        )
    }

    /// Generate JUnit XML, one test suite per category
    pub fn generate_junit(report: &RunReport) -> String {
        let mut suites: BTreeMap<&str, Vec<&TaskOutcome>> = BTreeMap::new();
        for result in &report.results {
            let category = if result.category.is_empty() {
                "default"
            } else {
                result.category.as_str()
            };
            suites.entry(category).or_default().push(result);
        }

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites name=\"gauntlet\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
            report.total,
            report.failed,
            report.skipped,
            report.duration().as_secs_f64()
        ));

        for (category, results) in suites {
            let failures = results
                .iter()
                .filter(|r| r.status == TaskStatus::Failed)
                .count();
            let skipped = results
                .iter()
                .filter(|r| r.status == TaskStatus::Skipped)
                .count();
            let time: f64 = results.iter().map(|r| r.duration().as_secs_f64()).sum();

            xml.push_str(&format!(
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
                escape(category),
                results.len(),
                failures,
                skipped,
                time
            ));

            for result in results {
                let open = format!(
                    "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\"",
                    escape(&result.name),
                    escape(category),
                    result.duration().as_secs_f64()
                );
                match result.status {
                    TaskStatus::Passed => {
                        xml.push_str(&open);
                        xml.push_str("/>\n");
                    }
                    TaskStatus::Failed => {
                        let message = escape(result.error.as_deref().unwrap_or("failed"));
                        xml.push_str(&open);
                        xml.push_str(">\n");
                        xml.push_str(&format!(
                            "      <failure message=\"{}\" type=\"failure\">{}</failure>\n",
                            message, message
                        ));
                        xml.push_str("    </testcase>\n");
                    }
                    TaskStatus::Skipped => {
                        xml.push_str(&open);
                        xml.push_str(">\n      <skipped/>\n    </testcase>\n");
                    }
                }
            }

            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");
        xml
    }

    /// Write report to file, creating parent directories as needed
    pub fn write_to_file(report: &RunReport, format: ReportFormat, path: &Path) -> Result<()> {
        let content = Self::generate(report, format)?;
        let what = format.describe();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::write(what, path, e))?;
        }

        let mut file = std::fs::File::create(path).map_err(|e| EngineError::write(what, path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| EngineError::write(what, path, e))?;

        Ok(())
    }
}

fn local_time(t: &DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Escape text for HTML and XML bodies and attributes
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
