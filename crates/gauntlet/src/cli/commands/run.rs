//! Run command: execute the suite and persist its reports

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::{info, warn};

use gauntlet_core::config::{load_config, load_config_from_dir, validation::validate_config};
use gauntlet_core::Config;
use gauntlet_tasks::{
    prioritize, ConsoleReporter, Orchestrator, ReportGenerator, ReporterRegistry, RunReport,
    TaskDefinition, TaskStatus, TracingReporter,
};

use crate::checks::task_from_config;
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Run the verification suite
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Suite file (default: discovered from the working directory upwards)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum concurrent tasks
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Retries per task after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Where to write the JSON report
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Where to write the HTML report
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// Also write a JUnit XML report
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Also export raw resource samples as CSV
    #[arg(long)]
    pub metrics_csv: Option<PathBuf>,

    /// Show execution order without running
    #[arg(long)]
    pub dry_run: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(dry_run = self.dry_run, "executing run command");
        let cwd = std::env::current_dir()?;

        let (mut config, config_path) = match self.config {
            Some(ref path) => (load_config(path)?, path.clone()),
            None => load_config_from_dir(&cwd)?,
        };
        self.apply_overrides(&mut config);
        validate_config(&config)?;

        let base_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        let tasks: Vec<TaskDefinition> = config
            .tasks
            .iter()
            .map(|t| task_from_config(t, &base_dir))
            .collect();

        if self.dry_run {
            print_plan(cli, &tasks)?;
            return Ok(exit_codes::SUCCESS);
        }

        if tasks.is_empty() && !cli.quiet {
            output::warning("No tasks defined in the suite");
        }

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(run_suite(cli, &config, tasks))
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(retries) = self.retries {
            config.run.max_retries = retries;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.run.timeout_ms = timeout_ms;
        }
        if let Some(ref path) = self.json {
            config.report.json = path.clone();
        }
        if let Some(ref path) = self.html {
            config.report.html = path.clone();
        }
        if self.junit.is_some() {
            config.report.junit = self.junit.clone();
        }
        if self.metrics_csv.is_some() {
            config.report.metrics_csv = self.metrics_csv.clone();
        }
    }
}

async fn run_suite(cli: &Cli, config: &Config, tasks: Vec<TaskDefinition>) -> anyhow::Result<i32> {
    let mut reporters = ReporterRegistry::new();
    reporters.register(TracingReporter);
    if !cli.quiet && cli.format == OutputFormat::Text {
        reporters.register(ConsoleReporter);
    }

    let mut orchestrator =
        Orchestrator::new(config.run.clone())?.with_reporter(Arc::new(reporters));
    if let Some(ref name) = config.name {
        orchestrator = orchestrator.with_suite_name(name);
    }

    // Ctrl-C → cooperative stop; in-flight tasks finish, nothing new starts.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let token = orchestrator.cancellation_token();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            interrupted.store(true, Ordering::SeqCst);
            token.cancel();
        });
    }

    if !cli.quiet && cli.format == OutputFormat::Text {
        output::info(&format!(
            "Running {} task{} with {} worker{}",
            tasks.len(),
            if tasks.len() == 1 { "" } else { "s" },
            config.run.workers,
            if config.run.workers == 1 { "" } else { "s" },
        ));
        println!();
    }

    let summary = orchestrator.run_and_persist(tasks, &config.report).await?;
    let report = &summary.report;
    let interrupted = interrupted.load(Ordering::SeqCst);

    match cli.format {
        OutputFormat::Json => {
            println!("{}", ReportGenerator::generate_json(report)?);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                print!("{}", ReportGenerator::generate_pretty(report));
                if cli.verbose {
                    println!("{}", output::header("Tasks"));
                    for line in task_lines(report) {
                        println!("{}", line);
                    }
                    println!();
                }
                if summary.persisted.is_ok() {
                    let targets = &config.report;
                    let mut written = vec![&targets.json, &targets.html];
                    written.extend(targets.junit.iter());
                    written.extend(targets.metrics_csv.iter());
                    for path in written {
                        output::success(&format!(
                            "Saved {}",
                            output::path_style().apply_to(path.display())
                        ));
                    }
                }
            }
        }
    }

    if let Err(ref e) = summary.persisted {
        output::error(&format!("Failed to save report: {}", e));
    }
    if interrupted {
        output::warning("Interrupted; in-flight tasks were allowed to finish");
    }

    Ok(exit_codes::for_run(
        report.success(),
        summary.persisted.is_ok(),
        interrupted,
    ))
}

fn print_plan(cli: &Cli, tasks: &[TaskDefinition]) -> anyhow::Result<()> {
    let ordered = prioritize(tasks);

    if cli.format == OutputFormat::Json {
        let plan: Vec<serde_json::Value> = ordered
            .iter()
            .enumerate()
            .map(|(i, t)| {
                serde_json::json!({
                    "position": i + 1,
                    "name": t.name,
                    "category": t.category,
                    "priority": t.priority,
                    "required": t.required,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if !cli.quiet {
        println!("{}", output::header("Execution order"));
        for line in plan_lines(&ordered) {
            println!("{}", line);
        }
        println!();
        println!("{}", style("[DRY RUN - no tasks will be executed]").yellow().bold());
    }

    Ok(())
}

fn plan_lines(ordered: &[TaskDefinition]) -> Vec<String> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let mut line = format!("  {:>3}. {} (priority {})", i + 1, t.name, t.priority);
            if !t.category.is_empty() {
                line.push_str(&format!(" [{}]", t.category));
            }
            if t.required {
                line.push_str(" required");
            }
            line
        })
        .collect()
}

/// One line per recorded task, in start order
fn task_lines(report: &RunReport) -> Vec<String> {
    report
        .results
        .iter()
        .map(|r| {
            let mark = match r.status {
                TaskStatus::Passed => style("✓").green(),
                TaskStatus::Failed => style("✗").red(),
                TaskStatus::Skipped => style("-").yellow(),
            };
            let mut line = format!("  {} {} ({}ms", mark, r.name, r.duration_ms);
            if r.retries > 0 {
                line.push_str(&format!(", {} retries", r.retries));
            }
            line.push(')');
            line
        })
        .collect()
}
