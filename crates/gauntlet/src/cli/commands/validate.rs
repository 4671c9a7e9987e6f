//! Validate command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use gauntlet_core::config::{load_config, load_config_from_dir};
use gauntlet_core::Config;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Validate the suite configuration
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Suite file (default: discovered from the working directory upwards)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(strict = self.strict, "executing validate command");
        let cwd = std::env::current_dir()?;

        let mut errors: Vec<String> = Vec::new();

        // Loading also runs validation
        let loaded = match self.config {
            Some(ref path) => load_config(path).map(|c| (c, path.clone())),
            None => load_config_from_dir(&cwd),
        };
        let (config, config_path) = match loaded {
            Ok((c, p)) => (Some(c), Some(p)),
            Err(e) => {
                errors.push(format!("Configuration: {}", e));
                (None, None)
            }
        };

        let mut warnings = config.as_ref().map(suite_warnings).unwrap_or_default();

        // If strict, promote warnings to errors
        if self.strict {
            errors.append(&mut warnings);
        }

        let passed = errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "tasks": config.as_ref().map(|c| c.tasks.len()),
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", output::header("Validation Results"));
                    println!();

                    if let Some(path) = config_path {
                        let path = output::path_style().apply_to(path.display()).to_string();
                        println!("{}", output::key_value("Config", &path));
                    }
                    if let Some(ref c) = config {
                        println!("{}", output::key_value("Tasks", &c.tasks.len().to_string()));
                        println!("{}", output::key_value("Workers", &c.run.workers.to_string()));
                        println!();
                    }

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        Ok(if passed {
            exit_codes::SUCCESS
        } else {
            exit_codes::CONFIG_ERROR
        })
    }
}

/// Legal but suspicious suite settings
fn suite_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.tasks.is_empty() {
        warnings.push("Suite defines no tasks".to_string());
    }
    if config.tasks.len() > 1 && config.run.workers == 1 {
        warnings.push("Running with a single worker; tasks will execute serially".to_string());
    }
    for task in &config.tasks {
        let budget = task.timeout_ms.unwrap_or(config.run.timeout_ms);
        if let Some(run_timeout) = config.run.run_timeout_ms {
            if budget > run_timeout {
                warnings.push(format!(
                    "Task '{}' timeout ({}ms) exceeds the run timeout ({}ms)",
                    task.name, budget, run_timeout
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::TaskConfig;

    fn task(name: &str) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            command: "true".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_suite_warns() {
        let warnings = suite_warnings(&Config::default());
        assert_eq!(warnings, vec!["Suite defines no tasks".to_string()]);
    }

    #[test]
    fn test_task_timeout_beyond_run_timeout_warns() {
        let mut config = Config::default();
        config.run.run_timeout_ms = Some(1_000);
        config.tasks = vec![task("slow")];

        let warnings = suite_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'slow'"));
    }

    #[test]
    fn test_clean_suite_has_no_warnings() {
        let mut config = Config::default();
        config.tasks = vec![task("a"), task("b")];
        assert!(suite_warnings(&config).is_empty());
    }
}
