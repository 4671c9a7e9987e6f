//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::ConfigError;

use super::types::{Config, RunConfig, TaskConfig};

/// Validate a whole suite configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    debug!("validating configuration");
    validate_run_config(&config.run)?;
    validate_tasks(&config.tasks)?;
    debug!("configuration validation passed");
    Ok(())
}

/// Validate run-wide parameters
pub fn validate_run_config(run: &RunConfig) -> Result<(), ConfigError> {
    if run.workers == 0 {
        return Err(ConfigError::invalid(
            "run.workers",
            "must be greater than zero",
        ));
    }

    if run.timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "run.timeout_ms",
            "must be greater than zero",
        ));
    }

    if run.sample_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "run.sample_interval_ms",
            "must be greater than zero",
        ));
    }

    if run.run_timeout_ms == Some(0) {
        return Err(ConfigError::invalid(
            "run.run_timeout_ms",
            "must be greater than zero when set",
        ));
    }

    Ok(())
}

fn validate_tasks(tasks: &[TaskConfig]) -> Result<(), ConfigError> {
    if !tasks.is_empty() {
        debug!(count = tasks.len(), "validating tasks");
    }

    let mut seen = HashSet::new();
    for (i, task) in tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("task[{}].name", i),
                "task name cannot be empty",
            ));
        }

        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::invalid(
                format!("task[{}].name", i),
                format!("duplicate task name '{}'", task.name),
            ));
        }

        if task.command.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("task[{}].command", i),
                "command cannot be empty",
            ));
        }

        if task.timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                format!("task[{}].timeout_ms", i),
                "must be greater than zero when set",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            command: "true".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let run = RunConfig::default().with_workers(0);
        let err = validate_run_config(&run).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "run.workers"
        ));
    }

    #[test]
    fn test_zero_run_timeout_rejected() {
        let run = RunConfig {
            run_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(validate_run_config(&run).is_err());
    }

    #[test]
    fn test_duplicate_task_names_rejected() {
        let config = Config {
            tasks: vec![task("a"), task("b"), task("a")],
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate task name 'a'"));
        assert!(err.to_string().contains("task[2].name"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut bad = task("a");
        bad.command = "  ".to_string();
        let config = Config {
            tasks: vec![bad],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let config = Config {
            tasks: vec![task("")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_task_timeout_rejected() {
        let mut bad = task("a");
        bad.timeout_ms = Some(0);
        let config = Config {
            tasks: vec![bad],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
