//! Shell-command checks built from suite entries

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use gauntlet_core::TaskConfig;
use gauntlet_tasks::{Check, TaskDefinition};

/// Runs `sh -c <command>`; exit code zero is a pass
#[derive(Debug, Clone)]
pub struct ShellCheck {
    command: String,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ShellCheck {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Check for ShellCheck {
    async fn run(&self) -> Result<(), String> {
        debug!(command = %self.command, "running shell check");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out attempt drops this future; take the child with it.
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("Failed to spawn: {}", e))?;

        if output.status.success() {
            return Ok(());
        }

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Err(format!("Command exited with code {}", code))
        } else {
            Err(format!("Command exited with code {}: {}", code, stderr))
        }
    }
}

/// Turn a suite entry into a task; relative working dirs resolve against `base_dir`
pub fn task_from_config(task: &TaskConfig, base_dir: &Path) -> TaskDefinition {
    let mut check = ShellCheck::new(&task.command).with_env(task.env.clone());
    check = match task.working_dir {
        Some(ref dir) => check.with_working_dir(base_dir.join(dir)),
        None => check.with_working_dir(base_dir),
    };

    let mut def = TaskDefinition::new(&task.name, check)
        .with_category(&task.category)
        .with_priority(task.priority)
        .with_required(task.required);
    if let Some(retries) = task.max_retries {
        def = def.with_max_retries(retries);
    }
    if let Some(timeout) = task.timeout() {
        def = def.with_timeout(timeout);
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_zero_exit_passes() {
        assert!(ShellCheck::new("true").run().await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_carries_code_and_stderr() {
        let err = ShellCheck::new("echo '  not ready  ' >&2; exit 3")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err, "Command exited with code 3: not ready");
    }

    #[tokio::test]
    async fn test_failure_without_stderr() {
        let err = ShellCheck::new("exit 7").run().await.unwrap_err();
        assert_eq!(err, "Command exited with code 7");
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let env = HashMap::from([("GAUNTLET_PROBE".to_string(), "ok".to_string())]);
        let check = ShellCheck::new("test \"$GAUNTLET_PROBE\" = ok").with_env(env);
        assert!(check.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_working_dir_resolves_against_base() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("fixtures")).unwrap();
        std::fs::write(temp.path().join("fixtures/marker"), "").unwrap();

        let config = TaskConfig {
            name: "marker".to_string(),
            command: "test -f marker".to_string(),
            working_dir: Some(PathBuf::from("fixtures")),
            ..Default::default()
        };
        let task = task_from_config(&config, temp.path());
        assert!(task.check.run().await.is_ok());
    }

    #[test]
    fn test_task_from_config_overrides() {
        let config = TaskConfig {
            name: "prometheus-ready".to_string(),
            category: "metrics".to_string(),
            priority: 10,
            required: true,
            max_retries: Some(0),
            timeout_ms: Some(2500),
            command: "true".to_string(),
            ..Default::default()
        };
        let task = task_from_config(&config, Path::new("."));

        assert_eq!(task.name, "prometheus-ready");
        assert_eq!(task.category, "metrics");
        assert_eq!(task.priority, 10);
        assert!(task.required);
        assert_eq!(task.effective_max_retries(2), 0);
        assert_eq!(
            task.effective_timeout(Duration::from_secs(300)),
            Duration::from_millis(2500)
        );
    }
}
