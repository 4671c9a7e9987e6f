//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use gauntlet_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML,
};
use gauntlet_core::Config;

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Write a starter suite configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Write YAML instead of TOML
    #[arg(long)]
    pub yaml: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(force = self.force, yaml = self.yaml, "executing init command");
        let cwd = std::env::current_dir()?;
        let default_name = if self.yaml {
            DEFAULT_CONFIG_YAML
        } else {
            DEFAULT_CONFIG_TOML
        };
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(default_name));

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        write_template(&config_path, self.yaml)?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                output::path_style().apply_to(config_path.display())
            ));
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to describe your checks", config_path.display());
            println!("  2. Run {} to verify your setup", style("gauntlet validate").cyan());
            println!("  3. Run {} to execute the suite", style("gauntlet run").cyan());
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn write_template(path: &Path, yaml: bool) -> anyhow::Result<()> {
    let content = if yaml {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
        serde_yaml::to_string(&config)?
    } else {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::config::load_config;
    use tempfile::TempDir;

    #[test]
    fn test_toml_template_loads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_TOML);
        write_template(&path, false).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.tasks.len(), 3);
    }

    #[test]
    fn test_yaml_template_matches_toml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join(DEFAULT_CONFIG_TOML);
        let yaml_path = temp.path().join(DEFAULT_CONFIG_YAML);
        write_template(&toml_path, false).unwrap();
        write_template(&yaml_path, true).unwrap();

        let from_toml = load_config(&toml_path).unwrap();
        let from_yaml = load_config(&yaml_path).unwrap();
        assert_eq!(from_toml.tasks, from_yaml.tasks);
        assert_eq!(from_toml.run, from_yaml.run);
    }
}
