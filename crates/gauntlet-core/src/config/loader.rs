//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        "YAML"
    } else {
        "TOML"
    };
    info!(path = %path.display(), format, "loading config");

    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()).into());
    }

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), tasks = config.tasks.len(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GauntletError;
    use tempfile::TempDir;

    const MINIMAL: &str = "[[task]]\nname = \"a\"\ncommand = \"true\"\n";

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("gauntlet.toml");
        std::fs::write(&config_path, MINIMAL).unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("gauntlet.toml");
        let yaml_path = temp.path().join("gauntlet.yaml");
        std::fs::write(&toml_path, MINIMAL).unwrap();
        std::fs::write(&yaml_path, "task: []").unwrap();

        assert_eq!(find_config(temp.path()).unwrap(), toml_path);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("suites").join("smoke");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = temp.path().join(".gauntlet.yaml");
        std::fs::write(&config_path, "task: []").unwrap();

        assert_eq!(find_config(&nested).unwrap(), config_path);
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gauntlet.yaml");
        std::fs::write(
            &path,
            "run:\n  workers: 3\ntask:\n  - name: a\n    command: \"true\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.run.workers, 3);
        assert_eq!(config.tasks[0].name, "a");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, GauntletError::Config(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gauntlet.toml");
        std::fs::write(&path, "[run]\nworkers = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(
            err,
            GauntletError::Config(ConfigError::InvalidValue { .. })
        ));
    }
}
