//! Error types for the orchestration engine
//!
//! Task failures are never errors here: they are recorded as outcomes.
//! These variants are structural problems the caller has to handle.

use std::path::PathBuf;
use thiserror::Error;

use gauntlet_core::ConfigError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The run configuration was rejected before anything started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A report or export could not be written
    #[error("Failed to write {what} to {path}: {source}")]
    ReportWrite {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report could not be serialized
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn write(what: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReportWrite {
            what,
            path: path.into(),
            source,
        }
    }

    /// True for failures to persist a report
    pub fn is_report_error(&self) -> bool {
        matches!(self, Self::ReportWrite { .. } | Self::Serialize(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_display() {
        let err = EngineError::write(
            "JSON report",
            "/nope/report.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to write JSON report to /nope/report.json: denied"
        );
        assert!(err.is_report_error());
    }

    #[test]
    fn test_config_error_is_not_report_error() {
        let err: EngineError = ConfigError::invalid("run.workers", "must be greater than zero").into();
        assert!(!err.is_report_error());
    }
}
