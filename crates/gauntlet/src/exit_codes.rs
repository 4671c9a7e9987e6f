//! Exit codes for the CLI

use gauntlet_core::{ConfigError, GauntletError};
use gauntlet_tasks::EngineError;

/// Success
pub const SUCCESS: i32 = 0;

/// One or more tasks failed, or the run was aborted
pub const TESTS_FAILED: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Tasks passed but a report could not be written
pub const REPORT_ERROR: i32 = 3;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Pick the exit code for a finished run
pub fn for_run(success: bool, persisted: bool, interrupted: bool) -> i32 {
    if interrupted {
        CANCELLED
    } else if !success {
        TESTS_FAILED
    } else if !persisted {
        REPORT_ERROR
    } else {
        SUCCESS
    }
}

/// Exit code for an error that escaped a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    let is_config = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || matches!(
                cause.downcast_ref::<GauntletError>(),
                Some(GauntletError::Config(_))
            )
            || matches!(
                cause.downcast_ref::<EngineError>(),
                Some(EngineError::Config(_))
            )
    });
    if is_config {
        CONFIG_ERROR
    } else {
        TESTS_FAILED
    }
}
