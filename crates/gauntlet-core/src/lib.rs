//! Gauntlet Core - configuration and errors for the Gauntlet test orchestrator
//!
//! This crate provides the suite configuration model, its loader and
//! validation, and the shared error taxonomy.

pub mod config;
pub mod error;

pub use config::{Config, ReportConfig, RunConfig, TaskConfig};
pub use error::{ConfigError, GauntletError, Result};
