//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{CompletionsCommand, InitCommand, RunCommand, ValidateCommand};

/// Gauntlet - Parallel end-to-end verification runner
#[derive(Debug, Parser)]
#[command(name = "gauntlet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the verification suite
    Run(RunCommand),

    /// Validate the suite configuration
    Validate(ValidateCommand),

    /// Write a starter suite configuration
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command and return the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "gauntlet",
            "run",
            "--workers",
            "8",
            "--retries",
            "0",
            "--timeout-ms",
            "1500",
            "--junit",
            "out/junit.xml",
            "--dry-run",
        ])
        .unwrap();

        let Commands::Run(cmd) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(cmd.workers, Some(8));
        assert_eq!(cmd.retries, Some(0));
        assert_eq!(cmd.timeout_ms, Some(1500));
        assert_eq!(cmd.junit.as_deref(), Some(std::path::Path::new("out/junit.xml")));
        assert!(cmd.dry_run);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gauntlet", "validate", "--format", "json", "-q"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Validate(_)));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["gauntlet", "run", "--format", "xml"]).is_err());
    }
}
