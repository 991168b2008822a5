//! CLI module for the testlab harness
//!
//! This module provides the command-line interface for the harness.
//!
//! ## Commands
//!
//! - `compile -m <manifest>` - Build every role in the manifest
//! - `stress -m <manifest>` - Differential tests against a reference solution
//! - `timelimit -m <manifest>` - Wall-clock performance tests
//! - `validate -m <manifest>` - Tests judged by an external validator
//!
//! ## Modules
//!
//! - `commands` - Command implementations
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::HarnessError> for CliError {
    fn from(e: crate::errors::HarnessError) -> Self {
        CliError::failure(format!("Error: {}", e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Multi-language compile-and-test harness
#[derive(Parser, Debug)]
#[command(name = "testlab")]
#[command(version = VERSION)]
#[command(about = "Multi-language compile-and-test harness", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every role declared in the manifest
    Compile {
        /// Session manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
    },

    /// Run differential tests against the reference solution
    Stress {
        /// Session manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        /// Number of tests to run
        #[arg(short = 'n', long = "tests", value_name = "N")]
        tests: Option<usize>,
        /// Worker pool size
        #[arg(short = 'j', long = "workers", value_name = "W")]
        workers: Option<usize>,
    },

    /// Run wall-clock performance tests
    Timelimit {
        /// Session manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        /// Time limit in milliseconds
        #[arg(long = "limit-ms", value_name = "MS")]
        limit_ms: Option<u64>,
        /// Number of tests to run
        #[arg(short = 'n', long = "tests", value_name = "N")]
        tests: Option<usize>,
    },

    /// Run tests judged by an external validator
    Validate {
        /// Session manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        /// Number of tests to run
        #[arg(short = 'n', long = "tests", value_name = "N")]
        tests: Option<usize>,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Compile { manifest } => commands::compile(&manifest),
        Command::Stress {
            manifest,
            tests,
            workers,
        } => commands::stress(&manifest, tests, workers),
        Command::Timelimit {
            manifest,
            limit_ms,
            tests,
        } => commands::timelimit(&manifest, limit_ms, tests),
        Command::Validate { manifest, tests } => commands::validate(&manifest, tests),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_compile() {
        let cli = Cli::try_parse_from(["testlab", "compile", "-m", "session.json"]).unwrap();
        if let Command::Compile { manifest } = cli.command {
            assert_eq!(manifest, PathBuf::from("session.json"));
        } else {
            panic!("Expected Compile command");
        }
    }

    #[test]
    fn test_cli_parse_stress() {
        let cli =
            Cli::try_parse_from(["testlab", "stress", "-m", "session.json", "-n", "50", "-j", "4"])
                .unwrap();
        if let Command::Stress { tests, workers, .. } = cli.command {
            assert_eq!(tests, Some(50));
            assert_eq!(workers, Some(4));
        } else {
            panic!("Expected Stress command");
        }
    }

    #[test]
    fn test_cli_parse_timelimit() {
        let cli = Cli::try_parse_from([
            "testlab",
            "timelimit",
            "-m",
            "session.json",
            "--limit-ms",
            "250",
        ])
        .unwrap();
        if let Command::Timelimit { limit_ms, tests, .. } = cli.command {
            assert_eq!(limit_ms, Some(250));
            assert_eq!(tests, None);
        } else {
            panic!("Expected Timelimit command");
        }
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["testlab", "validate", "-m", "session.json"]).unwrap();
        assert!(matches!(cli.command, Command::Validate { .. }));
    }

    #[test]
    fn test_cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["testlab"]).is_err());
    }

    #[test]
    fn test_harness_errors_convert_to_cli_failures() {
        let e: CliError = crate::errors::HarnessError::Configuration("bad".into()).into();
        assert_eq!(e.exit_code, ExitCode::FAILURE);
        assert!(e.message.contains("bad"));
    }
}
