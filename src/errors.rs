//! Error taxonomy for the harness.
//!
//! Two tiers, matching the propagation policy:
//!
//! - [`HarnessError`] - API-level errors (bad manifest, unsupported language,
//!   host I/O). These propagate with `?` and stop the caller.
//! - [`FailureKind`] - per-process and per-test failures. These are *values*
//!   recorded in `ExecutionResult` / `TestRecord` and never cross a component
//!   boundary as an `Err`. A failed compile or a timed-out solution is an
//!   expected outcome, not an exception.
//!
//! Host-fatal conditions (panics in worker threads, allocation failure) are
//! deliberately not caught anywhere; they must reach the hosting application.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the harness API itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Unknown or unsupported language, or an invalid profile override.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The manifest is missing roles or points at files that do not exist.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Classification of a recovered failure, carried inside result values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Nonzero compiler exit or interpreter syntax failure.
    CompilationFailure,
    /// Executable missing or the OS refused to run it.
    LaunchFailure,
    /// Wall-clock limit exceeded.
    Timeout,
    /// Peak resident memory exceeded the configured limit.
    MemoryExceeded,
    /// Process killed by a signal.
    CrashExit,
    /// Process exited on its own with a nonzero code.
    RuntimeError,
    /// External validator returned a non-binary verdict code.
    ValidationError,
    /// Output rejected: differential mismatch or validator verdict "invalid".
    WrongAnswer,
    /// The generator stage failed, so the test could not run at all.
    GeneratorFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::CompilationFailure => "compilation failure",
            FailureKind::LaunchFailure => "launch failure",
            FailureKind::Timeout => "timeout",
            FailureKind::MemoryExceeded => "memory limit exceeded",
            FailureKind::CrashExit => "crash",
            FailureKind::RuntimeError => "runtime error",
            FailureKind::ValidationError => "validator error",
            FailureKind::WrongAnswer => "wrong answer",
            FailureKind::GeneratorFailure => "generator failure",
        };
        write!(f, "{}", name)
    }
}
