#![forbid(unsafe_code)]
//! Multi-language compile-and-test harness
//!
//! testlab builds and exercises small competitive-programming-style programs:
//! it detects each source's language, compiles what needs compiling on a
//! bounded worker pool, then runs batches of numbered tests (differential,
//! time-limit, or validator-judged) with full per-test records. Hosts talk to
//! the core through a JSON manifest on the way in and typed event channels
//! plus a report sink on the way out.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Per-test failures are values**: a broken compile, a crashed solution, or a timed-out run is
//!   recorded in `ExecutionResult` / `TestRecord`, never raised. Only API misuse (bad manifest,
//!   unknown language) becomes a `HarnessError`.
//!
//! - **True invariants**: If a panic represents a harness bug (logic error), use
//!   `.expect("INVARIANT: reason")` with a clear explanation.

pub mod cli;
pub mod compile;
pub mod errors;
pub mod events;
pub mod exec;
pub mod lang;
pub mod manifest;
pub mod runner;

pub use compile::{CompilationUnit, CompileHandle, CompileSession};
pub use errors::{FailureKind, HarnessError, Result};
pub use events::{CompileEvent, JsonReportSink, RunEvent, RunSink, Severity};
pub use exec::{run_pipeline, run_with_temp_files, ExecutionResult, Stage};
pub use lang::{detect, detect_from_content, detect_from_extension, Language};
pub use manifest::{FilesSnapshot, Manifest};
pub use runner::{CancelToken, RunState, RunStatus, TestCase, TestRecord, TestRunner, TestRunSummary};
