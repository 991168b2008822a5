//! Command implementations for the CLI.
//!
//! Each command binds the manifest to a compile session, waits for the build
//! pass, then drives the matching test kind. Progress goes to stderr as it
//! happens; the finalized summary is handed to the report sink and reflected
//! in the exit code.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cli::{CliError, CliResult, ExitCode};
use crate::compile::CompileSession;
use crate::events::{
    mismatch_payload, CompileEvent, JsonReportSink, RunEvent, RunSink, Severity,
};
use crate::manifest::{roles, Manifest};
use crate::runner::differential::DifferentialTest;
use crate::runner::time_limit::TimeLimitTest;
use crate::runner::validation::ValidationTest;
use crate::runner::{TestCase, TestRunner, TestRunSummary};

const DEFAULT_TEST_COUNT: usize = 10;
const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TIME_LIMIT_MS: u64 = 1000;

pub fn compile(manifest_path: &Path) -> CliResult<ExitCode> {
    let (_, session) = bind(manifest_path)?;
    if compile_and_wait(&session)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(CliError::failure("Compilation failed"))
    }
}

pub fn stress(
    manifest_path: &Path,
    tests: Option<usize>,
    workers: Option<usize>,
) -> CliResult<ExitCode> {
    let (manifest, session) = bind(manifest_path)?;
    manifest.require_roles(&[roles::GENERATOR, roles::CORRECT, roles::TEST])?;
    if !compile_and_wait(&session)? {
        return Err(CliError::failure("Compilation failed"));
    }

    let case = DifferentialTest::new(
        session.run_command(roles::GENERATOR)?,
        session.run_command(roles::CORRECT)?,
        session.run_command(roles::TEST)?,
        DEFAULT_STAGE_TIMEOUT,
        Some(io_dir(&manifest, "differential")),
    );
    let summary = drive(&manifest, &case, tests, workers);
    report(&manifest, "differential", &summary)?;
    finish(&summary)
}

pub fn timelimit(
    manifest_path: &Path,
    limit_ms: Option<u64>,
    tests: Option<usize>,
) -> CliResult<ExitCode> {
    let (manifest, session) = bind(manifest_path)?;
    manifest.require_roles(&[roles::GENERATOR, roles::TEST])?;
    if !compile_and_wait(&session)? {
        return Err(CliError::failure("Compilation failed"));
    }

    let limit = limit_ms
        .or(manifest.time_limit_ms)
        .unwrap_or(DEFAULT_TIME_LIMIT_MS);
    let case = TimeLimitTest::new(
        session.run_command(roles::GENERATOR)?,
        session.run_command(roles::TEST)?,
        Duration::from_millis(limit),
        manifest.memory_limit_mb,
        Some(io_dir(&manifest, "time_limit")),
    );
    let summary = drive(&manifest, &case, tests, None);
    report(&manifest, "time_limit", &summary)?;
    finish(&summary)
}

pub fn validate(manifest_path: &Path, tests: Option<usize>) -> CliResult<ExitCode> {
    let (manifest, session) = bind(manifest_path)?;
    manifest.require_roles(&[roles::GENERATOR, roles::TEST, roles::VALIDATOR])?;
    if !compile_and_wait(&session)? {
        return Err(CliError::failure("Compilation failed"));
    }

    let case = ValidationTest::new(
        session.run_command(roles::GENERATOR)?,
        session.run_command(roles::TEST)?,
        session.run_command(roles::VALIDATOR)?,
        DEFAULT_STAGE_TIMEOUT,
        Some(io_dir(&manifest, "validation")),
    );
    let summary = drive(&manifest, &case, tests, None);
    report(&manifest, "validation", &summary)?;
    finish(&summary)
}

// ============================================================================
// Shared plumbing
// ============================================================================

fn bind(manifest_path: &Path) -> CliResult<(Manifest, Arc<CompileSession>)> {
    let manifest = Manifest::from_file(manifest_path)?;
    let session = Arc::new(CompileSession::bind(&manifest)?);
    Ok((manifest, session))
}

/// Kick off the background build pass and stream its progress to stderr
/// until the terminal event arrives.
fn compile_and_wait(session: &Arc<CompileSession>) -> CliResult<bool> {
    let (tx, rx) = mpsc::channel();
    let handle = session.compile_all(tx);
    for event in rx {
        match event {
            CompileEvent::Progress { message, severity } => {
                let tag = match severity {
                    Severity::Info => " ",
                    Severity::Success => "+",
                    Severity::Error => "!",
                };
                eprintln!("[{}] {}", tag, message);
            }
            CompileEvent::Finished { .. } => break,
        }
    }
    Ok(handle.wait())
}

fn io_dir(manifest: &Manifest, kind: &str) -> PathBuf {
    manifest.workspace_root.join(kind)
}

/// Run a test kind with live progress on stderr.
fn drive(
    manifest: &Manifest,
    case: &dyn TestCase,
    tests: Option<usize>,
    workers: Option<usize>,
) -> TestRunSummary {
    let test_count = tests
        .or(manifest.test_count)
        .unwrap_or(DEFAULT_TEST_COUNT);
    let workers = workers.or(manifest.max_workers);
    let runner = TestRunner::new(test_count, workers);
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        scope.spawn(move || {
            for event in rx {
                match event {
                    RunEvent::TestStarted { .. } => {}
                    RunEvent::TestCompleted(record) => {
                        if record.passed {
                            eprintln!("test {:>4}: ok", record.test_number);
                        } else {
                            let why = record
                                .failure
                                .map(|k| k.to_string())
                                .unwrap_or_else(|| "failed".into());
                            eprintln!("test {:>4}: FAILED ({})", record.test_number, why);
                        }
                    }
                    RunEvent::RunCompleted { .. } => break,
                }
            }
        });
        runner.run(case, tx)
    })
}

/// Snapshot the sources and persist the run report into the workspace.
fn report(manifest: &Manifest, kind: &str, summary: &TestRunSummary) -> CliResult<()> {
    let snapshot = manifest.snapshot()?;
    let sink = JsonReportSink::new(&manifest.workspace_root, kind);
    sink.record_run(summary, &snapshot, mismatch_payload(summary))?;
    eprintln!("report: {}", sink.path().display());
    Ok(())
}

fn finish(summary: &TestRunSummary) -> CliResult<ExitCode> {
    eprintln!(
        "{} passed, {} failed ({:.2}s)",
        summary.passed, summary.failed, summary.total_elapsed
    );
    if summary.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &Path, body: serde_json::Value) -> PathBuf {
        let path = dir.join("manifest.json");
        fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn stress_requires_the_reference_role() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gen.py"), "print(1)").unwrap();
        fs::write(dir.path().join("sol.py"), "print(1)").unwrap();
        let path = write_manifest(
            dir.path(),
            serde_json::json!({
                "workspace_root": dir.path(),
                "roles": {"generator": "gen.py", "test": "sol.py"},
            }),
        );
        let err = stress(&path, Some(1), None).unwrap_err();
        assert!(err.message.contains("'correct'"));
    }

    #[test]
    fn bind_surfaces_manifest_errors_as_cli_failures() {
        let err = compile(Path::new("/no/such/manifest.json")).unwrap_err();
        assert_eq!(err.exit_code, ExitCode::FAILURE);
        assert!(err.message.contains("manifest"));
    }

    #[cfg(unix)]
    #[test]
    fn stress_end_to_end_with_python_roles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gen.py"), "print(7)\n").unwrap();
        fs::write(dir.path().join("good.py"), "print(int(input()) * 2)\n").unwrap();
        fs::write(dir.path().join("sol.py"), "print(int(input()) * 2)\n").unwrap();
        let path = write_manifest(
            dir.path(),
            serde_json::json!({
                "workspace_root": dir.path(),
                "roles": {"generator": "gen.py", "correct": "good.py", "test": "sol.py"},
                "test_count": 3,
            }),
        );
        // Needs a python3 on PATH; the roles themselves are trivial.
        if std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
        {
            return;
        }
        let code = stress(&path, None, Some(2)).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(dir.path().join("differential/run_report.json").exists());
    }
}
