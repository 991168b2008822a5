//! Process execution primitive.
//!
//! Everything the harness runs (compilers, generators, solutions,
//! validators) goes through [`run`]. One spawn per call, supervised with a
//! wall-clock timeout, optional peak-memory sampling, and full output
//! capture. Failures come back as values: a missing executable yields an
//! [`ExecutionResult`] with `return_code = -1` and a descriptive stderr, not
//! an `Err`. Only host-fatal conditions (panics, allocation failure) escape.
//!
//! ## Pipe handling
//!
//! Stdout and stderr are drained on dedicated reader threads while the
//! supervisor polls `try_wait`. Stdin, when input is supplied, is written on
//! its own thread too; a child that never reads its stdin must not be able
//! to wedge the supervisor past the timeout.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::errors::FailureKind;

/// Poll interval for the supervision loop.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Outcome of one supervised process invocation. Always produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Exit code; `-1` for launch failures, negated signal number for
    /// signal deaths on unix.
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: f64,
    pub peak_memory_mb: f64,
    pub timed_out: bool,
    pub command: Vec<String>,
}

impl ExecutionResult {
    pub fn ok(&self) -> bool {
        self.return_code == 0 && !self.timed_out
    }

    fn launch_failure(command: &[String], error: &std::io::Error, elapsed: f64) -> Self {
        let name = command.first().map(String::as_str).unwrap_or("<empty>");
        Self {
            return_code: -1,
            stdout: String::new(),
            stderr: format!("failed to launch '{}': {}", name, error),
            elapsed,
            peak_memory_mb: 0.0,
            timed_out: false,
            command: command.to_vec(),
        }
    }

    /// Classify a non-ok result. `None` for clean exits.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.timed_out {
            Some(FailureKind::Timeout)
        } else if self.return_code == -1 && self.stderr.starts_with("failed to launch") {
            Some(FailureKind::LaunchFailure)
        } else if self.return_code < 0 {
            // Negated signal number from exit_code().
            Some(FailureKind::CrashExit)
        } else if self.return_code != 0 {
            Some(FailureKind::RuntimeError)
        } else {
            None
        }
    }
}

/// Run a command to completion under a wall-clock timeout.
///
/// If `input` is supplied it is written to the child's stdin and the pipe is
/// closed; otherwise stdin is not connected. With `monitor_memory` the
/// supervisor samples the child's resident set every poll tick (linux; other
/// platforms report 0.0). On timeout the child is killed and reaped before
/// returning, so no invocation leaves an orphan behind.
pub fn run(
    command: &[String],
    input: Option<&str>,
    timeout: Duration,
    monitor_memory: bool,
    cwd: Option<&Path>,
) -> ExecutionResult {
    let start = Instant::now();

    if command.is_empty() {
        return ExecutionResult::launch_failure(
            command,
            &std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            0.0,
        );
    }

    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..])
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(command = ?command, error = %e, "process launch failed");
            return ExecutionResult::launch_failure(command, &e, start.elapsed().as_secs_f64());
        }
    };

    let stdin_writer = child.stdin.take().zip(input.map(str::to_owned)).map(
        |(mut stdin, text)| {
            thread::spawn(move || {
                // EPIPE here just means the child exited early.
                let _ = stdin.write_all(text.as_bytes());
            })
        },
    );
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let pid = child.id();
    let mut peak_memory_mb = 0.0f64;
    let mut timed_out = false;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(pid, error = %e, "try_wait failed, killing process");
                kill_and_reap(&mut child);
                break None;
            }
        }

        if monitor_memory {
            if let Some(rss) = sample_rss_mb(pid) {
                peak_memory_mb = peak_memory_mb.max(rss);
            }
        }

        if start.elapsed() > timeout {
            timed_out = true;
            kill_and_reap(&mut child);
            break None;
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.map(join_reader).unwrap_or_default();
    let stderr = stderr_reader.map(join_reader).unwrap_or_default();
    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }

    let return_code = status.map(exit_code).unwrap_or(-1);
    let elapsed = start.elapsed().as_secs_f64();

    ExecutionResult {
        return_code,
        stdout,
        stderr,
        elapsed,
        peak_memory_mb,
        timed_out,
        command: command.to_vec(),
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> String {
    match handle.join() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        // A panicking reader thread is a harness bug; propagate it.
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Peak-RSS sample for a pid, in MB. Linux reads `/proc/<pid>/status`.
#[cfg(target_os = "linux")]
fn sample_rss_mb(pid: u32) -> Option<f64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn sample_rss_mb(_pid: u32) -> Option<f64> {
    None
}

// ============================================================================
// Temp-file execution
// ============================================================================

/// Placeholder tokens recognised in command templates.
pub const INPUT_FILE_TOKEN: &str = "{input_file}";
pub const OUTPUT_FILE_TOKEN: &str = "{output_file}";

/// Run a command whose argv refers to scratch files instead of pipes.
///
/// `input` is materialised into a scratch file and, when requested, an empty
/// scratch output file is reserved; `{input_file}`/`{output_file}` tokens in
/// the template are substituted with the real paths before execution. The
/// scratch files are deleted afterwards unless `cleanup` is false; the paths
/// are returned either way so callers with `cleanup = false` can collect the
/// output file.
pub fn run_with_temp_files(
    command_template: &[String],
    input: &str,
    needs_output_file: bool,
    timeout: Duration,
    cleanup: bool,
) -> (ExecutionResult, Option<PathBuf>, Option<PathBuf>) {
    let input_path = match write_scratch("exec_in_", input) {
        Ok(path) => path,
        Err(e) => return (ExecutionResult::launch_failure(command_template, &e, 0.0), None, None),
    };
    let output_path = if needs_output_file {
        match write_scratch("exec_out_", "") {
            Ok(path) => Some(path),
            Err(e) => {
                let _ = std::fs::remove_file(&input_path);
                return (
                    ExecutionResult::launch_failure(command_template, &e, 0.0),
                    None,
                    None,
                );
            }
        }
    } else {
        None
    };

    let command: Vec<String> = command_template
        .iter()
        .map(|arg| match arg.as_str() {
            INPUT_FILE_TOKEN => input_path.display().to_string(),
            OUTPUT_FILE_TOKEN => output_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => arg.clone(),
        })
        .collect();

    let result = run(&command, None, timeout, false, None);

    if cleanup {
        let _ = std::fs::remove_file(&input_path);
        if let Some(out) = &output_path {
            let _ = std::fs::remove_file(out);
        }
    }

    (result, Some(input_path), output_path)
}

fn write_scratch(prefix: &str, content: &str) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    // Persist: lifetime is managed by the caller, not the handle.
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

// ============================================================================
// Pipelines
// ============================================================================

/// One stage of a [`run_pipeline`] invocation.
#[derive(Debug, Clone)]
pub struct Stage {
    pub command: Vec<String>,
    /// Seed input; consulted for the first stage only.
    pub input: Option<String>,
    pub monitor_memory: bool,
}

impl Stage {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            input: None,
            monitor_memory: false,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Run stages sequentially, feeding each stage's stdout to the next stage's
/// stdin. The timeout bounds each stage independently, not the pipeline as a
/// whole. With `stop_on_failure`, a nonzero return code skips the remaining
/// stages; only completed stages' results are returned.
pub fn run_pipeline(
    stages: &[Stage],
    timeout_per_stage: Duration,
    stop_on_failure: bool,
) -> Vec<ExecutionResult> {
    let mut results: Vec<ExecutionResult> = Vec::with_capacity(stages.len());

    for (i, stage) in stages.iter().enumerate() {
        let carried;
        let input: Option<&str> = if i == 0 {
            stage.input.as_deref()
        } else {
            carried = results[i - 1].stdout.clone();
            Some(carried.as_str())
        };

        let result = run(
            &stage.command,
            input,
            timeout_per_stage,
            stage.monitor_memory,
            None,
        );
        let failed = result.return_code != 0;
        results.push(result);

        if stop_on_failure && failed {
            break;
        }
    }

    results
}
