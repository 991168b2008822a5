//! Parallel test-execution framework.
//!
//! A [`TestRunner`] drives N numbered test units through a bounded worker
//! pool. What one unit *does* is behind the [`TestCase`] trait; the runner
//! only guarantees the bookkeeping: every requested test number runs exactly
//! once (unless the run is canceled first), every unit produces a
//! [`TestRecord`] whatever its outcome, records are appended in completion
//! order, and exactly one `RunCompleted` event terminates the stream.
//!
//! Cancellation is cooperative: a [`CancelToken`] stops new submissions;
//! in-flight units finish, are recorded, and their processes are reaped by
//! the worker that owns them.
//!
//! ## Modules
//!
//! - `diff` - output comparison and mismatch analysis
//! - `differential` - generator vs reference comparison tests
//! - `time_limit` - wall-clock performance tests
//! - `validation` - external-validator tests

pub mod diff;
pub mod differential;
pub mod time_limit;
pub mod validation;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::FailureKind;
use crate::events::{RunEvent, RunEvents};
use diff::MismatchAnalysis;

/// Everything known about one completed test unit. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub test_number: usize,
    pub passed: bool,
    /// Generated test input, in full.
    pub input: String,
    /// Candidate output, in full.
    pub output: String,
    /// Reference output, for test kinds that have one.
    pub expected_output: Option<String>,
    /// Per-stage wall-clock seconds, keyed by stage name.
    pub stage_times: BTreeMap<String, f64>,
    pub peak_memory_mb: f64,
    pub timed_out: bool,
    pub failure: Option<FailureKind>,
    /// Human-readable failure detail.
    pub error: Option<String>,
    pub mismatch: Option<MismatchAnalysis>,
    /// elapsed / limit, for performance tests.
    pub perf_ratio: Option<f64>,
    /// peak memory / limit, when a memory limit is configured.
    pub memory_ratio: Option<f64>,
    /// Unix seconds at record creation.
    pub timestamp: f64,
}

impl TestRecord {
    pub fn new(test_number: usize) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            test_number,
            passed: false,
            input: String::new(),
            output: String::new(),
            expected_output: None,
            stage_times: BTreeMap::new(),
            peak_memory_mb: 0.0,
            timed_out: false,
            failure: None,
            error: None,
            mismatch: None,
            perf_ratio: None,
            memory_ratio: None,
            timestamp,
        }
    }

    pub(crate) fn fail(mut self, kind: FailureKind, error: impl Into<String>) -> Self {
        self.passed = false;
        self.failure = Some(kind);
        self.error = Some(error.into());
        self
    }
}

/// Finalized outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_elapsed: f64,
    pub canceled: bool,
    pub records: Vec<TestRecord>,
}

impl TestRunSummary {
    pub fn finalize(records: Vec<TestRecord>, total_elapsed: f64, canceled: bool) -> Self {
        let passed = records.iter().filter(|r| r.passed).count();
        Self {
            total: records.len(),
            passed,
            failed: records.len() - passed,
            total_elapsed,
            canceled,
            records,
        }
    }

    pub fn all_passed(&self) -> bool {
        !self.canceled && self.failed == 0 && self.total > 0
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Canceled,
}

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One kind of test. Implementations must be callable from several worker
/// threads at once and must reap any process they spawn before returning.
pub trait TestCase: Send + Sync {
    fn run_one(&self, test_number: usize) -> TestRecord;
}

/// Observer handle for a runner's lifecycle. Stays valid after
/// [`TestRunner::run`] has consumed the runner.
#[derive(Debug, Clone)]
pub struct RunStatus {
    state: Arc<Mutex<RunState>>,
}

impl RunStatus {
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded-pool driver for numbered test units. Single-use: [`run`] consumes
/// the runner, so a finished run can never be restarted on a stale token.
///
/// [`run`]: TestRunner::run
pub struct TestRunner {
    test_count: usize,
    max_workers: Option<usize>,
    cancel: CancelToken,
    state: Arc<Mutex<RunState>>,
}

impl TestRunner {
    pub fn new(test_count: usize, max_workers: Option<usize>) -> Self {
        Self {
            test_count,
            max_workers,
            cancel: CancelToken::new(),
            state: Arc::new(Mutex::new(RunState::Pending)),
        }
    }

    /// Handle for canceling this runner's run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Handle for observing the run's lifecycle from another thread.
    pub fn status(&self) -> RunStatus {
        RunStatus {
            state: Arc::clone(&self.state),
        }
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn worker_count(&self) -> usize {
        if let Some(n) = self.max_workers {
            return n.clamp(1, self.test_count.max(1));
        }
        let parallelism = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        // Leave one core for the host application.
        parallelism.saturating_sub(1).clamp(1, 8).min(self.test_count.max(1))
    }

    /// Run all units to completion (or cancellation) and finalize exactly one
    /// summary. Events stream in completion order.
    pub fn run(self, case: &dyn TestCase, events: RunEvents) -> TestRunSummary {
        let start = Instant::now();
        let total = self.test_count;
        let workers = self.worker_count();
        self.set_state(RunState::Running);
        tracing::info!(total, workers, "test run started");

        let (tx, rx) = mpsc::channel::<usize>();
        for n in 1..=total {
            let _ = tx.send(n);
        }
        drop(tx);
        let jobs = Mutex::new(rx);
        let records: Mutex<Vec<TestRecord>> = Mutex::new(Vec::with_capacity(total));
        let events_ref = &events;

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.cancel.is_canceled() {
                        break;
                    }
                    let test_number = {
                        let guard = jobs.lock().unwrap_or_else(|e| e.into_inner());
                        match guard.recv() {
                            Ok(n) => n,
                            Err(_) => break,
                        }
                    };
                    {
                        let done = records.lock().unwrap_or_else(|e| e.into_inner()).len();
                        let _ = events_ref.send(RunEvent::TestStarted {
                            completed: done,
                            total,
                        });
                    }
                    let record = case.run_one(test_number);
                    let mut guard = records.lock().unwrap_or_else(|e| e.into_inner());
                    guard.push(record.clone());
                    drop(guard);
                    let _ = events_ref.send(RunEvent::TestCompleted(record));
                });
            }
        });

        let records = records
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        let canceled = self.cancel.is_canceled();
        self.set_state(if canceled {
            RunState::Canceled
        } else {
            RunState::Completed
        });
        let summary = TestRunSummary::finalize(records, start.elapsed().as_secs_f64(), canceled);
        let _ = events.send(RunEvent::RunCompleted {
            all_passed: summary.all_passed(),
        });
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            canceled,
            "test run finished"
        );
        summary
    }
}

/// Persist one unit's I/O under `<dir>/inputs` and `<dir>/outputs`.
///
/// Best-effort: persistence failure is logged, never surfaced as a test
/// failure.
pub(crate) fn save_test_io(dir: &Path, test_number: usize, input: &str, output: &str) {
    let write = |sub: &str, prefix: &str, content: &str| -> std::io::Result<()> {
        let d = dir.join(sub);
        std::fs::create_dir_all(&d)?;
        std::fs::write(d.join(format!("{}_{}.txt", prefix, test_number)), content)
    };
    if let Err(e) = write("inputs", "input", input) {
        tracing::warn!(test_number, error = %e, "could not persist test input");
    }
    if let Err(e) = write("outputs", "output", output) {
        tracing::warn!(test_number, error = %e, "could not persist test output");
    }
}
