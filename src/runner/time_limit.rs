//! Time-limit (performance) tests.
//!
//! The candidate runs against generated input under a wall-clock limit and,
//! optionally, a peak-memory limit. The unit fails on timeout, memory
//! breach, nonzero exit, or completion over the limit; the record always
//! carries `perf_ratio = elapsed / limit` (and `memory_ratio` when a memory
//! limit is set) so near-misses are visible.
//!
//! The hard kill happens well past the limit (4x plus a second of grace), so
//! a slightly-too-slow solution still finishes and reports a meaningful
//! ratio instead of a flat kill at the boundary.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::FailureKind;
use crate::exec;
use crate::runner::{save_test_io, TestCase, TestRecord};

pub struct TimeLimitTest {
    generator: Vec<String>,
    candidate: Vec<String>,
    limit: Duration,
    /// Peak-RSS bound for the candidate; `None` disables the check.
    memory_limit_mb: Option<f64>,
    io_dir: Option<PathBuf>,
}

impl TimeLimitTest {
    pub fn new(
        generator: Vec<String>,
        candidate: Vec<String>,
        limit: Duration,
        memory_limit_mb: Option<f64>,
        io_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            generator,
            candidate,
            limit,
            memory_limit_mb,
            io_dir,
        }
    }

    fn hard_timeout(&self) -> Duration {
        self.limit * 4 + Duration::from_secs(1)
    }
}

impl TestCase for TimeLimitTest {
    fn run_one(&self, test_number: usize) -> TestRecord {
        let mut record = TestRecord::new(test_number);

        let gen = exec::run(&self.generator, None, self.hard_timeout(), false, None);
        record.stage_times.insert("generator".into(), gen.elapsed);
        if !gen.ok() {
            return record.fail(
                FailureKind::GeneratorFailure,
                format!("generator failed with exit code {}", gen.return_code),
            );
        }
        record.input = gen.stdout;

        let candidate = exec::run(
            &self.candidate,
            Some(&record.input),
            self.hard_timeout(),
            true,
            None,
        );
        record
            .stage_times
            .insert("candidate".into(), candidate.elapsed);
        record.peak_memory_mb = candidate.peak_memory_mb;
        record.output = candidate.stdout.clone();

        let limit_secs = self.limit.as_secs_f64();
        record.perf_ratio = Some(if limit_secs > 0.0 {
            candidate.elapsed / limit_secs
        } else {
            f64::INFINITY
        });
        record.memory_ratio = self.memory_limit_mb.map(|limit| {
            if limit > 0.0 {
                candidate.peak_memory_mb / limit
            } else {
                0.0
            }
        });
        // Timed out means "exceeded the limit", whether or not the grace
        // window forced a kill.
        record.timed_out = candidate.timed_out || candidate.elapsed > limit_secs;

        if let Some(dir) = &self.io_dir {
            save_test_io(dir, test_number, &record.input, &record.output);
        }

        if record.timed_out {
            return record.fail(
                FailureKind::Timeout,
                format!(
                    "exceeded {:.0}ms limit (ran {:.0}ms)",
                    limit_secs * 1000.0,
                    candidate.elapsed * 1000.0
                ),
            );
        }
        if let Some(limit) = self.memory_limit_mb {
            if candidate.peak_memory_mb > limit {
                return record.fail(
                    FailureKind::MemoryExceeded,
                    format!(
                        "exceeded {:.1}MB memory limit (peak {:.1}MB)",
                        limit, candidate.peak_memory_mb
                    ),
                );
            }
        }
        if candidate.return_code != 0 {
            let kind = candidate.failure_kind().unwrap_or(FailureKind::CrashExit);
            return record.fail(
                kind,
                format!("candidate failed with exit code {}", candidate.return_code),
            );
        }
        record.passed = true;
        record
    }
}
