//! Differential (stress) tests: reference vs candidate on generated input.
//!
//! One unit is a three-stage pipeline: the generator produces an input, the
//! reference and the candidate both consume it, and the trimmed outputs are
//! compared. Any stage failure short-circuits the unit with the matching
//! [`FailureKind`]; a comparison mismatch attaches a full
//! [`MismatchAnalysis`](super::diff::MismatchAnalysis) to the record.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::FailureKind;
use crate::exec;
use crate::runner::{diff, save_test_io, TestCase, TestRecord};

pub struct DifferentialTest {
    generator: Vec<String>,
    reference: Vec<String>,
    candidate: Vec<String>,
    /// Per-stage wall-clock bound.
    stage_timeout: Duration,
    /// Where per-test I/O is persisted; `None` disables persistence.
    io_dir: Option<PathBuf>,
}

impl DifferentialTest {
    pub fn new(
        generator: Vec<String>,
        reference: Vec<String>,
        candidate: Vec<String>,
        stage_timeout: Duration,
        io_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            generator,
            reference,
            candidate,
            stage_timeout,
            io_dir,
        }
    }
}

impl TestCase for DifferentialTest {
    fn run_one(&self, test_number: usize) -> TestRecord {
        let mut record = TestRecord::new(test_number);

        let gen = exec::run(&self.generator, None, self.stage_timeout, false, None);
        record
            .stage_times
            .insert("generator".into(), gen.elapsed);
        if !gen.ok() {
            return record.fail(
                FailureKind::GeneratorFailure,
                format!("generator failed: {}", stage_detail(&gen)),
            );
        }
        record.input = gen.stdout;

        let reference = exec::run(
            &self.reference,
            Some(&record.input),
            self.stage_timeout,
            false,
            None,
        );
        record
            .stage_times
            .insert("reference".into(), reference.elapsed);
        if !reference.ok() {
            let kind = reference
                .failure_kind()
                .unwrap_or(FailureKind::CrashExit);
            return record.fail(
                kind,
                format!("reference solution failed: {}", stage_detail(&reference)),
            );
        }
        record.expected_output = Some(reference.stdout.clone());

        let candidate = exec::run(
            &self.candidate,
            Some(&record.input),
            self.stage_timeout,
            true,
            None,
        );
        record
            .stage_times
            .insert("candidate".into(), candidate.elapsed);
        record.peak_memory_mb = candidate.peak_memory_mb;
        record.timed_out = candidate.timed_out;
        record.output = candidate.stdout.clone();

        if let Some(dir) = &self.io_dir {
            save_test_io(dir, test_number, &record.input, &record.output);
        }

        if !candidate.ok() {
            let kind = candidate.failure_kind().unwrap_or(FailureKind::CrashExit);
            return record.fail(
                kind,
                format!("candidate failed: {}", stage_detail(&candidate)),
            );
        }

        if diff::outputs_match(&reference.stdout, &candidate.stdout) {
            record.passed = true;
        } else {
            record.mismatch = Some(diff::analyze(&reference.stdout, &candidate.stdout));
            record = record.fail(FailureKind::WrongAnswer, "outputs differ");
        }
        record
    }
}

fn stage_detail(result: &exec::ExecutionResult) -> String {
    if result.timed_out {
        return format!("timed out after {:.1}s", result.elapsed);
    }
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", result.return_code)
    } else {
        format!("exit code {}: {}", result.return_code, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn case(generator: &str, reference: &str, candidate: &str) -> DifferentialTest {
        DifferentialTest::new(
            sh(generator),
            sh(reference),
            sh(candidate),
            Duration::from_secs(5),
            None,
        )
    }

    #[cfg(unix)]
    #[test]
    fn matching_outputs_pass() {
        let record = case("echo '3 1 2'", "cat", "cat").run_one(1);
        assert!(record.passed);
        assert_eq!(record.input.trim(), "3 1 2");
        assert_eq!(record.output, record.expected_output.clone().unwrap());
        assert!(record.stage_times.contains_key("generator"));
        assert!(record.stage_times.contains_key("reference"));
        assert!(record.stage_times.contains_key("candidate"));
    }

    #[cfg(unix)]
    #[test]
    fn mismatch_attaches_analysis() {
        let record = case("echo input", "echo right", "echo wrong").run_one(2);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::WrongAnswer));
        let mismatch = record.mismatch.unwrap();
        assert_eq!(mismatch.summary.modified, 1);
        assert!(mismatch.unified_diff.contains("-right"));
        assert!(mismatch.unified_diff.contains("+wrong"));
    }

    #[cfg(unix)]
    #[test]
    fn trailing_whitespace_does_not_fail_a_unit() {
        let record = case("echo x", "printf 'a\\nb\\n'", "printf 'a \\nb'").run_one(3);
        assert!(record.passed);
    }

    #[cfg(unix)]
    #[test]
    fn generator_failure_short_circuits() {
        let record = case("exit 3", "cat", "cat").run_one(4);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::GeneratorFailure));
        // Later stages never ran.
        assert!(!record.stage_times.contains_key("reference"));
        assert!(record.expected_output.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn candidate_nonzero_exit_is_recorded_with_its_input() {
        let record = case("echo payload", "cat", "exit 139").run_one(5);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::RuntimeError));
        assert_eq!(record.input.trim(), "payload");
        assert!(record.error.unwrap().contains("candidate failed"));
    }

    #[cfg(unix)]
    #[test]
    fn candidate_signal_death_is_a_crash() {
        let record = case("echo payload", "cat", "kill -9 $$").run_one(8);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::CrashExit));
    }

    #[cfg(unix)]
    #[test]
    fn candidate_timeout_is_recorded() {
        let test = DifferentialTest::new(
            sh("echo x"),
            sh("cat"),
            sh("sleep 30"),
            Duration::from_millis(100),
            None,
        );
        let record = test.run_one(6);
        assert!(!record.passed);
        assert!(record.timed_out);
        assert_eq!(record.failure, Some(FailureKind::Timeout));
    }

    #[cfg(unix)]
    #[test]
    fn io_persists_when_a_directory_is_given() {
        let dir = tempfile::tempdir().unwrap();
        let test = DifferentialTest::new(
            sh("echo in"),
            sh("cat"),
            sh("cat"),
            Duration::from_secs(5),
            Some(dir.path().to_path_buf()),
        );
        let record = test.run_one(1);
        assert!(record.passed);
        assert!(dir.path().join("inputs/input_1.txt").exists());
        assert!(dir.path().join("outputs/output_1.txt").exists());
    }
}
