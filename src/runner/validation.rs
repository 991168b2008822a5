//! Validator tests: correctness judged by an external program.
//!
//! For problems with many acceptable outputs a reference comparison is
//! useless; instead a user-supplied validator inspects the (input, output)
//! pair. The validator is handed two file paths as trailing arguments and
//! answers through its exit code:
//!
//! - `1` - output is valid
//! - `0` - output is invalid
//! - anything else - the validator itself failed
//!
//! The three cases are kept distinct in the record: an invalid output is
//! `WrongAnswer`, a broken validator is `ValidationError`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::FailureKind;
use crate::exec;
use crate::runner::{save_test_io, TestCase, TestRecord};

pub struct ValidationTest {
    generator: Vec<String>,
    candidate: Vec<String>,
    validator: Vec<String>,
    stage_timeout: Duration,
    io_dir: Option<PathBuf>,
}

impl ValidationTest {
    pub fn new(
        generator: Vec<String>,
        candidate: Vec<String>,
        validator: Vec<String>,
        stage_timeout: Duration,
        io_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            generator,
            candidate,
            validator,
            stage_timeout,
            io_dir,
        }
    }
}

impl TestCase for ValidationTest {
    fn run_one(&self, test_number: usize) -> TestRecord {
        let mut record = TestRecord::new(test_number);

        let gen = exec::run(&self.generator, None, self.stage_timeout, false, None);
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
                format!("candidate failed with exit code {}", candidate.return_code),
            );
        }

        let (input_path, output_path) = match scratch_pair(&record.input, &record.output) {
            Ok(paths) => paths,
            Err(e) => {
                return record.fail(
                    FailureKind::ValidationError,
                    format!("cannot stage validator files: {}", e),
                );
            }
        };

        let mut command = self.validator.clone();
        command.push(input_path.display().to_string());
        command.push(output_path.display().to_string());
        let verdict = exec::run(&command, None, self.stage_timeout, false, None);
        record
            .stage_times
            .insert("validator".into(), verdict.elapsed);

        let _ = std::fs::remove_file(&input_path);
        let _ = std::fs::remove_file(&output_path);

        match verdict.return_code {
            1 if !verdict.timed_out => {
                record.passed = true;
                record
            }
            0 if !verdict.timed_out => {
                let detail = verdict_detail(&verdict);
                record.fail(
                    FailureKind::WrongAnswer,
                    format!("validator rejected the output{}", detail),
                )
            }
            code => record.fail(
                FailureKind::ValidationError,
                if verdict.timed_out {
                    format!("validator timed out after {:.1}s", verdict.elapsed)
                } else {
                    format!(
                        "validator failed with exit code {}{}",
                        code,
                        verdict_detail(&verdict)
                    )
                },
            ),
        }
    }
}

fn verdict_detail(result: &exec::ExecutionResult) -> String {
    let text = if result.stderr.trim().is_empty() {
        result.stdout.trim()
    } else {
        result.stderr.trim()
    };
    if text.is_empty() {
        String::new()
    } else {
        format!(": {}", text)
    }
}

fn scratch_pair(input: &str, output: &str) -> std::io::Result<(PathBuf, PathBuf)> {
    let input_path = scratch("validate_in_", input)?;
    match scratch("validate_out_", output) {
        Ok(output_path) => Ok((input_path, output_path)),
        Err(e) => {
            let _ = std::fs::remove_file(&input_path);
            Err(e)
        }
    }
}

fn scratch(prefix: &str, content: &str) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn case(generator: &str, candidate: &str, validator: &str) -> ValidationTest {
        ValidationTest::new(
            sh(generator),
            sh(candidate),
            sh(validator),
            Duration::from_secs(5),
            None,
        )
    }

    #[cfg(unix)]
    #[test]
    fn exit_one_means_valid() {
        let record = case("echo q", "cat", "exit 1").run_one(1);
        assert!(record.passed);
        assert!(record.stage_times.contains_key("validator"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_zero_means_invalid_output() {
        let record = case("echo q", "cat", "echo 'line 3 wrong' >&2; exit 0").run_one(2);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::WrongAnswer));
        assert!(record.error.unwrap().contains("line 3 wrong"));
    }

    #[cfg(unix)]
    #[test]
    fn other_exit_codes_mean_validator_error() {
        let record = case("echo q", "cat", "exit 2").run_one(3);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::ValidationError));
        assert!(record.error.unwrap().contains("exit code 2"));
    }

    #[cfg(unix)]
    #[test]
    fn validator_sees_input_and_output_files() {
        // Valid iff the output file echoes the input file.
        let record = case("echo payload", "cat", "cmp -s \"$0\" \"$1\" && exit 1 || exit 0")
            .run_one(4);
        assert!(record.passed);

        let record = case("echo payload", "tr a-z A-Z", "cmp -s \"$0\" \"$1\" && exit 1 || exit 0")
            .run_one(5);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::WrongAnswer));
    }

    #[cfg(unix)]
    #[test]
    fn candidate_failure_skips_the_validator() {
        let record = case("echo q", "exit 5", "exit 1").run_one(6);
        assert!(!record.passed);
        assert_eq!(record.failure, Some(FailureKind::RuntimeError));
        assert!(!record.stage_times.contains_key("validator"));
    }
}
