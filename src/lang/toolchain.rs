//! Per-language compilation strategies behind one trait.
//!
//! A [`Toolchain`] turns a source file into something runnable and knows how
//! to invoke the result. Build failures are values ([`BuildOutcome`]), never
//! errors; a broken source file is an expected outcome of a testing session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{HarnessError, Result};
use crate::exec;
use crate::lang::profile::{self, LanguageProfile};
use crate::lang::Language;

/// Result of one build attempt.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub ok: bool,
    /// Compiler diagnostics on failure, a short confirmation on success.
    pub message: String,
}

impl BuildOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Strategy for building and running sources of one language.
pub trait Toolchain: Send + Sync {
    fn language(&self) -> Language;

    /// Whether sources must be built before they can run.
    fn needs_build(&self) -> bool;

    /// Build `source`, producing `output` where the language has an artifact.
    /// For interpreted languages this is the syntax pre-flight.
    fn build(
        &self,
        source: &Path,
        output: Option<&Path>,
        extra_flags: Option<&[String]>,
        timeout: Duration,
    ) -> BuildOutcome;

    /// Argv that executes the built artifact.
    fn run_command(&self, artifact: &Path, class_name: Option<&str>) -> Vec<String>;

    fn artifact_suffix(&self) -> &str;

    /// Where the artifact for `source` lives. Interpreted sources are their
    /// own artifact.
    fn artifact_path(&self, source: &Path) -> PathBuf;
}

fn diagnostics(result: &exec::ExecutionResult) -> String {
    if result.timed_out {
        return format!("build timed out after {:.1}s", result.elapsed);
    }
    let text = if result.stderr.trim().is_empty() {
        result.stdout.trim()
    } else {
        result.stderr.trim()
    };
    if text.is_empty() {
        format!("build failed with exit code {}", result.return_code)
    } else {
        text.to_string()
    }
}

// ============================================================================
// C++
// ============================================================================

/// Native compilation via an external compiler.
pub struct CppToolchain {
    profile: LanguageProfile,
}

impl Toolchain for CppToolchain {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn needs_build(&self) -> bool {
        true
    }

    fn build(
        &self,
        source: &Path,
        output: Option<&Path>,
        extra_flags: Option<&[String]>,
        timeout: Duration,
    ) -> BuildOutcome {
        let command = profile::build_command(&self.profile, Language::Cpp, source, output, extra_flags);
        tracing::debug!(command = ?command, "compiling");
        let result = exec::run(&command, None, timeout, false, None);
        if result.ok() {
            BuildOutcome::success(format!("compiled {}", source.display()))
        } else {
            // A half-written artifact would look fresh on the next staleness
            // check; remove it.
            if let Some(out) = output {
                let _ = std::fs::remove_file(out);
            }
            BuildOutcome::failure(diagnostics(&result))
        }
    }

    fn run_command(&self, artifact: &Path, class_name: Option<&str>) -> Vec<String> {
        profile::run_command(&self.profile, Language::Cpp, artifact, class_name)
    }

    fn artifact_suffix(&self) -> &str {
        &self.profile.artifact_suffix
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.with_extension(self.artifact_suffix().trim_start_matches('.'))
    }
}

// ============================================================================
// Python
// ============================================================================

/// Interpreted execution with a syntax pre-flight.
pub struct PythonToolchain {
    profile: LanguageProfile,
}

impl Toolchain for PythonToolchain {
    fn language(&self) -> Language {
        Language::Python
    }

    fn needs_build(&self) -> bool {
        false
    }

    fn build(
        &self,
        source: &Path,
        _output: Option<&Path>,
        extra_flags: Option<&[String]>,
        timeout: Duration,
    ) -> BuildOutcome {
        let command = profile::build_command(&self.profile, Language::Python, source, None, extra_flags);
        let result = exec::run(&command, None, timeout, false, None);
        if result.ok() {
            BuildOutcome::success(format!("syntax ok: {}", source.display()))
        } else {
            BuildOutcome::failure(diagnostics(&result))
        }
    }

    fn run_command(&self, artifact: &Path, class_name: Option<&str>) -> Vec<String> {
        profile::run_command(&self.profile, Language::Python, artifact, class_name)
    }

    fn artifact_suffix(&self) -> &str {
        &self.profile.artifact_suffix
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.to_path_buf()
    }
}

// ============================================================================
// Java
// ============================================================================

/// Bytecode compilation into a classpath directory.
pub struct JavaToolchain {
    profile: LanguageProfile,
}

impl Toolchain for JavaToolchain {
    fn language(&self) -> Language {
        Language::Java
    }

    fn needs_build(&self) -> bool {
        true
    }

    fn build(
        &self,
        source: &Path,
        output: Option<&Path>,
        extra_flags: Option<&[String]>,
        timeout: Duration,
    ) -> BuildOutcome {
        if let Some(dir) = output.and_then(Path::parent) {
            if !dir.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    return BuildOutcome::failure(format!(
                        "cannot create class directory {}: {}",
                        dir.display(),
                        e
                    ));
                }
            }
        }
        let command = profile::build_command(&self.profile, Language::Java, source, output, extra_flags);
        tracing::debug!(command = ?command, "compiling");
        let result = exec::run(&command, None, timeout, false, None);
        if result.ok() {
            BuildOutcome::success(format!("compiled {}", source.display()))
        } else {
            if let Some(out) = output {
                let _ = std::fs::remove_file(out);
            }
            BuildOutcome::failure(diagnostics(&result))
        }
    }

    fn run_command(&self, artifact: &Path, class_name: Option<&str>) -> Vec<String> {
        profile::run_command(&self.profile, Language::Java, artifact, class_name)
    }

    fn artifact_suffix(&self) -> &str {
        &self.profile.artifact_suffix
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.with_extension("class")
    }
}

/// Strategy for a language under a resolved profile.
pub fn toolchain_for(language: Language, profile: LanguageProfile) -> Result<Box<dyn Toolchain>> {
    match language {
        Language::Cpp => Ok(Box::new(CppToolchain { profile })),
        Language::Python => Ok(Box::new(PythonToolchain { profile })),
        Language::Java => Ok(Box::new(JavaToolchain { profile })),
        Language::Unknown => Err(HarnessError::Configuration(
            "cannot build a toolchain for an unknown language".into(),
        )),
    }
}
