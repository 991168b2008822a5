//! Language profiles: merged build/run configuration per language.
//!
//! A [`ProfileResolver`] owns a cache of profiles built from compiled-in
//! defaults merged field-wise with caller-supplied overrides. The cache is
//! built once and refreshed explicitly; `resolve` hands out value copies so
//! callers can never mutate the cached defaults through the return value.
//!
//! The command builders at the bottom are pure: profile + paths in, argv
//! out. No process is spawned here.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{HarnessError, Result};
use crate::lang::Language;

/// Resolved build/run configuration for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Compiler or interpreter executable name.
    pub toolchain: String,
    /// Separate runtime executable, where execution differs from compilation
    /// (the JVM for Java).
    pub runtime: Option<String>,
    pub flags: Vec<String>,
    /// Optimization level, without the leading dash ("O2").
    pub optimization: Option<String>,
    /// Language standard ("c++17").
    pub standard: Option<String>,
    pub needs_build: bool,
    /// Suffix convention for the build artifact; empty for suffix-less
    /// native executables on unix.
    pub artifact_suffix: String,
}

/// Partial profile supplied by the manifest; `None` fields keep the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverride {
    pub toolchain: Option<String>,
    pub runtime: Option<String>,
    pub flags: Option<Vec<String>>,
    pub optimization: Option<String>,
    pub standard: Option<String>,
}

fn builtin_profile(language: Language) -> Option<LanguageProfile> {
    match language {
        Language::Cpp => Some(LanguageProfile {
            toolchain: "g++".into(),
            runtime: None,
            flags: vec![
                "-march=native".into(),
                "-mtune=native".into(),
                "-pipe".into(),
                "-Wall".into(),
            ],
            optimization: Some("O2".into()),
            standard: Some("c++17".into()),
            needs_build: true,
            artifact_suffix: std::env::consts::EXE_SUFFIX.into(),
        }),
        Language::Python => Some(LanguageProfile {
            toolchain: "python3".into(),
            runtime: None,
            // Unbuffered output so pipelines see it immediately.
            flags: vec!["-u".into()],
            optimization: None,
            standard: None,
            needs_build: false,
            artifact_suffix: ".py".into(),
        }),
        Language::Java => Some(LanguageProfile {
            toolchain: "javac".into(),
            runtime: Some("java".into()),
            flags: vec![],
            optimization: None,
            standard: None,
            needs_build: true,
            artifact_suffix: ".class".into(),
        }),
        Language::Unknown => None,
    }
}

/// Owned, explicitly refreshable cache of merged profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    overrides: BTreeMap<String, ProfileOverride>,
    cache: HashMap<Language, LanguageProfile>,
}

impl ProfileResolver {
    pub fn new(overrides: BTreeMap<String, ProfileOverride>) -> Self {
        let mut resolver = Self {
            overrides,
            cache: HashMap::new(),
        };
        resolver.refresh();
        resolver
    }

    /// Rebuild the cache from defaults plus the current overrides.
    pub fn refresh(&mut self) {
        self.cache.clear();
        for language in Language::supported() {
            let Some(mut profile) = builtin_profile(language) else {
                continue;
            };
            if let Some(over) = self.overrides.get(language.key()) {
                if let Some(toolchain) = &over.toolchain {
                    profile.toolchain = toolchain.clone();
                }
                if let Some(runtime) = &over.runtime {
                    profile.runtime = Some(runtime.clone());
                }
                if let Some(flags) = &over.flags {
                    profile.flags = flags.clone();
                }
                if let Some(opt) = &over.optimization {
                    profile.optimization = Some(opt.clone());
                }
                if let Some(std_) = &over.standard {
                    profile.standard = Some(std_.clone());
                }
            }
            self.cache.insert(language, profile);
        }
    }

    /// Merged profile for a language, as a value copy.
    pub fn resolve(&self, language: Language) -> Result<LanguageProfile> {
        self.cache.get(&language).cloned().ok_or_else(|| {
            HarnessError::Configuration(format!(
                "no language profile for '{}'",
                language.display_name()
            ))
        })
    }
}

// ============================================================================
// Pure command builders
// ============================================================================

/// Build-step argv for a language.
///
/// For Python this is the syntax pre-flight check; interpreted sources have
/// no artifact but the orchestrator still wants a uniform command.
pub fn build_command(
    profile: &LanguageProfile,
    language: Language,
    source: &Path,
    output: Option<&Path>,
    extra_flags: Option<&[String]>,
) -> Vec<String> {
    let flags: Vec<String> = extra_flags
        .map(|f| f.to_vec())
        .unwrap_or_else(|| profile.flags.clone());

    match language {
        Language::Cpp => {
            let mut cmd = vec![profile.toolchain.clone()];
            if let Some(opt) = &profile.optimization {
                cmd.push(format!("-{}", opt));
            }
            if let Some(std_) = &profile.standard {
                cmd.push(format!("-std={}", std_));
            }
            cmd.extend(flags);
            cmd.push(source.display().to_string());
            if let Some(out) = output {
                cmd.push("-o".into());
                cmd.push(out.display().to_string());
            }
            cmd
        }
        Language::Python => {
            let mut cmd = vec![profile.toolchain.clone()];
            cmd.push("-m".into());
            cmd.push("py_compile".into());
            cmd.push(source.display().to_string());
            cmd
        }
        Language::Java => {
            let mut cmd = vec![profile.toolchain.clone()];
            cmd.extend(flags);
            if let Some(out) = output {
                // javac targets a directory, not a file.
                let dir = out.parent().unwrap_or(Path::new("."));
                cmd.push("-d".into());
                cmd.push(dir.display().to_string());
            }
            cmd.push(source.display().to_string());
            cmd
        }
        Language::Unknown => vec![],
    }
}

/// Execution argv for an artifact.
///
/// `class_name` applies to Java only; when absent it is derived from the
/// artifact's base name, and the containing directory becomes the classpath.
pub fn run_command(
    profile: &LanguageProfile,
    language: Language,
    artifact: &Path,
    class_name: Option<&str>,
) -> Vec<String> {
    match language {
        Language::Cpp => vec![artifact.display().to_string()],
        Language::Python => {
            // A separate runtime lets the pre-flight interpreter differ from
            // the executing one (python3 check, pypy run).
            let interpreter = profile
                .runtime
                .clone()
                .unwrap_or_else(|| profile.toolchain.clone());
            let mut cmd = vec![interpreter];
            cmd.extend(profile.flags.clone());
            cmd.push(artifact.display().to_string());
            cmd
        }
        Language::Java => {
            let class = class_name
                .map(str::to_string)
                .or_else(|| {
                    artifact
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_default();
            let class_dir = artifact
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            vec![
                profile.runtime.clone().unwrap_or_else(|| "java".into()),
                "-cp".into(),
                class_dir.display().to_string(),
                class,
            ]
        }
        Language::Unknown => vec![],
    }
}
