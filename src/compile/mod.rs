//! Parallel compilation orchestrator.
//!
//! A [`CompileSession`] binds a manifest to compilation units (one per role),
//! decides which units are stale, and builds the stale ones on a bounded
//! worker pool in a background thread. Staleness is mtime-based: a unit is
//! stale when its artifact is missing or older than its source. Interpreted
//! roles have no artifact and are never stale, but every pass still runs
//! their syntax pre-flight through the same build contract.
//!
//! [`compile_all`] returns a joinable [`CompileHandle`] instead of blocking;
//! progress streams over the event channel while the caller does other work.
//!
//! [`compile_all`]: CompileSession::compile_all

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::errors::{HarnessError, Result};
use crate::events::{emit_compile, CompileEvent, CompileEvents, Severity};
use crate::lang::profile::ProfileResolver;
use crate::lang::toolchain::{toolchain_for, Toolchain};
use crate::lang::{self, Language};
use crate::manifest::Manifest;

/// Upper bound on a single build step.
const BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// One role bound to its source, language, and artifact location.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub role: String,
    pub source_path: PathBuf,
    pub language: Language,
    pub artifact_path: PathBuf,
}

/// A manifest bound for compilation.
pub struct CompileSession {
    units: Vec<CompilationUnit>,
    toolchains: HashMap<Language, Box<dyn Toolchain>>,
}

impl CompileSession {
    /// Detect each role's language, resolve its toolchain, and compute its
    /// artifact path. Roles whose language cannot be determined are rejected
    /// here, before anything runs.
    pub fn bind(manifest: &Manifest) -> Result<Self> {
        let resolver = ProfileResolver::new(manifest.language_overrides.clone());
        let mut units = Vec::with_capacity(manifest.roles.len());
        let mut toolchains: HashMap<Language, Box<dyn Toolchain>> = HashMap::new();

        for role in manifest.roles.keys() {
            let source_path = manifest.role_path(role).ok_or_else(|| {
                HarnessError::Manifest(format!("role '{}' has no source path", role))
            })?;
            let content = std::fs::read_to_string(&source_path).ok();
            let language = lang::detect(&source_path, content.as_deref());
            if language == Language::Unknown {
                return Err(HarnessError::Configuration(format!(
                    "cannot determine language for role '{}' ({})",
                    role,
                    source_path.display()
                )));
            }

            if !toolchains.contains_key(&language) {
                let profile = resolver.resolve(language)?;
                toolchains.insert(language, toolchain_for(language, profile)?);
            }
            let artifact_path = toolchains[&language].artifact_path(&source_path);

            units.push(CompilationUnit {
                role: role.clone(),
                source_path,
                language,
                artifact_path,
            });
        }

        Ok(Self { units, toolchains })
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn unit(&self, role: &str) -> Option<&CompilationUnit> {
        self.units.iter().find(|u| u.role == role)
    }

    fn toolchain(&self, language: Language) -> &dyn Toolchain {
        // bind() inserted a toolchain for every unit's language.
        self.toolchains[&language].as_ref()
    }

    /// Argv that runs a bound role's artifact.
    pub fn run_command(&self, role: &str) -> Result<Vec<String>> {
        let unit = self.unit(role).ok_or_else(|| {
            HarnessError::Manifest(format!("role '{}' is not bound in this session", role))
        })?;
        Ok(self
            .toolchain(unit.language)
            .run_command(&unit.artifact_path, None))
    }

    /// Stale means: the language builds an artifact AND the artifact is
    /// missing or older than the source. Interpreted units are never stale.
    pub fn needs_rebuild(&self, unit: &CompilationUnit) -> bool {
        if !self.toolchain(unit.language).needs_build() {
            return false;
        }
        let artifact_mtime = match mtime(&unit.artifact_path) {
            Some(t) => t,
            None => return true,
        };
        match mtime(&unit.source_path) {
            Some(source_mtime) => source_mtime > artifact_mtime,
            // Unreadable source mtime: rebuild and let the compiler complain.
            None => true,
        }
    }

    /// Build everything that needs it, in the background.
    ///
    /// Emits per-role `Progress` events and exactly one terminal `Finished`,
    /// where `success` is the AND over attempted builds. Stale units all run
    /// to completion; one failure never cancels its siblings. When nothing
    /// needs work the pass is an immediate no-op success.
    pub fn compile_all(self: &Arc<Self>, events: CompileEvents) -> CompileHandle {
        let session = Arc::clone(self);
        let handle = thread::spawn(move || session.compile_pass(&events));
        CompileHandle { handle }
    }

    fn compile_pass(&self, events: &CompileEvents) -> bool {
        // Roles may share a source (and therefore an artifact); building the
        // same artifact from two workers at once would race, so each artifact
        // is claimed by the first role that needs it.
        let mut claimed: HashMap<&Path, &str> = HashMap::new();
        let mut work: Vec<&CompilationUnit> = Vec::new();
        for unit in &self.units {
            let interpreted = !self.toolchain(unit.language).needs_build();
            if interpreted || self.needs_rebuild(unit) {
                if let Some(owner) = claimed.get(unit.artifact_path.as_path()) {
                    emit_compile(
                        events,
                        format!("{} shares the build of {}", unit.role, owner),
                        Severity::Info,
                    );
                    continue;
                }
                claimed.insert(unit.artifact_path.as_path(), unit.role.as_str());
                work.push(unit);
            } else {
                emit_compile(
                    events,
                    format!("{} is up to date", unit.role),
                    Severity::Info,
                );
            }
        }

        if work.is_empty() {
            tracing::debug!("nothing to compile");
            let _ = events.send(CompileEvent::Finished { success: true });
            return true;
        }

        let parallelism = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let workers = work.len().min(parallelism.max(1));
        tracing::info!(stale = work.len(), workers, "compiling");

        let (tx, rx) = mpsc::channel::<&CompilationUnit>();
        for &unit in &work {
            // The receiver outlives this loop; send cannot fail here.
            let _ = tx.send(unit);
        }
        drop(tx);
        let jobs = Mutex::new(rx);
        let failures = Mutex::new(0usize);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let unit = {
                        let guard = jobs.lock().unwrap_or_else(|e| e.into_inner());
                        match guard.recv() {
                            Ok(unit) => unit,
                            Err(_) => break,
                        }
                    };
                    if !self.build_one(unit, events) {
                        *failures.lock().unwrap_or_else(|e| e.into_inner()) += 1;
                    }
                });
            }
        });

        let success = *failures.lock().unwrap_or_else(|e| e.into_inner()) == 0;
        let _ = events.send(CompileEvent::Finished { success });
        success
    }

    fn build_one(&self, unit: &CompilationUnit, events: &CompileEvents) -> bool {
        let toolchain = self.toolchain(unit.language);
        let output = toolchain.needs_build().then(|| unit.artifact_path.as_path());
        let outcome = toolchain.build(&unit.source_path, output, None, BUILD_TIMEOUT);
        if outcome.ok {
            emit_compile(
                events,
                format!("{}: {}", unit.role, outcome.message),
                Severity::Success,
            );
        } else {
            tracing::warn!(role = %unit.role, "build failed");
            emit_compile(
                events,
                format!("{}: {}", unit.role, outcome.message),
                Severity::Error,
            );
        }
        outcome.ok
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Joinable handle to a background compilation pass.
pub struct CompileHandle {
    handle: thread::JoinHandle<bool>,
}

impl CompileHandle {
    /// Block until the pass finishes; `true` means every build succeeded.
    pub fn wait(self) -> bool {
        match self.handle.join() {
            Ok(success) => success,
            // A panicking build worker is a harness bug, not a build failure.
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::profile::ProfileOverride;
    use std::collections::BTreeMap;
    use std::fs;

    fn manifest(dir: &Path, roles: &[(&str, &str, &str)]) -> Manifest {
        let mut map = BTreeMap::new();
        for (role, name, content) in roles {
            fs::write(dir.join(name), content).unwrap();
            map.insert(role.to_string(), PathBuf::from(name));
        }
        Manifest {
            workspace_root: dir.to_path_buf(),
            roles: map,
            language_overrides: BTreeMap::new(),
            test_count: None,
            time_limit_ms: None,
            memory_limit_mb: None,
            max_workers: None,
        }
    }

    fn override_cpp(m: &mut Manifest, toolchain: &str) {
        m.language_overrides.insert(
            "cpp".into(),
            ProfileOverride {
                toolchain: Some(toolchain.into()),
                flags: Some(vec![]),
                ..Default::default()
            },
        );
    }

    fn drain(rx: mpsc::Receiver<CompileEvent>) -> (Vec<(String, Severity)>, Vec<bool>) {
        let mut progress = Vec::new();
        let mut finished = Vec::new();
        for event in rx.try_iter() {
            match event {
                CompileEvent::Progress { message, severity } => progress.push((message, severity)),
                CompileEvent::Finished { success } => finished.push(success),
            }
        }
        (progress, finished)
    }

    #[test]
    fn bind_rejects_unknown_languages() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest(dir.path(), &[("test", "notes.txt", "plain prose")]);
        assert!(matches!(
            CompileSession::bind(&m),
            Err(HarnessError::Configuration(_))
        ));
    }

    #[test]
    fn bind_computes_artifact_paths() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest(
            dir.path(),
            &[("generator", "gen.py", "print(1)"), ("test", "sol.cpp", "int main(){}")],
        );
        let session = CompileSession::bind(&m).unwrap();
        let gen = session.unit("generator").unwrap();
        assert_eq!(gen.language, Language::Python);
        assert_eq!(gen.artifact_path, gen.source_path);
        let sol = session.unit("test").unwrap();
        assert_eq!(sol.language, Language::Cpp);
        assert_ne!(sol.artifact_path, sol.source_path);
    }

    #[test]
    fn missing_artifact_is_stale_and_interpreted_never_is() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest(
            dir.path(),
            &[("generator", "gen.py", "print(1)"), ("test", "sol.cpp", "int main(){}")],
        );
        let session = CompileSession::bind(&m).unwrap();
        assert!(session.needs_rebuild(session.unit("test").unwrap()));
        assert!(!session.needs_rebuild(session.unit("generator").unwrap()));
    }

    #[test]
    fn fresh_artifact_is_not_stale_until_source_changes() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest(dir.path(), &[("test", "sol.cpp", "int main(){}")]);
        let session = CompileSession::bind(&m).unwrap();
        let unit = session.unit("test").unwrap().clone();

        fs::write(&unit.artifact_path, "artifact").unwrap();
        let now = SystemTime::now();
        fs::File::options()
            .write(true)
            .open(&unit.source_path)
            .unwrap()
            .set_modified(now - Duration::from_secs(60))
            .unwrap();
        fs::File::options()
            .write(true)
            .open(&unit.artifact_path)
            .unwrap()
            .set_modified(now)
            .unwrap();
        assert!(!session.needs_rebuild(&unit));

        fs::File::options()
            .write(true)
            .open(&unit.source_path)
            .unwrap()
            .set_modified(now + Duration::from_secs(60))
            .unwrap();
        assert!(session.needs_rebuild(&unit));
    }

    #[cfg(unix)]
    #[test]
    fn one_failure_does_not_cancel_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manifest(
            dir.path(),
            &[("generator", "gen.py", "print(1)"), ("test", "sol.cpp", "int main(){}")],
        );
        // Broken compiler for the C++ role; the Python pre-flight still runs.
        override_cpp(&mut m, "false");
        let session = Arc::new(CompileSession::bind(&m).unwrap());

        let (tx, rx) = mpsc::channel();
        assert!(!session.compile_all(tx).wait());

        let (progress, finished) = drain(rx);
        assert_eq!(finished, vec![false]);
        assert!(progress
            .iter()
            .any(|(msg, sev)| msg.starts_with("test:") && *sev == Severity::Error));
        assert!(progress
            .iter()
            .any(|(msg, sev)| msg.starts_with("generator:") && *sev == Severity::Success));
    }

    #[cfg(unix)]
    #[test]
    fn second_pass_is_a_no_op_for_fresh_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manifest(dir.path(), &[("test", "sol.cpp", "int main(){}")]);
        // "true" exits 0 without producing anything; create the artifact by
        // hand so the second pass sees it fresh.
        override_cpp(&mut m, "true");
        let session = Arc::new(CompileSession::bind(&m).unwrap());
        let unit = session.unit("test").unwrap().clone();

        let (tx, rx) = mpsc::channel();
        assert!(session.compile_all(tx).wait());
        drop(rx);

        fs::write(&unit.artifact_path, "artifact").unwrap();
        let now = SystemTime::now();
        fs::File::options()
            .write(true)
            .open(&unit.source_path)
            .unwrap()
            .set_modified(now - Duration::from_secs(60))
            .unwrap();
        fs::File::options()
            .write(true)
            .open(&unit.artifact_path)
            .unwrap()
            .set_modified(now)
            .unwrap();

        let (tx, rx) = mpsc::channel();
        assert!(session.compile_all(tx).wait());
        let (progress, finished) = drain(rx);
        assert_eq!(finished, vec![true]);
        assert!(progress.iter().all(|(msg, _)| msg.contains("up to date")));
    }

    #[cfg(unix)]
    #[test]
    fn shared_source_builds_its_artifact_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut m = manifest(dir.path(), &[("correct", "sol.cpp", "int main(){}")]);
        // Second role, same source file, same artifact.
        m.roles.insert("test".into(), PathBuf::from("sol.cpp"));

        // Compiler stand-in that tallies its invocations.
        let counter = dir.path().join("invocations");
        let cc = dir.path().join("cc.sh");
        fs::write(&cc, format!("#!/bin/sh\necho run >> {}\n", counter.display())).unwrap();
        fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();
        override_cpp(&mut m, cc.to_str().unwrap());

        let session = Arc::new(CompileSession::bind(&m).unwrap());
        let (tx, rx) = mpsc::channel();
        assert!(session.compile_all(tx).wait());

        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
        let (progress, finished) = drain(rx);
        assert_eq!(finished, vec![true]);
        assert!(progress
            .iter()
            .any(|(msg, sev)| msg.contains("shares the build") && *sev == Severity::Info));
    }

    #[test]
    fn empty_stale_set_finishes_immediately() {
        // An empty role map never gets past Manifest::validate, but an empty
        // unit list must still terminate cleanly.
        let session = Arc::new(CompileSession {
            units: vec![],
            toolchains: HashMap::new(),
        });
        let (tx, rx) = mpsc::channel();
        assert!(session.compile_all(tx).wait());
        let (_, finished) = drain(rx);
        assert_eq!(finished, vec![true]);
    }
}
