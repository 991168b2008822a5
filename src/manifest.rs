//! Session manifest: the upstream contract.
//!
//! The editor (or any other host) describes a testing session as a manifest:
//! a workspace root, a role → source-file map, optional per-language profile
//! overrides, and the knobs for the requested test kind. Roles are fixed for
//! the lifetime of a session; changing a source file means building a new
//! manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{HarnessError, Result};
use crate::lang::profile::ProfileOverride;

/// Well-known role names.
pub mod roles {
    /// Produces test input on stdout.
    pub const GENERATOR: &str = "generator";
    /// Reference solution, assumed correct.
    pub const CORRECT: &str = "correct";
    /// Solution under test.
    pub const TEST: &str = "test";
    /// External validator executable source.
    pub const VALIDATOR: &str = "validator";
}

/// Everything the core needs to run one testing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub workspace_root: PathBuf,
    /// Role name → source path, relative paths resolved against the workspace.
    pub roles: BTreeMap<String, PathBuf>,
    /// Per-language overrides merged over built-in profile defaults.
    #[serde(default)]
    pub language_overrides: BTreeMap<String, ProfileOverride>,
    #[serde(default)]
    pub test_count: Option<usize>,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<f64>,
    /// Worker-pool override for test execution.
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            HarnessError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| HarnessError::Manifest(format!("{}: {}", path.display(), e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject manifests that cannot possibly bind: empty role map or sources
    /// that do not exist.
    pub fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(HarnessError::Manifest("no roles declared".into()));
        }
        for (role, _) in &self.roles {
            let path = self.role_path(role).ok_or_else(|| {
                HarnessError::Manifest(format!("role '{}' has no source path", role))
            })?;
            if !path.exists() {
                return Err(HarnessError::Manifest(format!(
                    "source for role '{}' not found: {}",
                    role,
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Source path for a role, resolved against the workspace root.
    pub fn role_path(&self, role: &str) -> Option<PathBuf> {
        let raw = self.roles.get(role)?;
        if raw.is_absolute() {
            Some(raw.clone())
        } else {
            Some(self.workspace_root.join(raw))
        }
    }

    /// Fail unless every listed role is present.
    pub fn require_roles(&self, required: &[&str]) -> Result<()> {
        for role in required {
            if !self.roles.contains_key(*role) {
                return Err(HarnessError::Manifest(format!(
                    "role '{}' is required but missing from the manifest",
                    role
                )));
            }
        }
        Ok(())
    }

    /// Capture the current content of every role source. Taken at run start
    /// so the persisted report reflects the code that actually ran.
    pub fn snapshot(&self) -> Result<FilesSnapshot> {
        let mut files = BTreeMap::new();
        for role in self.roles.keys() {
            if let Some(path) = self.role_path(role) {
                let content = fs::read_to_string(&path)?;
                files.insert(role.clone(), content);
            }
        }
        Ok(FilesSnapshot { files })
    }
}

/// Role → source-content map handed to the persistence sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesSnapshot {
    pub files: BTreeMap<String, String>,
}
