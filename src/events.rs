//! Downstream event surface and persistence sink.
//!
//! The core never talks to a UI. Compilation and test runs emit typed events
//! over plain `mpsc` channels; the host application subscribes to whichever
//! ends it cares about. Finished runs are handed to a [`RunSink`], which
//! decides storage format and lifetime (the bundled [`JsonReportSink`] writes
//! a JSON report into the workspace).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use serde::Serialize;
use serde_json::json;

use crate::errors::Result;
use crate::manifest::FilesSnapshot;
use crate::runner::{TestRecord, TestRunSummary};

/// Severity attached to progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Events emitted by a compilation pass.
///
/// A pass emits zero or more `Progress` events and exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum CompileEvent {
    Progress { message: String, severity: Severity },
    Finished { success: bool },
}

/// Events emitted by a test run.
///
/// `TestStarted`/`TestCompleted` fire per completed unit, in completion
/// order; `RunCompleted` fires exactly once, whether the run finished or was
/// canceled.
#[derive(Debug, Clone)]
pub enum RunEvent {
    TestStarted { completed: usize, total: usize },
    TestCompleted(TestRecord),
    RunCompleted { all_passed: bool },
}

/// Channel handed to `compile_all`.
pub type CompileEvents = Sender<CompileEvent>;

/// Channel handed to `TestRunner::run`.
pub type RunEvents = Sender<RunEvent>;

pub(crate) fn emit_compile(events: &CompileEvents, message: impl Into<String>, severity: Severity) {
    // A dropped receiver just means nobody is listening.
    let _ = events.send(CompileEvent::Progress {
        message: message.into(),
        severity,
    });
}

// ============================================================================
// Persistence sink
// ============================================================================

/// Contract for the persistence collaborator.
///
/// The core hands over the finalized summary, a snapshot of the role sources
/// as they were when the run started, and (for runs with failed differential
/// tests) a structured mismatch payload. What happens to them afterwards is
/// not the core's business.
pub trait RunSink {
    fn record_run(
        &self,
        summary: &TestRunSummary,
        snapshot: &FilesSnapshot,
        mismatch_payload: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// Sink that writes a single pretty-printed JSON report per run.
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    /// Report lands at `<workspace>/<kind>/run_report.json`.
    pub fn new(workspace: &Path, kind: &str) -> Self {
        Self {
            path: workspace.join(kind).join("run_report.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunSink for JsonReportSink {
    fn record_run(
        &self,
        summary: &TestRunSummary,
        snapshot: &FilesSnapshot,
        mismatch_payload: Option<serde_json::Value>,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let report = json!({
            "summary": summary,
            "files": snapshot,
            "mismatch_analysis": mismatch_payload,
        });
        fs::write(&self.path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %self.path.display(), "run report written");
        Ok(())
    }
}

/// Aggregate the mismatch analyses of failed differential tests into one
/// payload, mirroring what the persistence layer expects.
pub fn mismatch_payload(summary: &TestRunSummary) -> Option<serde_json::Value> {
    let failed: Vec<&TestRecord> = summary
        .records
        .iter()
        .filter(|r| !r.passed && r.mismatch.is_some())
        .collect();
    if failed.is_empty() {
        return None;
    }
    let tests: Vec<serde_json::Value> = failed
        .iter()
        .map(|r| {
            json!({
                "test_number": r.test_number,
                "analysis": r.mismatch,
            })
        })
        .collect();
    Some(json!({
        "total_failed": failed.len(),
        "failed_tests": tests,
    }))
}
