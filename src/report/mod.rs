//! Run reports and their rendering.
//!
//! A [`RunReport`] is built by the orchestrator and rendered by the pure
//! functions in [`text`] and [`json`].

pub mod json;
pub mod text;

use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use json::format_json;
pub use text::{ShowOutput, TextOptions, format_text};

use crate::repo::RevisionRef;
use crate::runner::{CommandResult, Outcome};

/// Output format of the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// How the report maps to the process exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExitStatusPolicy {
    /// Exit 1 if any revision did not pass
    #[default]
    AnyFailure,
    /// Exit with the first failing command's status
    FirstFailure,
    /// Exit 0 whenever the run completed
    Never,
}

/// Exit status for an interrupted run.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_started: usize,
    pub skipped: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} revisions: {} passed, {} failed, {} not started, {} skipped",
            self.total, self.passed, self.failed, self.not_started, self.skipped
        )
    }
}

/// One revision's line in the report.
#[derive(Debug, Clone)]
pub enum ReportEntry {
    /// The revision was visited and produced a result
    Visited(CommandResult),
    /// The revision was never visited, because of a stop or an interrupt
    Skipped(RevisionRef),
}

impl ReportEntry {
    pub fn revision(&self) -> &RevisionRef {
        match self {
            ReportEntry::Visited(result) => &result.revision,
            ReportEntry::Skipped(revision) => revision,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ReportEntry::Visited(result) => result.outcome(),
            ReportEntry::Skipped(_) => Outcome::Skipped,
        }
    }

    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            ReportEntry::Visited(result) => Some(result),
            ReportEntry::Skipped(_) => None,
        }
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The command as the user gave it
    pub command: String,
    pub started_at: DateTime<Utc>,
    /// One entry per listed revision, in list order
    pub entries: Vec<ReportEntry>,
    pub interrupted: bool,
}

impl RunReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
            interrupted: false,
        }
    }

    /// Results of the visited revisions, in list order.
    pub fn results(&self) -> Vec<&CommandResult> {
        self.entries.iter().filter_map(ReportEntry::result).collect()
    }

    /// Revisions left unvisited, in list order.
    pub fn skipped(&self) -> Vec<&RevisionRef> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ReportEntry::Skipped(revision) => Some(revision),
                ReportEntry::Visited(_) => None,
            })
            .collect()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            match entry.outcome() {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::NotStarted => summary.not_started += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// First visited revision that did not pass.
    pub fn first_failure(&self) -> Option<&CommandResult> {
        self.entries.iter().filter_map(ReportEntry::result).find(|r| !r.passed())
    }

    pub fn all_passed(&self) -> bool {
        self.first_failure().is_none()
    }

    /// Process exit status for this report under `policy`.
    pub fn exit_code(&self, policy: ExitStatusPolicy) -> i32 {
        if self.interrupted {
            return INTERRUPTED_EXIT_CODE;
        }
        match (policy, self.first_failure()) {
            (ExitStatusPolicy::Never, _) | (_, None) => 0,
            (ExitStatusPolicy::AnyFailure, Some(_)) => 1,
            (ExitStatusPolicy::FirstFailure, Some(failure)) => {
                if (1..=255).contains(&failure.exit_code) {
                    failure.exit_code
                } else {
                    1
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use super::*;
    use crate::error::RunError;

    pub fn result(id: &str, exit_code: i32, error: Option<RunError>) -> CommandResult {
        CommandResult {
            revision: RevisionRef::new(id),
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
            error,
            duration: Duration::from_millis(250),
        }
    }

    pub fn mixed_report() -> RunReport {
        let mut report = RunReport::new("make test");
        report.entries.push(ReportEntry::Visited(result("aaaaaaaaaaaaaaaa", 0, None)));
        let mut failed = result("bbbbbbbbbbbbbbbb", 2, None);
        failed.stderr = b"boom\n".to_vec();
        report.entries.push(ReportEntry::Visited(failed));
        report.entries.push(ReportEntry::Visited(result(
            "cccccccccccccccc",
            127,
            Some(RunError::SpawnFailed("No such file".to_string())),
        )));
        report.entries.push(ReportEntry::Skipped(RevisionRef::new("dddddddddddddddd")));
        report
    }
}
