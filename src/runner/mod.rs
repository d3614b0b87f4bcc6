//! Command runner module - executes the user command in a working context.
//!
//! This module provides:
//! - CommandRunner for spawning the command and capturing its output
//! - CommandResult for one revision's outcome
//! - Outcome for classifying results in reports and policies

mod command;

use std::time::Duration;

use serde::Serialize;

pub use command::{CommandRunner, CommandSpec};

use crate::error::{AcquisitionError, RunError};
use crate::repo::RevisionRef;

/// Exit code recorded when the child died from a signal or was killed on timeout.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Exit code recorded when the program does not exist.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit code recorded when the program exists but could not be executed.
pub const NOT_EXECUTABLE_EXIT_CODE: i32 = 126;

/// How a revision fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Command exited with status 0
    Passed,
    /// Command ran and failed (non-zero exit, signal or timeout)
    Failed,
    /// Command could not be started
    NotStarted,
    /// Revision was never visited
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::NotStarted => "not-started",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Result of running the command against one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub revision: RevisionRef,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub error: Option<RunError>,
    pub duration: Duration,
}

impl CommandResult {
    /// Result for a revision whose context could not be materialized.
    pub fn acquisition_failed(revision: RevisionRef, error: AcquisitionError, duration: Duration) -> Self {
        Self {
            revision,
            exit_code: NOT_EXECUTABLE_EXIT_CODE,
            stdout: Vec::new(),
            stderr: Vec::new(),
            error: Some(RunError::Acquisition(error)),
            duration,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match &self.error {
            Some(error) if error.is_not_started() => Outcome::NotStarted,
            Some(_) => Outcome::Failed,
            None if self.exit_code == 0 => Outcome::Passed,
            None => Outcome::Failed,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome() == Outcome::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, error: Option<RunError>) -> CommandResult {
        CommandResult {
            revision: RevisionRef::new("abc"),
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
            error,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_outcome_passed() {
        assert_eq!(result(0, None).outcome(), Outcome::Passed);
        assert!(result(0, None).passed());
    }

    #[test]
    fn test_outcome_failed() {
        assert_eq!(result(1, None).outcome(), Outcome::Failed);
        assert_eq!(
            result(SIGNALED_EXIT_CODE, Some(RunError::Signaled(9))).outcome(),
            Outcome::Failed
        );
        assert_eq!(
            result(SIGNALED_EXIT_CODE, Some(RunError::TimedOut(Duration::from_secs(1)))).outcome(),
            Outcome::Failed
        );
    }

    #[test]
    fn test_outcome_not_started() {
        let spawn = result(NOT_FOUND_EXIT_CODE, Some(RunError::SpawnFailed("missing".to_string())));
        assert_eq!(spawn.outcome(), Outcome::NotStarted);

        let acquisition = CommandResult::acquisition_failed(
            RevisionRef::new("abc"),
            AcquisitionError::MaterializationFailed("corrupt".to_string()),
            Duration::ZERO,
        );
        assert_eq!(acquisition.outcome(), Outcome::NotStarted);
        assert!(!acquisition.passed());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::NotStarted.as_str(), "not-started");
        assert_eq!(serde_json::to_string(&Outcome::Skipped).unwrap(), "\"skipped\"");
    }
}
