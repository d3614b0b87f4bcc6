//! Error types for revrun
//!
//! Centralized error handling using thiserror. Opening the repository,
//! resolving the range and preparing the scratch area are fatal; everything
//! that goes wrong for a single revision is recorded in its result instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The repository could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    /// No repository at or above the given location
    #[error("No git repository found at {0}")]
    NotFound(PathBuf),

    /// Something is there but it is not a usable repository
    #[error("Invalid repository at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// The revision range could not be turned into a list of revisions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// A range endpoint does not name a commit
    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    /// The start revision is not reachable from the end revision
    #[error("{start} is not an ancestor of {end}")]
    NotAncestor { start: String, end: String },

    /// The object store could not be read while walking history
    #[error("Repository error: {0}")]
    Repository(String),

    /// A path filter that does not name a location inside the repository
    #[error("Invalid filter path: {0}")]
    InvalidPath(String),
}

/// A working context could not be produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Writing this revision's tree failed
    #[error("Failed to materialize revision: {0}")]
    MaterializationFailed(String),

    /// The scratch area shared by all contexts is unusable
    #[error("Scratch directory unavailable: {0}")]
    ScratchUnavailable(String),

    /// A context could not be cleaned up
    #[error("Failed to release working context: {0}")]
    ReleaseFailed(String),
}

impl AcquisitionError {
    /// Whether this error concerns the whole run rather than one revision.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AcquisitionError::ScratchUnavailable(_))
    }
}

/// Why a command produced no normal exit status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    /// The program could not be started
    #[error("Command could not be started: {0}")]
    SpawnFailed(String),

    /// The program was terminated by a signal
    #[error("Command terminated by signal {0}")]
    Signaled(i32),

    /// The program exceeded the configured timeout and was killed
    #[error("Command timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    /// The revision could not be materialized, so nothing ran
    #[error("{0}")]
    Acquisition(AcquisitionError),
}

impl RunError {
    /// Whether the command never got to run.
    pub fn is_not_started(&self) -> bool {
        matches!(self, RunError::SpawnFailed(_) | RunError::Acquisition(_))
    }
}

/// All fatal errors that can end a run before its report is complete
#[derive(Debug, Error)]
pub enum RevrunError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// A background task died unexpectedly
    #[error("Task error: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for revrun operations
pub type Result<T> = std::result::Result<T, RevrunError>;
