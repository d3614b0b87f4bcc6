//! Revrun - run a command against every revision in a git range
//!
//! Each revision in `start..=end` is materialized into its own temporary
//! directory, the command runs there, and the per-revision results are
//! collected into one ordered report.

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod repo;
pub mod report;
pub mod resolve;
pub mod runner;
pub mod session;

pub use error::{Result, RevrunError};
pub use session::Session;
