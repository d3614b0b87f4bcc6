//! Command-line overrides and the settings they produce.

use std::path::PathBuf;
use std::time::Duration;

use super::RevrunConfig;
use crate::context::ContextStrategy;
use crate::orchestrator::{FailurePolicy, OrchestratorConfig};
use crate::report::{ExitStatusPolicy, ReportFormat, ShowOutput, TextOptions};

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub on_failure: Option<FailurePolicy>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub strategy: Option<ContextStrategy>,
    pub scratch_dir: Option<PathBuf>,
    pub shell: Option<bool>,
    pub format: Option<ReportFormat>,
    pub show_output: Option<ShowOutput>,
    pub exit_status: Option<ExitStatusPolicy>,
    pub progress: Option<bool>,
}

impl CliOverrides {
    /// Create empty overrides (no overrides applied).
    pub fn none() -> Self {
        Self::default()
    }
}

/// Final settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub on_failure: FailurePolicy,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub strategy: ContextStrategy,
    pub scratch_dir: Option<PathBuf>,
    pub shell: bool,
    pub format: ReportFormat,
    pub show_output: ShowOutput,
    pub exit_status: ExitStatusPolicy,
    pub progress: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings::resolve(&RevrunConfig::default(), &CliOverrides::none())
    }
}

impl RunSettings {
    /// Merge file configuration with command-line overrides.
    pub fn resolve(config: &RevrunConfig, overrides: &CliOverrides) -> Self {
        let run = &config.run;
        let report = &config.report;
        let timeout_secs = overrides.timeout_secs.unwrap_or(run.timeout_secs);

        Self {
            on_failure: overrides.on_failure.unwrap_or(run.on_failure),
            jobs: overrides.jobs.unwrap_or(run.jobs).max(1),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            strategy: overrides.strategy.unwrap_or(run.strategy),
            scratch_dir: overrides.scratch_dir.clone().or_else(|| run.scratch_dir.clone()),
            shell: overrides.shell.unwrap_or(run.shell),
            format: overrides.format.unwrap_or(report.format),
            show_output: overrides.show_output.unwrap_or(report.show_output),
            exit_status: overrides.exit_status.unwrap_or(report.exit_status),
            progress: overrides.progress.unwrap_or(report.progress),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_failure_policy(self.on_failure)
            .with_jobs(self.jobs)
            .with_progress(self.progress)
    }

    pub fn text_options(&self) -> TextOptions {
        TextOptions {
            show_output: self.show_output,
        }
    }
}
