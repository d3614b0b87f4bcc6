//! File configuration.
//!
//! Loaded from .revrun.yml or ~/.config/revrun/revrun.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::ContextStrategy;
use crate::orchestrator::FailurePolicy;
use crate::report::{ExitStatusPolicy, ReportFormat, ShowOutput};

/// Project config file name, looked up in the current directory.
pub const PROJECT_CONFIG: &str = ".revrun.yml";

/// File configuration for revrun.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RevrunConfig {
    /// How revisions are visited.
    pub run: RunConfig,

    /// How results are reported.
    pub report: ReportConfig,
}

impl RevrunConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .revrun.yml in current directory
    /// 3. ~/.config/revrun/revrun.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(PROJECT_CONFIG);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", PROJECT_CONFIG);
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", PROJECT_CONFIG, e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("revrun").join("revrun.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.run.jobs == 0 {
            eyre::bail!("run.jobs must be > 0");
        }
        if self.run.scratch_dir.as_ref().is_some_and(|dir| dir.as_os_str().is_empty()) {
            eyre::bail!("run.scratch-dir must not be empty");
        }
        Ok(())
    }
}

/// Run settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Keep going or stop at the first failing revision.
    #[serde(rename = "on-failure")]
    pub on_failure: FailurePolicy,

    /// Revisions visited concurrently.
    pub jobs: usize,

    /// Per-command timeout in seconds. 0 disables it.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// How each revision is materialized.
    pub strategy: ContextStrategy,

    /// Parent of the per-run scratch directory.
    #[serde(rename = "scratch-dir", skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Run the command through `sh -c`.
    pub shell: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            on_failure: FailurePolicy::Continue,
            jobs: 1,
            timeout_secs: 0,
            strategy: ContextStrategy::Export,
            scratch_dir: None,
            shell: false,
        }
    }
}

/// Report settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,

    #[serde(rename = "show-output")]
    pub show_output: ShowOutput,

    #[serde(rename = "exit-status")]
    pub exit_status: ExitStatusPolicy,

    /// Per-revision progress lines on stderr.
    pub progress: bool,
}
