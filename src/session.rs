//! One invocation, end to end: open, resolve, visit, report.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RunSettings;
use crate::context::ContextProvider;
use crate::error::{Result, RevrunError};
use crate::orchestrator::Orchestrator;
use crate::repo::{GitRepository, RepositoryAccess};
use crate::report::RunReport;
use crate::resolve::{OrderedRevisionList, RevisionRange, resolve};
use crate::runner::{CommandRunner, CommandSpec};

/// Everything needed to run a command across a revision range.
#[derive(Debug, Clone)]
pub struct Session {
    /// Where to look for the repository (discovered upward)
    pub repo_path: PathBuf,
    pub range: RevisionRange,
    pub command: CommandSpec,
    pub settings: RunSettings,
}

impl Session {
    pub fn new(repo_path: impl Into<PathBuf>, range: RevisionRange, command: CommandSpec) -> Self {
        Self {
            repo_path: repo_path.into(),
            range,
            command,
            settings: RunSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.run_until(std::future::pending()).await
    }

    /// Run, stopping early once `shutdown` completes.
    ///
    /// Opening the repository, resolving the range and creating the scratch
    /// area all happen before any command runs; failures there are returned
    /// as errors.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let repo: Arc<dyn RepositoryAccess> = Arc::new(GitRepository::open(&self.repo_path)?);
        let revisions = resolve_blocking(Arc::clone(&repo), self.range.clone()).await?;

        let provider = ContextProvider::new(repo, self.settings.strategy, self.settings.scratch_dir.as_deref())?;
        let runner = CommandRunner::new(self.command.clone().with_shell(self.settings.shell))
            .with_timeout(self.settings.timeout);

        Orchestrator::new(provider, runner)
            .with_config(self.settings.orchestrator_config())
            .run_until(&revisions, shutdown)
            .await
    }
}

async fn resolve_blocking(repo: Arc<dyn RepositoryAccess>, range: RevisionRange) -> Result<OrderedRevisionList> {
    let resolved = tokio::task::spawn_blocking(move || resolve(repo.as_ref(), &range))
        .await
        .map_err(|e| RevrunError::Task(e.to_string()))??;
    Ok(resolved)
}
