//! Orchestrator for visiting every revision in a resolved range.
//!
//! The Orchestrator:
//! 1. Acquires a working context for each revision
//! 2. Runs the command in it and records the result
//! 3. Releases the context before the slot is reused
//!
//! Up to `jobs` revisions are in flight at once. Results are always
//! reported in list order, whatever order they complete in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use colored::*;
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinSet};

use crate::context::ContextProvider;
use crate::error::{AcquisitionError, Result, RevrunError};
use crate::repo::RevisionRef;
use crate::report::{ReportEntry, RunReport};
use crate::resolve::OrderedRevisionList;
use crate::runner::{CommandResult, CommandRunner};

/// What to do once a revision fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Visit every revision regardless
    #[default]
    Continue,
    /// Visit nothing after the first failing revision
    #[serde(alias = "stop")]
    #[value(alias = "stop")]
    StopImmediately,
}

/// Configuration for the Orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub on_failure: FailurePolicy,
    /// Maximum revisions in flight. 1 visits them strictly in order.
    pub jobs: usize,
    /// Print a line per finished revision to stderr.
    pub progress: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            on_failure: FailurePolicy::Continue,
            jobs: 1,
            progress: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

type Visit = std::result::Result<CommandResult, AcquisitionError>;

/// Drives the acquire, run, release cycle across a revision list.
pub struct Orchestrator {
    provider: Arc<ContextProvider>,
    runner: Arc<CommandRunner>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(provider: ContextProvider, runner: CommandRunner) -> Self {
        Self {
            provider: Arc::new(provider),
            runner: Arc::new(runner),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Visit every revision and collect the report.
    pub async fn run(&self, revisions: &OrderedRevisionList) -> Result<RunReport> {
        self.run_until(revisions, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stop as soon as `shutdown` completes.
    ///
    /// In-flight commands are killed and their contexts released; the
    /// report is marked interrupted and lists unvisited revisions as
    /// skipped.
    pub async fn run_until<F>(&self, revisions: &OrderedRevisionList, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let revisions = revisions.revisions();
        let total = revisions.len();
        let jobs = self.config.jobs.max(1);
        let mut report = RunReport::new(self.runner.spec().to_string());

        log::info!(
            "Running '{}' on {} revisions ({} jobs, {:?})",
            self.runner.spec(),
            total,
            jobs,
            self.config.on_failure
        );

        let mut slots: Vec<Option<CommandResult>> = vec![None; total];
        let mut handles: HashMap<usize, AbortHandle> = HashMap::new();
        let mut tasks: JoinSet<(usize, Visit)> = JoinSet::new();
        let mut next = 0;
        // Revisions at or past this index are not part of the report.
        let mut stop_at = total;
        let mut finished = 0;

        tokio::pin!(shutdown);

        loop {
            while !report.interrupted && next < stop_at && tasks.len() < jobs {
                let index = next;
                let provider = Arc::clone(&self.provider);
                let runner = Arc::clone(&self.runner);
                let revision = revisions[index].clone();
                let handle = tasks.spawn(async move { (index, visit(provider, runner, revision).await) });
                handles.insert(index, handle);
                next += 1;
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown, if !report.interrupted => {
                    log::warn!("Interrupted, aborting {} in-flight revisions", tasks.len());
                    report.interrupted = true;
                    tasks.abort_all();
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((index, Ok(result))) => {
                            handles.remove(&index);
                            finished += 1;
                            self.record_progress(finished, total, &result);

                            if !result.passed()
                                && self.config.on_failure == FailurePolicy::StopImmediately
                                && index < stop_at
                            {
                                log::info!("Stopping after failure at {}", result.revision.short());
                                stop_at = index + 1;
                                for (later, handle) in &handles {
                                    if *later >= stop_at {
                                        handle.abort();
                                    }
                                }
                            }
                            slots[index] = Some(result);
                        }
                        Ok((index, Err(fatal))) => {
                            log::error!("Fatal error at {}: {}", revisions[index].short(), fatal);
                            drain(&mut tasks).await;
                            return Err(fatal.into());
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            drain(&mut tasks).await;
                            return Err(RevrunError::Task(e.to_string()));
                        }
                    }
                }
            }
        }

        report.entries = revisions
            .iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (revision, slot))| match slot {
                Some(result) if index < stop_at => ReportEntry::Visited(result),
                _ => ReportEntry::Skipped(revision.clone()),
            })
            .collect();

        let summary = report.summary();
        log::info!("{}", summary);
        Ok(report)
    }

    fn record_progress(&self, finished: usize, total: usize, result: &CommandResult) {
        log::info!(
            "{} {} exit {} in {:?}",
            result.revision.short(),
            result.outcome().as_str(),
            result.exit_code,
            result.duration
        );
        if self.config.progress {
            let status = if result.passed() {
                result.outcome().as_str().green()
            } else {
                result.outcome().as_str().red()
            };
            eprintln!("[{}/{}] {} {}", finished, total, result.revision.short(), status);
        }
    }
}

/// Abort whatever is left and wait for it, so every context is released.
async fn drain(tasks: &mut JoinSet<(usize, Visit)>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

/// Acquire, run and release one revision.
///
/// Only a fatal acquisition error is returned as `Err`; everything else is
/// recorded in the result.
async fn visit(provider: Arc<ContextProvider>, runner: Arc<CommandRunner>, revision: RevisionRef) -> Visit {
    let start = Instant::now();

    let acquired = {
        let provider = Arc::clone(&provider);
        let revision = revision.clone();
        tokio::task::spawn_blocking(move || provider.acquire(&revision)).await
    };
    let context = match acquired {
        Ok(Ok(context)) => context,
        Ok(Err(e)) if e.is_fatal() => return Err(e),
        Ok(Err(e)) => {
            log::warn!("Could not materialize {}: {}", revision.short(), e);
            return Ok(CommandResult::acquisition_failed(revision, e, start.elapsed()));
        }
        Err(e) => {
            let e = AcquisitionError::MaterializationFailed(e.to_string());
            return Ok(CommandResult::acquisition_failed(revision, e, start.elapsed()));
        }
    };

    let result = runner.run(&context).await;

    match tokio::task::spawn_blocking(move || context.release()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("{}", e),
        Err(e) => log::warn!("Release task for {} failed: {}", revision.short(), e),
    }
    Ok(result)
}
