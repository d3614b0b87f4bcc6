//! Working contexts: one disposable directory per revision.
//!
//! A [`ContextProvider`] owns a per-run scratch directory and hands out
//! [`WorkingContext`]s below it. The caller's own checkout is never touched.
//! Contexts are released explicitly after the command ran; dropping an
//! unreleased context cleans it up too, so an aborted task leaves nothing
//! behind.

mod worktree;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::runtime::{Handle, RuntimeFlavor};

pub use worktree::WorktreeManager;

use crate::error::AcquisitionError;
use crate::repo::{RepositoryAccess, RevisionRef};

const SCRATCH_PREFIX: &str = "revrun-";

/// How a revision is turned into a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStrategy {
    /// Write the revision's tree into a temporary directory
    #[default]
    Export,
    /// Check the revision out into a detached git worktree
    Worktree,
}

impl fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextStrategy::Export => f.write_str("export"),
            ContextStrategy::Worktree => f.write_str("worktree"),
        }
    }
}

enum Backing {
    Export(TempDir),
    Worktree(Arc<WorktreeManager>),
}

impl Backing {
    fn release(self, path: &Path) -> Result<(), AcquisitionError> {
        match self {
            Backing::Export(dir) => dir
                .close()
                .map_err(|e| AcquisitionError::ReleaseFailed(format!("{}: {}", path.display(), e))),
            Backing::Worktree(manager) => manager.remove(path),
        }
    }
}

/// A materialized revision that commands can run in.
pub struct WorkingContext {
    revision: RevisionRef,
    path: PathBuf,
    backing: Option<Backing>,
}

impl WorkingContext {
    pub fn revision(&self) -> &RevisionRef {
        &self.revision
    }

    /// Directory holding the revision's files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the materialization.
    pub fn release(mut self) -> Result<(), AcquisitionError> {
        match self.backing.take() {
            Some(backing) => {
                log::debug!("Releasing context for {} at {}", self.revision.short(), self.path.display());
                backing.release(&self.path)
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for WorkingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingContext")
            .field("revision", &self.revision)
            .field("path", &self.path)
            .field("released", &self.backing.is_none())
            .finish()
    }
}

impl Drop for WorkingContext {
    fn drop(&mut self) {
        if let Some(backing) = self.backing.take() {
            log::debug!("Dropping unreleased context for {}", self.revision.short());
            let path = &self.path;
            let release = move || backing.release(path);
            // Removal shells out to git or walks the tree. On a multi-threaded
            // runtime the worker hands its queue off while this blocks; it must
            // still finish before the provider deletes the scratch directory.
            let result = match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(release)
                }
                _ => release(),
            };
            if let Err(e) = result {
                log::warn!("{}", e);
            }
        }
    }
}

/// Hands out isolated working contexts for one run.
pub struct ContextProvider {
    repo: Arc<dyn RepositoryAccess>,
    strategy: ContextStrategy,
    worktrees: Option<Arc<WorktreeManager>>,
    // Dropped last: every context lives inside it.
    scratch: TempDir,
}

impl fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProvider")
            .field("strategy", &self.strategy)
            .field("scratch", &self.scratch.path())
            .finish()
    }
}

impl ContextProvider {
    /// Create the run's scratch directory below `scratch_parent`
    /// (the system temp directory when `None`).
    pub fn new(
        repo: Arc<dyn RepositoryAccess>,
        strategy: ContextStrategy,
        scratch_parent: Option<&Path>,
    ) -> Result<Self, AcquisitionError> {
        let parent = scratch_parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&parent)
            .map_err(|e| AcquisitionError::ScratchUnavailable(format!("{}: {}", parent.display(), e)))?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| AcquisitionError::ScratchUnavailable(format!("{}: {}", parent.display(), e)))?;
        log::debug!("Scratch directory {} ({} strategy)", scratch.path().display(), strategy);

        let worktrees = match strategy {
            ContextStrategy::Export => None,
            ContextStrategy::Worktree => Some(Arc::new(WorktreeManager::new(
                scratch.path().join("worktrees"),
                repo.root(),
            ))),
        };

        Ok(Self {
            repo,
            strategy,
            worktrees,
            scratch,
        })
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Materialize `revision`. Blocks on filesystem and object store I/O.
    pub fn acquire(&self, revision: &RevisionRef) -> Result<WorkingContext, AcquisitionError> {
        let (path, backing) = match &self.worktrees {
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{}-", revision.short()))
                    .tempdir_in(self.scratch.path())
                    .map_err(|e| self.scratch_error(e))?;
                // On failure `dir` is dropped here, removing the partial export.
                self.repo.materialize(revision, dir.path())?;
                (dir.path().to_path_buf(), Backing::Export(dir))
            }
            Some(manager) => {
                let path = manager.create(revision)?;
                (path, Backing::Worktree(Arc::clone(manager)))
            }
        };

        log::debug!("Materialized {} at {}", revision.short(), path.display());
        Ok(WorkingContext {
            revision: revision.clone(),
            path,
            backing: Some(backing),
        })
    }

    fn scratch_error(&self, e: std::io::Error) -> AcquisitionError {
        if self.scratch.path().is_dir() {
            AcquisitionError::MaterializationFailed(e.to_string())
        } else {
            AcquisitionError::ScratchUnavailable(format!("{}: {}", self.scratch.path().display(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MockRepository;

    fn provider(repo: MockRepository, scratch: &TempDir) -> ContextProvider {
        ContextProvider::new(Arc::new(repo), ContextStrategy::Export, Some(scratch.path())).unwrap()
    }

    #[test]
    fn test_strategy_default_and_display() {
        assert_eq!(ContextStrategy::default(), ContextStrategy::Export);
        assert_eq!(ContextStrategy::Worktree.to_string(), "worktree");
    }

    #[test]
    fn test_scratch_lives_under_parent() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]), &scratch);
        assert!(provider.scratch_path().starts_with(scratch.path()));
        assert!(provider.scratch_path().exists());
    }

    #[test]
    fn test_scratch_removed_with_provider() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]), &scratch);
        let path = provider.scratch_path().to_path_buf();
        drop(provider);
        assert!(!path.exists());
    }

    #[test]
    fn test_unusable_scratch_is_fatal() {
        let scratch = TempDir::new().unwrap();
        let blocker = scratch.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let result = ContextProvider::new(
            Arc::new(MockRepository::new()),
            ContextStrategy::Export,
            Some(&blocker),
        );
        let err = result.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_acquire_and_release() {
        let scratch = TempDir::new().unwrap();
        let repo = MockRepository::new().commit("A", &[]).file("hello.txt", "world");
        let provider = provider(repo, &scratch);

        let context = provider.acquire(&RevisionRef::new("A")).unwrap();
        let path = context.path().to_path_buf();
        assert_eq!(context.revision().as_str(), "A");
        assert_eq!(std::fs::read_to_string(path.join("hello.txt")).unwrap(), "world");

        context.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_releases() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]).file("f", "x"), &scratch);

        let context = provider.acquire(&RevisionRef::new("A")).unwrap();
        let path = context.path().to_path_buf();
        drop(context);
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_inside_runtime_releases() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]).file("f", "x"), &scratch);

        let context = provider.acquire(&RevisionRef::new("A")).unwrap();
        let path = context.path().to_path_buf();
        tokio::spawn(async move { drop(context) }).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_on_current_thread_runtime_releases() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]).file("f", "x"), &scratch);

        let context = provider.acquire(&RevisionRef::new("A")).unwrap();
        let path = context.path().to_path_buf();
        drop(context);
        assert!(!path.exists());
    }

    #[test]
    fn test_contexts_are_isolated() {
        let scratch = TempDir::new().unwrap();
        let repo = MockRepository::new()
            .commit("A", &[])
            .file("v.txt", "1")
            .commit("B", &["A"])
            .file("v.txt", "2");
        let provider = provider(repo, &scratch);

        let a = provider.acquire(&RevisionRef::new("A")).unwrap();
        let b = provider.acquire(&RevisionRef::new("B")).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read_to_string(a.path().join("v.txt")).unwrap(), "1");
        assert_eq!(std::fs::read_to_string(b.path().join("v.txt")).unwrap(), "2");
        a.release().unwrap();
        b.release().unwrap();
    }

    #[test]
    fn test_vanished_scratch_is_fatal() {
        let scratch = TempDir::new().unwrap();
        let provider = provider(MockRepository::new().commit("A", &[]), &scratch);
        std::fs::remove_dir_all(provider.scratch_path()).unwrap();

        let err = provider.acquire(&RevisionRef::new("A")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_failed_acquire_leaves_nothing() {
        let scratch = TempDir::new().unwrap();
        let repo = MockRepository::new().commit("A", &[]).file("f", "x").broken("A");
        let provider = provider(repo, &scratch);

        let err = provider.acquire(&RevisionRef::new("A")).unwrap_err();
        assert!(matches!(err, AcquisitionError::MaterializationFailed(_)));
        let leftovers = std::fs::read_dir(provider.scratch_path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
