//! Detached git worktrees as working contexts.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::AcquisitionError;
use crate::repo::RevisionRef;

/// Creates and removes detached worktrees below a scratch directory.
///
/// Worktree bookkeeping lives in the repository's git directory, so all
/// add/remove/prune calls are serialized through one lock.
#[derive(Debug)]
pub struct WorktreeManager {
    /// Directory where worktrees are created
    base_path: PathBuf,
    /// Location git commands run in
    repo_root: PathBuf,
    admin_lock: Mutex<()>,
    counter: AtomicUsize,
}

impl WorktreeManager {
    /// Create a new WorktreeManager.
    ///
    /// # Arguments
    /// * `base_path` - Directory where worktrees will be created
    /// * `repo_root` - Path to the main git repository
    pub fn new(base_path: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            repo_root: repo_root.into(),
            admin_lock: Mutex::new(()),
            counter: AtomicUsize::new(0),
        }
    }

    /// Check out `rev` into a fresh detached worktree and return its path.
    ///
    /// The worktree lands at `{base_path}/{short-id}-{n}` so the same
    /// revision can be checked out more than once.
    pub fn create(&self, rev: &RevisionRef) -> Result<PathBuf, AcquisitionError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let worktree_path = self.base_path.join(format!("{}-{}", rev.short(), n));

        std::fs::create_dir_all(&self.base_path)
            .map_err(|e| AcquisitionError::MaterializationFailed(format!("Failed to create base path: {}", e)))?;

        let output = {
            let _guard = self.lock();
            self.git(&self.repo_root)
                .arg("worktree")
                .arg("add")
                .arg("--detach")
                .arg(&worktree_path)
                .arg(rev.as_str())
                .output()
        };

        match output {
            Ok(output) if output.status.success() => Ok(worktree_path),
            Ok(output) => {
                self.discard(&worktree_path);
                Err(AcquisitionError::MaterializationFailed(format!(
                    "Failed to create worktree: {}",
                    stderr_of(&output)
                )))
            }
            Err(e) => {
                self.discard(&worktree_path);
                Err(AcquisitionError::MaterializationFailed(format!("Failed to execute git: {}", e)))
            }
        }
    }

    /// Remove a worktree created by [`create`](Self::create).
    ///
    /// The directory is deleted even when git refuses, and stale
    /// bookkeeping is pruned afterwards.
    pub fn remove(&self, worktree_path: &Path) -> Result<(), AcquisitionError> {
        let _guard = self.lock();

        let output = self
            .git(&self.repo_root)
            .args(["worktree", "remove", "--force"])
            .arg(worktree_path)
            .output()
            .map_err(|e| AcquisitionError::ReleaseFailed(format!("Failed to execute git: {}", e)))?;

        if !output.status.success() {
            log::warn!(
                "git worktree remove failed for {}: {}",
                worktree_path.display(),
                stderr_of(&output)
            );
        }

        if worktree_path.exists() {
            std::fs::remove_dir_all(worktree_path).map_err(|e| {
                AcquisitionError::ReleaseFailed(format!("Failed to delete {}: {}", worktree_path.display(), e))
            })?;
        }

        self.prune();
        Ok(())
    }

    /// Paths of registered worktrees that live under our base path.
    #[cfg(test)]
    pub fn list(&self) -> Result<Vec<PathBuf>, AcquisitionError> {
        let output = self
            .git(&self.repo_root)
            .args(["worktree", "list", "--porcelain"])
            .output()
            .map_err(|e| AcquisitionError::MaterializationFailed(format!("Failed to execute git: {}", e)))?;

        if !output.status.success() {
            return Err(AcquisitionError::MaterializationFailed(format!(
                "Failed to list worktrees: {}",
                stderr_of(&output)
            )));
        }

        let base = self.base_path.canonicalize().unwrap_or_else(|_| self.base_path.clone());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let worktrees = stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .filter(|path| {
                let path = path.canonicalize().unwrap_or_else(|_| path.clone());
                path.starts_with(&base)
            })
            .collect();

        Ok(worktrees)
    }

    /// Get the base path for worktrees.
    #[cfg(test)]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the repo root path.
    #[cfg(test)]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(dir);
        cmd
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.admin_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Best effort: a half-created worktree is removed and forgotten.
    fn discard(&self, worktree_path: &Path) {
        if worktree_path.exists() {
            let _ = std::fs::remove_dir_all(worktree_path);
        }
        let _guard = self.lock();
        self.prune();
    }

    fn prune(&self) {
        match self.git(&self.repo_root).args(["worktree", "prune"]).output() {
            Ok(output) if !output.status.success() => {
                log::warn!("git worktree prune failed: {}", stderr_of(&output));
            }
            Err(e) => log::warn!("Failed to execute git worktree prune: {}", e),
            Ok(_) => {}
        }
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
