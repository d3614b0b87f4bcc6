//! git2-backed repository access.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use git2::{ErrorCode, ObjectType, Oid, Repository, Tree};

use super::{RepositoryAccess, RevisionRef};
use crate::error::{AcquisitionError, OpenError, ResolutionError};

#[cfg(unix)]
const MODE_EXECUTABLE: i32 = 0o100755;
#[cfg(unix)]
const MODE_SYMLINK: i32 = 0o120000;

/// A local git repository opened through git2.
///
/// Graph reads share one handle behind a mutex. Materialization opens its
/// own handle so several revisions can be exported at once.
pub struct GitRepository {
    repo: Mutex<Repository>,
    git_dir: PathBuf,
    root: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("git_dir", &self.git_dir)
            .field("root", &self.root)
            .finish()
    }
}

impl GitRepository {
    /// Open the repository containing `path`, searching upward like git does.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => OpenError::NotFound(path.to_path_buf()),
            _ => OpenError::Invalid {
                path: path.to_path_buf(),
                reason: e.message().to_string(),
            },
        })?;

        let git_dir = repo.path().to_path_buf();
        let root = repo.workdir().map(Path::to_path_buf).unwrap_or_else(|| git_dir.clone());
        log::debug!("Opened repository {} (git dir {})", root.display(), git_dir.display());

        Ok(Self {
            repo: Mutex::new(repo),
            git_dir,
            root,
        })
    }

    fn handle(&self) -> MutexGuard<'_, Repository> {
        // A panic while holding the lock leaves the handle itself intact.
        self.repo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn oid(rev: &RevisionRef) -> Result<Oid, git2::Error> {
        Oid::from_str(rev.as_str())
    }
}

fn repo_error(e: git2::Error) -> ResolutionError {
    ResolutionError::Repository(e.message().to_string())
}

fn materialize_error(e: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::MaterializationFailed(e.to_string())
}

impl RepositoryAccess for GitRepository {
    fn resolve_revision(&self, name: &str) -> Result<RevisionRef, ResolutionError> {
        let repo = self.handle();
        let commit = repo
            .revparse_single(name)
            .and_then(|object| object.peel_to_commit())
            .map_err(|e| {
                log::debug!("Failed to resolve {}: {}", name, e.message());
                ResolutionError::UnknownRevision(name.to_string())
            })?;
        Ok(RevisionRef::new(commit.id().to_string()))
    }

    fn parents(&self, rev: &RevisionRef) -> Result<Vec<RevisionRef>, ResolutionError> {
        let repo = self.handle();
        let commit = Self::oid(rev).and_then(|oid| repo.find_commit(oid)).map_err(repo_error)?;
        Ok(commit.parent_ids().map(|id| RevisionRef::new(id.to_string())).collect())
    }

    fn path_id(&self, rev: &RevisionRef, path: &Path) -> Result<Option<String>, ResolutionError> {
        let repo = self.handle();
        let tree = Self::oid(rev)
            .and_then(|oid| repo.find_commit(oid))
            .and_then(|commit| commit.tree())
            .map_err(repo_error)?;

        if path.as_os_str().is_empty() {
            return Ok(Some(tree.id().to_string()));
        }

        match tree.get_path(path) {
            Ok(entry) => Ok(Some(entry.id().to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(repo_error(e)),
        }
    }

    fn materialize(&self, rev: &RevisionRef, destination: &Path) -> Result<(), AcquisitionError> {
        let repo = Repository::open(&self.git_dir).map_err(materialize_error)?;
        let tree = Self::oid(rev)
            .and_then(|oid| repo.find_commit(oid))
            .and_then(|commit| commit.tree())
            .map_err(materialize_error)?;
        write_tree(&repo, &tree, destination)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Recursively write a tree's entries below `dir`.
fn write_tree(repo: &Repository, tree: &Tree<'_>, dir: &Path) -> Result<(), AcquisitionError> {
    for entry in tree.iter() {
        let target = dir.join(entry_name(entry.name_bytes()));

        match entry.kind() {
            Some(ObjectType::Tree) => {
                let subtree = repo.find_tree(entry.id()).map_err(materialize_error)?;
                fs::create_dir_all(&target).map_err(materialize_error)?;
                write_tree(repo, &subtree, &target)?;
            }
            Some(ObjectType::Blob) => {
                let blob = repo.find_blob(entry.id()).map_err(materialize_error)?;
                write_blob(&target, blob.content(), entry.filemode())?;
            }
            // Submodule: leave an empty directory where git would.
            Some(ObjectType::Commit) => {
                fs::create_dir_all(&target).map_err(materialize_error)?;
            }
            other => {
                log::warn!("Skipping tree entry {} of kind {:?}", target.display(), other);
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn entry_name(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn entry_name(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(unix)]
fn write_blob(target: &Path, content: &[u8], mode: i32) -> Result<(), AcquisitionError> {
    use std::os::unix::fs::{PermissionsExt, symlink};

    if mode == MODE_SYMLINK {
        return symlink(entry_name(content), target).map_err(materialize_error);
    }

    fs::write(target, content).map_err(materialize_error)?;
    if mode == MODE_EXECUTABLE {
        fs::set_permissions(target, fs::Permissions::from_mode(0o755)).map_err(materialize_error)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_blob(target: &Path, content: &[u8], _mode: i32) -> Result<(), AcquisitionError> {
    // Without symlink support the link target is written as file content.
    fs::write(target, content).map_err(materialize_error)
}
