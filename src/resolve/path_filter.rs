//! Content path filter for narrowing a revision range.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::ResolutionError;
use crate::repo::{CommitNode, RepositoryAccess, RevisionRef};

/// A repository-relative path whose changes select revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    path: PathBuf,
}

impl PathFilter {
    /// Build a filter, or `None` when the path selects the whole tree.
    ///
    /// `./src/` and `src` are the same filter; `""` and `.` filter nothing.
    /// Absolute paths and paths climbing out with `..` are rejected.
    pub fn new(path: impl AsRef<Path>) -> Result<Option<Self>, ResolutionError> {
        let given = path.as_ref();
        let mut normalized = PathBuf::new();
        for component in given.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                    return Err(ResolutionError::InvalidPath(given.display().to_string()));
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self { path: normalized }))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the commits whose content under the path differs from their
    /// parents'.
    ///
    /// A single-parent commit is kept when it differs from that parent. A
    /// merge is dropped when it matches any one of its parents. A root
    /// commit is kept when the path exists in it.
    pub fn apply(&self, repo: &dyn RepositoryAccess, walk: &[CommitNode]) -> Result<Vec<RevisionRef>, ResolutionError> {
        let mut ids: HashMap<RevisionRef, Option<String>> = HashMap::new();
        let mut path_id = |rev: &RevisionRef| -> Result<Option<String>, ResolutionError> {
            if let Some(id) = ids.get(rev) {
                return Ok(id.clone());
            }
            let id = repo.path_id(rev, &self.path)?;
            ids.insert(rev.clone(), id.clone());
            Ok(id)
        };

        let mut kept = Vec::new();
        for node in walk {
            // The walk records no parents for the commit it stopped at.
            let parents = if node.parents.is_empty() {
                repo.parents(&node.id)?
            } else {
                node.parents.clone()
            };

            let current = path_id(&node.id)?;
            let mut same_as_parent = false;
            for parent in &parents {
                if path_id(parent)? == current {
                    same_as_parent = true;
                    break;
                }
            }

            let touched = if parents.is_empty() {
                current.is_some()
            } else {
                !same_as_parent
            };
            if touched {
                kept.push(node.id.clone());
            }
        }

        log::debug!(
            "Path filter {} kept {} of {} revisions",
            self.path.display(),
            kept.len(),
            walk.len()
        );
        Ok(kept)
    }
}

impl fmt::Display for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
