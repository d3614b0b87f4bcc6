//! Repository access.
//!
//! Everything revrun knows about a repository goes through the
//! [`RepositoryAccess`] trait: resolving names, reading parent links,
//! looking up path contents and writing a revision's tree to disk.
//! [`GitRepository`] backs it with git2; [`MockRepository`] is an in-memory
//! graph for tests.

mod git;
mod mock;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::{AcquisitionError, ResolutionError};

pub use git::GitRepository;
pub use mock::MockRepository;

/// Identifier of one resolved revision (a full commit hash for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RevisionRef(String);

impl RevisionRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in reports and directory names.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A commit together with its parent links, as produced by a history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode {
    pub id: RevisionRef,
    pub parents: Vec<RevisionRef>,
}

enum Visit {
    Enter(RevisionRef),
    Exit(CommitNode),
}

/// Read access to a repository's commit graph and trees.
pub trait RepositoryAccess: Send + Sync {
    /// Resolve a symbolic name or hash to a commit.
    fn resolve_revision(&self, name: &str) -> Result<RevisionRef, ResolutionError>;

    /// Parents of a commit, first parent first.
    fn parents(&self, rev: &RevisionRef) -> Result<Vec<RevisionRef>, ResolutionError>;

    /// Object id of `path` inside the revision's tree, `None` if absent.
    /// An empty path names the root tree.
    fn path_id(&self, rev: &RevisionRef, path: &Path) -> Result<Option<String>, ResolutionError>;

    /// Write the revision's tree into `destination`, which must exist.
    fn materialize(&self, rev: &RevisionRef, destination: &Path) -> Result<(), AcquisitionError>;

    /// Location git commands should run in for this repository.
    fn root(&self) -> &Path;

    /// Walk ancestors of `from`, not expanding past `stop`.
    ///
    /// Commits come out parents-before-children. First parents are explored
    /// before merge parents, so the order is stable for a given graph.
    fn walk_ancestors(&self, from: &RevisionRef, stop: &RevisionRef) -> Result<Vec<CommitNode>, ResolutionError> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![Visit::Enter(from.clone())];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Exit(node) => order.push(node),
                Visit::Enter(rev) => {
                    if !seen.insert(rev.clone()) {
                        continue;
                    }
                    let parents = if rev == *stop { Vec::new() } else { self.parents(&rev)? };
                    let pending: Vec<RevisionRef> = parents.iter().filter(|p| !seen.contains(*p)).cloned().collect();
                    stack.push(Visit::Exit(CommitNode { id: rev, parents }));
                    for parent in pending.into_iter().rev() {
                        stack.push(Visit::Enter(parent));
                    }
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let rev = RevisionRef::new("0123456789abcdef0123");
        assert_eq!(rev.short(), "0123456789ab");
        assert_eq!(RevisionRef::new("abc").short(), "abc");
    }

    #[test]
    fn test_display() {
        let rev = RevisionRef::new("deadbeef");
        assert_eq!(rev.to_string(), "deadbeef");
        assert_eq!(rev.as_str(), "deadbeef");
    }

    #[test]
    fn test_walk_linear_is_oldest_first() {
        let repo = MockRepository::new().commit("A", &[]).commit("B", &["A"]).commit("C", &["B"]);
        let walked = repo
            .walk_ancestors(&RevisionRef::new("C"), &RevisionRef::new("A"))
            .unwrap();
        let ids: Vec<&str> = walked.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_walk_stops_at_stop() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["B"]);
        let walked = repo
            .walk_ancestors(&RevisionRef::new("C"), &RevisionRef::new("B"))
            .unwrap();
        let ids: Vec<&str> = walked.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!(walked[0].parents.is_empty());
    }

    #[test]
    fn test_walk_merge_visits_each_commit_once() {
        // A - B - D
        //  \     /
        //   - C -
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"])
            .commit("D", &["B", "C"]);
        let walked = repo
            .walk_ancestors(&RevisionRef::new("D"), &RevisionRef::new("A"))
            .unwrap();
        let ids: Vec<&str> = walked.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
    }
}
