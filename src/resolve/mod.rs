//! Revision range resolution.
//!
//! Turns a start/end pair into the oldest-first list of revisions on the
//! ancestry path between them, optionally narrowed by a [`PathFilter`].

mod path_filter;

use std::collections::HashSet;

pub use path_filter::PathFilter;

use crate::error::ResolutionError;
use crate::repo::{RepositoryAccess, RevisionRef};

/// Default end of the range: whatever is checked out.
pub const DEFAULT_END: &str = "HEAD";

/// Unresolved range as given by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub start: String,
    pub end: String,
    pub path_filter: Option<PathFilter>,
}

impl RevisionRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            path_filter: None,
        }
    }

    /// Narrow the range to revisions touching `path`.
    pub fn with_path_filter(mut self, filter: Option<PathFilter>) -> Self {
        self.path_filter = filter;
        self
    }
}

/// Oldest-first, duplicate-free list of revisions to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedRevisionList(Vec<RevisionRef>);

impl OrderedRevisionList {
    pub fn revisions(&self) -> &[RevisionRef] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<RevisionRef>> for OrderedRevisionList {
    /// Builds a list from revisions already in oldest-first order,
    /// dropping repeats.
    fn from(revisions: Vec<RevisionRef>) -> Self {
        let mut seen = HashSet::new();
        Self(revisions.into_iter().filter(|r| seen.insert(r.clone())).collect())
    }
}

impl<'a> IntoIterator for &'a OrderedRevisionList {
    type Item = &'a RevisionRef;
    type IntoIter = std::slice::Iter<'a, RevisionRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Resolve `range` against `repo`.
///
/// `start` is included. The list holds `start` and every ancestor of `end`
/// that descends from `start`; branches forked before `start` are left out
/// even when merged back in later.
pub fn resolve(repo: &dyn RepositoryAccess, range: &RevisionRange) -> Result<OrderedRevisionList, ResolutionError> {
    let start = repo.resolve_revision(&range.start)?;
    let end = repo.resolve_revision(&range.end)?;
    log::debug!("Resolved {} -> {}, {} -> {}", range.start, start, range.end, end);

    let walk = repo.walk_ancestors(&end, &start)?;
    if !walk.iter().any(|node| node.id == start) {
        return Err(ResolutionError::NotAncestor {
            start: range.start.clone(),
            end: range.end.clone(),
        });
    }

    let mut on_path: HashSet<RevisionRef> = HashSet::new();
    let mut path = Vec::new();
    for node in walk {
        if node.id == start || node.parents.iter().any(|p| on_path.contains(p)) {
            on_path.insert(node.id.clone());
            path.push(node);
        }
    }

    let revisions = match &range.path_filter {
        Some(filter) => filter.apply(repo, &path)?,
        None => path.into_iter().map(|node| node.id).collect(),
    };

    log::info!("Resolved {}..{} to {} revisions", range.start, range.end, revisions.len());
    Ok(OrderedRevisionList::from(revisions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MockRepository;

    fn ids(list: &OrderedRevisionList) -> Vec<&str> {
        list.revisions().iter().map(|r| r.as_str()).collect()
    }

    fn linear() -> MockRepository {
        MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["B"])
    }

    #[test]
    fn test_linear_range_inclusive() {
        let list = resolve(&linear(), &RevisionRange::new("A", "C")).unwrap();
        assert_eq!(ids(&list), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_default_end_is_head() {
        let list = resolve(&linear(), &RevisionRange::new("B", DEFAULT_END)).unwrap();
        assert_eq!(ids(&list), vec!["B", "C"]);
    }

    #[test]
    fn test_start_equals_end() {
        let list = resolve(&linear(), &RevisionRange::new("B", "B")).unwrap();
        assert_eq!(ids(&list), vec!["B"]);
    }

    #[test]
    fn test_reversed_range_is_not_ancestor() {
        let err = resolve(&linear(), &RevisionRange::new("C", "A")).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::NotAncestor {
                start: "C".to_string(),
                end: "A".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_endpoints() {
        let err = resolve(&linear(), &RevisionRange::new("X", "C")).unwrap_err();
        assert_eq!(err, ResolutionError::UnknownRevision("X".to_string()));
        let err = resolve(&linear(), &RevisionRange::new("A", "Y")).unwrap_err();
        assert_eq!(err, ResolutionError::UnknownRevision("Y".to_string()));
    }

    #[test]
    fn test_sibling_branch_is_not_ancestor() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"]);
        let err = resolve(&repo, &RevisionRange::new("B", "C")).unwrap_err();
        assert!(matches!(err, ResolutionError::NotAncestor { .. }));
    }

    #[test]
    fn test_merge_includes_both_sides() {
        // A - B - D - E
        //  \     /
        //   - C -
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"])
            .commit("D", &["B", "C"])
            .commit("E", &["D"]);
        let list = resolve(&repo, &RevisionRange::new("A", "E")).unwrap();
        assert_eq!(ids(&list), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_merge_excludes_branch_forked_before_start() {
        // R - A - B - M
        //  \         /
        //   ---- X --
        let repo = MockRepository::new()
            .commit("R", &[])
            .commit("A", &["R"])
            .commit("X", &["R"])
            .commit("B", &["A"])
            .commit("M", &["B", "X"]);
        let list = resolve(&repo, &RevisionRange::new("A", "M")).unwrap();
        assert_eq!(ids(&list), vec!["A", "B", "M"]);
    }

    #[test]
    fn test_result_is_ordered_and_unique() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"])
            .commit("D", &["B", "C"])
            .commit("E", &["C"])
            .commit("F", &["D", "E"]);
        let list = resolve(&repo, &RevisionRange::new("A", "F")).unwrap();
        let revs = list.revisions();
        let unique: HashSet<_> = revs.iter().collect();
        assert_eq!(unique.len(), revs.len());
        // Every commit comes after all of its parents in the list.
        for (i, rev) in revs.iter().enumerate() {
            for parent in repo.parents(rev).unwrap() {
                if let Some(j) = revs.iter().position(|r| *r == parent) {
                    assert!(j < i, "{} listed before its parent {}", rev, parent);
                }
            }
        }
        assert_eq!(revs.first().unwrap().as_str(), "A");
        assert_eq!(revs.last().unwrap().as_str(), "F");
    }

    #[test]
    fn test_path_filter_narrows() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .file("src/lib.rs", "1")
            .commit("B", &["A"])
            .file("docs/x.md", "d")
            .commit("C", &["B"])
            .file("src/lib.rs", "2");
        let range = RevisionRange::new("A", "C").with_path_filter(PathFilter::new("src").unwrap());
        let list = resolve(&repo, &range).unwrap();
        assert_eq!(ids(&list), vec!["A", "C"]);
    }

    #[test]
    fn test_path_filter_start_compares_with_its_parent() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .file("src/lib.rs", "1")
            .commit("B", &["A"])
            .file("docs/x.md", "d")
            .commit("C", &["B"])
            .file("src/lib.rs", "2");
        let range = RevisionRange::new("B", "C").with_path_filter(PathFilter::new("src").unwrap());
        let list = resolve(&repo, &range).unwrap();
        assert_eq!(ids(&list), vec!["C"]);
    }

    #[test]
    fn test_path_filter_drops_merge_matching_a_parent() {
        let repo = MockRepository::new()
            .commit("A", &[])
            .commit("B", &["A"])
            .file("src/x", "1")
            .commit("C", &["A"])
            .file("docs/y.md", "d")
            .commit("D", &["B", "C"]);
        let range = RevisionRange::new("A", "D").with_path_filter(PathFilter::new("src").unwrap());
        let list = resolve(&repo, &range).unwrap();
        assert_eq!(ids(&list), vec!["B"]);
    }

    #[test]
    fn test_ordered_list_from_dedups() {
        let list = OrderedRevisionList::from(vec![
            RevisionRef::new("A"),
            RevisionRef::new("B"),
            RevisionRef::new("A"),
        ]);
        assert_eq!(ids(&list), vec!["A", "B"]);
        assert_eq!(list.len(), 2);
        assert!(!list.is_empty());
    }
}
