//! In-memory repository for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{RepositoryAccess, RevisionRef};
use crate::error::{AcquisitionError, ResolutionError};

#[derive(Debug, Clone, Default)]
struct MockCommit {
    parents: Vec<RevisionRef>,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

/// Commit graph built in memory with a fluent builder.
///
/// Each new commit starts from its first parent's files; `file` and
/// `remove` edit the most recently added commit. `HEAD` resolves to the
/// most recently added commit.
#[derive(Debug, Clone)]
pub struct MockRepository {
    commits: HashMap<String, MockCommit>,
    head: Option<String>,
    broken: HashSet<String>,
    root: PathBuf,
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            commits: HashMap::new(),
            head: None,
            broken: HashSet::new(),
            root: PathBuf::from("."),
        }
    }

    /// Add a commit with the given parents.
    pub fn commit(mut self, id: &str, parents: &[&str]) -> Self {
        let files = parents
            .first()
            .and_then(|p| self.commits.get(*p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        let commit = MockCommit {
            parents: parents.iter().map(|p| RevisionRef::new(*p)).collect(),
            files,
        };
        self.commits.insert(id.to_string(), commit);
        self.head = Some(id.to_string());
        self
    }

    /// Set a file in the most recent commit.
    pub fn file(mut self, path: &str, content: &str) -> Self {
        if let Some(commit) = self.head.as_ref().and_then(|h| self.commits.get_mut(h)) {
            commit.files.insert(PathBuf::from(path), content.as_bytes().to_vec());
        }
        self
    }

    /// Delete a file from the most recent commit.
    pub fn remove(mut self, path: &str) -> Self {
        if let Some(commit) = self.head.as_ref().and_then(|h| self.commits.get_mut(h)) {
            commit.files.remove(Path::new(path));
        }
        self
    }

    /// Make materialization of `id` fail.
    pub fn broken(mut self, id: &str) -> Self {
        self.broken.insert(id.to_string());
        self
    }

    fn lookup(&self, rev: &RevisionRef) -> Result<&MockCommit, ResolutionError> {
        self.commits
            .get(rev.as_str())
            .ok_or_else(|| ResolutionError::Repository(format!("missing commit {}", rev)))
    }
}

impl RepositoryAccess for MockRepository {
    fn resolve_revision(&self, name: &str) -> Result<RevisionRef, ResolutionError> {
        let id = if name == "HEAD" { self.head.as_deref() } else { Some(name) };
        match id {
            Some(id) if self.commits.contains_key(id) => Ok(RevisionRef::new(id)),
            _ => Err(ResolutionError::UnknownRevision(name.to_string())),
        }
    }

    fn parents(&self, rev: &RevisionRef) -> Result<Vec<RevisionRef>, ResolutionError> {
        Ok(self.lookup(rev)?.parents.clone())
    }

    fn path_id(&self, rev: &RevisionRef, path: &Path) -> Result<Option<String>, ResolutionError> {
        let commit = self.lookup(rev)?;
        let matching: Vec<String> = commit
            .files
            .iter()
            .filter(|(file, _)| file.starts_with(path))
            .map(|(file, content)| format!("{}={}", file.display(), String::from_utf8_lossy(content)))
            .collect();
        if matching.is_empty() {
            Ok(None)
        } else {
            Ok(Some(matching.join(";")))
        }
    }

    fn materialize(&self, rev: &RevisionRef, destination: &Path) -> Result<(), AcquisitionError> {
        if self.broken.contains(rev.as_str()) {
            return Err(AcquisitionError::MaterializationFailed(format!("corrupt commit {}", rev)));
        }
        let commit = self
            .lookup(rev)
            .map_err(|e| AcquisitionError::MaterializationFailed(e.to_string()))?;
        for (file, content) in &commit.files {
            let target = destination.join(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| AcquisitionError::MaterializationFailed(e.to_string()))?;
            }
            fs::write(&target, content).map_err(|e| AcquisitionError::MaterializationFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
