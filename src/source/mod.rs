//! # Source Fetcher
//!
//! Produces immutable snapshots of the files committed at the tip of a branch.
//!
//! The production implementation is [`GitCliFetcher`], which shells out to
//! `git`. The [`SourceFetcher`] trait is the seam the snapshot cache and the
//! reconciliation engine depend on.

mod git;

pub use git::GitCliFetcher;

use crate::constants::PRIMARY_BRANCH_NAME;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Branch selection for a fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchRef {
    /// Whatever branch the remote's `HEAD` points at
    Default,
    /// An explicitly named branch
    Named(String),
}

impl BranchRef {
    /// Resolve the declared branch name.
    ///
    /// Empty input and any spelling of the primary branch name select the
    /// repository's default branch.
    #[must_use]
    pub fn parse(branch: &str) -> Self {
        let branch = branch.trim();
        if branch.is_empty() || branch.eq_ignore_ascii_case(PRIMARY_BRANCH_NAME) {
            Self::Default
        } else {
            Self::Named(branch.to_string())
        }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("<default>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Repository location plus branch. Identifies a snapshot in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub repository: String,
    pub reference: BranchRef,
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.reference)
    }
}

/// Files of one commit, keyed by repository-relative path (`/` separated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub commit: String,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    #[must_use]
    pub fn new(commit: impl Into<String>, files: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            commit: commit.into(),
            files,
        }
    }

    /// Files in ascending path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The repository or branch could not be reached
    #[error("source {key} unavailable: {message}")]
    Unavailable { key: SourceKey, message: String },
    /// Clone succeeded but HEAD or its tree could not be read
    #[error("cannot resolve history of {key}: {message}")]
    History { key: SourceKey, message: String },
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the tip of `key.reference` from `key.repository`
    async fn fetch(&self, key: &SourceKey) -> Result<Snapshot, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_branch_selects_default() {
        assert_eq!(BranchRef::parse(""), BranchRef::Default);
        assert_eq!(BranchRef::parse("   "), BranchRef::Default);
    }

    #[test]
    fn test_primary_branch_is_case_insensitive() {
        assert_eq!(BranchRef::parse("master"), BranchRef::Default);
        assert_eq!(BranchRef::parse("Master"), BranchRef::Default);
        assert_eq!(BranchRef::parse("MASTER"), BranchRef::Default);
    }

    #[test]
    fn test_other_names_are_explicit_branches() {
        assert_eq!(
            BranchRef::parse("release/1.2"),
            BranchRef::Named("release/1.2".to_string())
        );
        assert_eq!(BranchRef::parse("main"), BranchRef::Named("main".to_string()));
    }

    #[test]
    fn test_snapshot_iterates_in_path_order() {
        let mut files = BTreeMap::new();
        files.insert("z.yaml".to_string(), b"z".to_vec());
        files.insert("a/b.yaml".to_string(), b"b".to_vec());
        files.insert("a.yaml".to_string(), b"a".to_vec());
        let snapshot = Snapshot::new("abc", files);

        let paths: Vec<&str> = snapshot.files().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["a.yaml", "a/b.yaml", "z.yaml"]);
    }
}
