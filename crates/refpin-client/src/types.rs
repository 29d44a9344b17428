//! Data returned by the client traits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pull request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Still open
    Open,
    /// Closed or merged
    Closed,
}

/// Pull request summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// Open or closed
    pub state: PullRequestState,
    /// Title
    pub title: String,
    /// When the PR was closed, if it was
    pub closed_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Whether the PR is closed
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == PullRequestState::Closed
    }
}

/// One commit of a compare range, with the files it touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparedCommit {
    /// Commit SHA
    pub sha: String,
    /// Paths changed by the commit
    pub files: Vec<String>,
}

impl ComparedCommit {
    /// Create new compared commit
    pub fn new(sha: impl Into<String>, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            sha: sha.into(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any touched file lives under `path`
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        let dir = path.trim_end_matches('/');
        dir.is_empty()
            || self.files.iter().any(|file| {
                file == dir
                    || file
                        .strip_prefix(dir)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

/// Commits between two image tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "commits")]
pub enum CommitsBetweenTags {
    /// Ordered commit SHAs, oldest first
    Commits(Vec<String>),
    /// Tags differ but no commit lies between them
    NoCommits,
}

impl From<Vec<String>> for CommitsBetweenTags {
    fn from(commits: Vec<String>) -> Self {
        if commits.is_empty() {
            Self::NoCommits
        } else {
            Self::Commits(commits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touches_matches_directory_prefixes_only() {
        let commit = ComparedCommit::new("abc", ["services/api/main.go", "README.md"]);
        assert!(commit.touches("services/api"));
        assert!(commit.touches("services/api/"));
        assert!(commit.touches("README.md"));
        assert!(!commit.touches("services/ap"));
        assert!(!commit.touches("services/web"));
    }

    #[test]
    fn empty_commit_lists_become_no_commits() {
        assert_eq!(CommitsBetweenTags::from(vec![]), CommitsBetweenTags::NoCommits);
        assert_eq!(
            CommitsBetweenTags::from(vec!["a".to_string()]),
            CommitsBetweenTags::Commits(vec!["a".to_string()])
        );
    }
}
