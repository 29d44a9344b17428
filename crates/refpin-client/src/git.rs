//! Source-control client interface

use crate::error::ClientResult;
use crate::types::{ComparedCommit, PullRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only view of a Git hosting service
///
/// Every method may suspend on network I/O and may fail with a transport
/// error; callers decide whether a failure is fatal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Resolve a branch, tag, short SHA or full SHA to a full commit SHA
    async fn resolve_ref_to_sha(&self, repo_url: &str, git_ref: &str) -> ClientResult<String>;

    /// Tree SHA of `path` at `commit_sha`, or `None` if the path does not exist
    async fn get_tree_sha_for_path(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>>;

    /// Pull request by number
    async fn get_pull_request(&self, repo_url: &str, number: u64) -> ClientResult<PullRequest>;

    /// Target of `path` if it is a symlink at `commit_sha`
    async fn get_symlink_target(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>>;

    /// Commits reachable from `head` but not from `base`, oldest first
    async fn compare_commits(
        &self,
        repo_url: &str,
        base: &str,
        head: &str,
    ) -> ClientResult<Vec<ComparedCommit>>;
}

#[async_trait]
impl<T: GitClient + ?Sized> GitClient for Arc<T> {
    async fn resolve_ref_to_sha(&self, repo_url: &str, git_ref: &str) -> ClientResult<String> {
        (**self).resolve_ref_to_sha(repo_url, git_ref).await
    }

    async fn get_tree_sha_for_path(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        (**self).get_tree_sha_for_path(repo_url, commit_sha, path).await
    }

    async fn get_pull_request(&self, repo_url: &str, number: u64) -> ClientResult<PullRequest> {
        (**self).get_pull_request(repo_url, number).await
    }

    async fn get_symlink_target(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        (**self).get_symlink_target(repo_url, commit_sha, path).await
    }

    async fn compare_commits(
        &self,
        repo_url: &str,
        base: &str,
        head: &str,
    ) -> ClientResult<Vec<ComparedCommit>> {
        (**self).compare_commits(repo_url, base, head).await
    }
}
