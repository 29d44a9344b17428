//! Caching decorators for the client traits
//!
//! Each method gets its own [`FetchCache`]. Only commit/path → tree SHA
//! lookups can be exported and re-imported: they are facts about immutable
//! commits. Mutable ref resolutions live for the process only.

use crate::cache::{CacheConfig, CacheSnapshot, CacheStats, FetchCache};
use crate::error::ClientResult;
use crate::git::GitClient;
use crate::registry::RegistryClient;
use crate::types::{CommitsBetweenTags, ComparedCommit, PullRequest};
use async_trait::async_trait;

/// [`GitClient`] wrapper with memoized, single-flight calls
#[derive(Debug, Clone)]
pub struct CachingGitClient<C> {
    inner: C,
    refs: FetchCache<String>,
    trees: FetchCache<Option<String>>,
    pull_requests: FetchCache<PullRequest>,
    symlinks: FetchCache<Option<String>>,
    comparisons: FetchCache<Vec<ComparedCommit>>,
}

impl<C: GitClient> CachingGitClient<C> {
    /// Wrap a client with default capacities
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wrap a client with explicit capacities
    #[must_use]
    pub fn with_config(inner: C, config: CacheConfig) -> Self {
        Self {
            inner,
            refs: FetchCache::new("git-refs", config.ref_capacity),
            trees: FetchCache::new("git-trees", config.tree_capacity),
            pull_requests: FetchCache::new("git-pull-requests", config.default_capacity),
            symlinks: FetchCache::new("git-symlinks", config.default_capacity),
            comparisons: FetchCache::new("git-comparisons", config.default_capacity),
        }
    }

    /// Wrapped client
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Export the tree SHA cache
    pub async fn tree_snapshot(&self) -> CacheSnapshot<Option<String>> {
        self.trees.snapshot().await
    }

    /// Import a previously exported tree SHA cache
    pub async fn seed_trees(&self, snapshot: CacheSnapshot<Option<String>>) {
        self.trees.seed(snapshot).await;
    }

    /// Entry counts per cache
    pub async fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.refs.name(), self.refs.stats().await),
            (self.trees.name(), self.trees.stats().await),
            (self.pull_requests.name(), self.pull_requests.stats().await),
            (self.symlinks.name(), self.symlinks.stats().await),
            (self.comparisons.name(), self.comparisons.stats().await),
        ]
    }
}

#[async_trait]
impl<C: GitClient> GitClient for CachingGitClient<C> {
    async fn resolve_ref_to_sha(&self, repo_url: &str, git_ref: &str) -> ClientResult<String> {
        self.refs
            .get_or_fetch(
                &(repo_url, git_ref),
                self.inner.resolve_ref_to_sha(repo_url, git_ref),
            )
            .await
    }

    async fn get_tree_sha_for_path(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        self.trees
            .get_or_fetch(
                &(repo_url, commit_sha, path),
                self.inner.get_tree_sha_for_path(repo_url, commit_sha, path),
            )
            .await
    }

    async fn get_pull_request(&self, repo_url: &str, number: u64) -> ClientResult<PullRequest> {
        self.pull_requests
            .get_or_fetch(
                &(repo_url, number),
                self.inner.get_pull_request(repo_url, number),
            )
            .await
    }

    async fn get_symlink_target(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        self.symlinks
            .get_or_fetch(
                &(repo_url, commit_sha, path),
                self.inner.get_symlink_target(repo_url, commit_sha, path),
            )
            .await
    }

    async fn compare_commits(
        &self,
        repo_url: &str,
        base: &str,
        head: &str,
    ) -> ClientResult<Vec<ComparedCommit>> {
        self.comparisons
            .get_or_fetch(
                &(repo_url, base, head),
                self.inner.compare_commits(repo_url, base, head),
            )
            .await
    }
}

/// [`RegistryClient`] wrapper with memoized, single-flight calls
#[derive(Debug, Clone)]
pub struct CachingRegistryClient<C> {
    inner: C,
    equivalent_tags: FetchCache<Vec<String>>,
    commits: FetchCache<CommitsBetweenTags>,
    digests: FetchCache<String>,
    chart_versions: FetchCache<String>,
}

impl<C: RegistryClient> CachingRegistryClient<C> {
    /// Wrap a client with default capacities
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wrap a client with explicit capacities
    #[must_use]
    pub fn with_config(inner: C, config: CacheConfig) -> Self {
        let capacity = config.default_capacity;
        Self {
            inner,
            equivalent_tags: FetchCache::new("registry-equivalent-tags", capacity),
            commits: FetchCache::new("registry-commits", capacity),
            digests: FetchCache::new("registry-digests", capacity),
            chart_versions: FetchCache::new("registry-chart-versions", capacity),
        }
    }

    /// Wrapped client
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Entry counts per cache
    pub async fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.equivalent_tags.name(), self.equivalent_tags.stats().await),
            (self.commits.name(), self.commits.stats().await),
            (self.digests.name(), self.digests.stats().await),
            (self.chart_versions.name(), self.chart_versions.stats().await),
        ]
    }
}

#[async_trait]
impl<C: RegistryClient> RegistryClient for CachingRegistryClient<C> {
    async fn get_all_equivalent_tags(
        &self,
        image_repo: &str,
        tag: &str,
    ) -> ClientResult<Vec<String>> {
        self.equivalent_tags
            .get_or_fetch(
                &(image_repo, tag),
                self.inner.get_all_equivalent_tags(image_repo, tag),
            )
            .await
    }

    async fn get_git_commits_between_tags(
        &self,
        image_repo: &str,
        prev_tag: &str,
        next_tag: &str,
    ) -> ClientResult<CommitsBetweenTags> {
        self.commits
            .get_or_fetch(
                &(image_repo, prev_tag, next_tag),
                self.inner
                    .get_git_commits_between_tags(image_repo, prev_tag, next_tag),
            )
            .await
    }

    async fn get_digest_for_tag(&self, image_repo: &str, tag: &str) -> ClientResult<String> {
        self.digests
            .get_or_fetch(
                &(image_repo, tag),
                self.inner.get_digest_for_tag(image_repo, tag),
            )
            .await
    }

    async fn get_latest_chart_version(
        &self,
        chart_repo: &str,
        chart: &str,
    ) -> ClientResult<String> {
        self.chart_versions
            .get_or_fetch(
                &(chart_repo, chart),
                self.inner.get_latest_chart_version(chart_repo, chart),
            )
            .await
    }
}
