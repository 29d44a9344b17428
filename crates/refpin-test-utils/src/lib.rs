//! Testing utilities for refpin workspace
//!
//! In-memory Git and registry clients with call counters, plus tracing setup.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use refpin_client::tags::{commits_between_tags, TaggedImage};
use refpin_client::{
    ClientError, ClientResult, CommitsBetweenTags, ComparedCommit, GitClient, PullRequest,
    RegistryClient,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const REPO_URL: &str = "https://github.com/example/monorepo.git";
pub const IMAGE_REPO: &str = "registry.example.com/services/api";

/// Route logs to the test harness; `RUST_LOG` overrides the default level
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Deterministic 40-character commit SHA for a label
pub fn sha(label: &str) -> String {
    let hex: String = label.bytes().map(|b| format!("{b:02x}")).collect();
    format!("{hex:0<40}")
}

#[derive(Debug, Default)]
struct CallLog {
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CallLog {
    fn record(&self, method: &'static str) {
        *self.counts.lock().entry(method).or_default() += 1;
    }

    fn get(&self, method: &str) -> usize {
        self.counts.lock().get(method).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

async fn pause(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// In-memory [`GitClient`]
#[derive(Debug, Default)]
pub struct FakeGitClient {
    refs: HashMap<(String, String), String>,
    trees: HashMap<(String, String, String), String>,
    pull_requests: HashMap<(String, u64), ClientResult<PullRequest>>,
    symlinks: HashMap<(String, String, String), String>,
    comparisons: HashMap<(String, String, String), Vec<ComparedCommit>>,
    failing: HashSet<&'static str>,
    latency: Option<Duration>,
    calls: CallLog,
}

impl FakeGitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_ref(mut self, repo: &str, git_ref: &str, sha: &str) -> Self {
        self.refs
            .insert((repo.to_string(), git_ref.to_string()), sha.to_string());
        self
    }

    pub fn with_tree(mut self, repo: &str, commit: &str, path: &str, tree: &str) -> Self {
        self.trees.insert(
            (repo.to_string(), commit.to_string(), path.to_string()),
            tree.to_string(),
        );
        self
    }

    pub fn with_pull_request(mut self, repo: &str, pr: PullRequest) -> Self {
        self.pull_requests.insert((repo.to_string(), pr.number), Ok(pr));
        self
    }

    pub fn with_pull_request_error(mut self, repo: &str, number: u64, err: ClientError) -> Self {
        self.pull_requests.insert((repo.to_string(), number), Err(err));
        self
    }

    pub fn with_symlink(mut self, repo: &str, commit: &str, path: &str, target: &str) -> Self {
        self.symlinks.insert(
            (repo.to_string(), commit.to_string(), path.to_string()),
            target.to_string(),
        );
        self
    }

    pub fn with_comparison(
        mut self,
        repo: &str,
        base: &str,
        head: &str,
        commits: Vec<ComparedCommit>,
    ) -> Self {
        self.comparisons.insert(
            (repo.to_string(), base.to_string(), head.to_string()),
            commits,
        );
        self
    }

    /// Make every call to `method` fail with a transport error
    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    /// Number of calls made to `method`
    pub fn calls(&self, method: &str) -> usize {
        self.calls.get(method)
    }

    /// Number of calls made to any method
    pub fn total_calls(&self) -> usize {
        self.calls.total()
    }

    async fn enter(&self, method: &'static str) -> ClientResult<()> {
        self.calls.record(method);
        pause(self.latency).await;
        if self.failing.contains(method) {
            return Err(ClientError::transport(format!("{method} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl GitClient for FakeGitClient {
    async fn resolve_ref_to_sha(&self, repo_url: &str, git_ref: &str) -> ClientResult<String> {
        self.enter("resolve_ref_to_sha").await?;
        self.refs
            .get(&(repo_url.to_string(), git_ref.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("ref {git_ref} in {repo_url}")))
    }

    async fn get_tree_sha_for_path(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        self.enter("get_tree_sha_for_path").await?;
        Ok(self
            .trees
            .get(&(repo_url.to_string(), commit_sha.to_string(), path.to_string()))
            .cloned())
    }

    async fn get_pull_request(&self, repo_url: &str, number: u64) -> ClientResult<PullRequest> {
        self.enter("get_pull_request").await?;
        self.pull_requests
            .get(&(repo_url.to_string(), number))
            .cloned()
            .unwrap_or_else(|| Err(ClientError::not_found(format!("pull request {number}"))))
    }

    async fn get_symlink_target(
        &self,
        repo_url: &str,
        commit_sha: &str,
        path: &str,
    ) -> ClientResult<Option<String>> {
        self.enter("get_symlink_target").await?;
        Ok(self
            .symlinks
            .get(&(repo_url.to_string(), commit_sha.to_string(), path.to_string()))
            .cloned())
    }

    async fn compare_commits(
        &self,
        repo_url: &str,
        base: &str,
        head: &str,
    ) -> ClientResult<Vec<ComparedCommit>> {
        self.enter("compare_commits").await?;
        Ok(self
            .comparisons
            .get(&(repo_url.to_string(), base.to_string(), head.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory [`RegistryClient`] backed by a tag → image version table
#[derive(Debug, Default)]
pub struct FakeRegistryClient {
    images: HashMap<String, Vec<TaggedImage>>,
    charts: HashMap<(String, String), String>,
    failing: HashSet<&'static str>,
    latency: Option<Duration>,
    calls: CallLog,
}

impl FakeRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Point `tag` of `repo` at image `version`; the version doubles as digest
    pub fn with_image(mut self, repo: &str, tag: &str, version: &str) -> Self {
        let images = self.images.entry(repo.to_string()).or_default();
        images.retain(|image| image.tag != tag);
        images.push(TaggedImage::new(tag, version));
        self
    }

    pub fn with_chart(mut self, repo: &str, chart: &str, version: &str) -> Self {
        self.charts
            .insert((repo.to_string(), chart.to_string()), version.to_string());
        self
    }

    /// Make every call to `method` fail with a transport error
    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    /// Number of calls made to `method`
    pub fn calls(&self, method: &str) -> usize {
        self.calls.get(method)
    }

    /// Number of calls made to any method
    pub fn total_calls(&self) -> usize {
        self.calls.total()
    }

    async fn enter(&self, method: &'static str) -> ClientResult<()> {
        self.calls.record(method);
        pause(self.latency).await;
        if self.failing.contains(method) {
            return Err(ClientError::transport(format!("{method} failed")));
        }
        Ok(())
    }

    fn version_of(&self, repo: &str, tag: &str) -> ClientResult<&str> {
        self.images
            .get(repo)
            .and_then(|images| images.iter().find(|image| image.tag == tag))
            .map(|image| image.version.as_str())
            .ok_or_else(|| ClientError::not_found(format!("{repo}:{tag}")))
    }
}

#[async_trait]
impl RegistryClient for FakeRegistryClient {
    async fn get_all_equivalent_tags(
        &self,
        image_repo: &str,
        tag: &str,
    ) -> ClientResult<Vec<String>> {
        self.enter("get_all_equivalent_tags").await?;
        let version = self.version_of(image_repo, tag)?;
        Ok(self.images[image_repo]
            .iter()
            .filter(|image| image.version == version)
            .map(|image| image.tag.clone())
            .collect())
    }

    async fn get_git_commits_between_tags(
        &self,
        image_repo: &str,
        prev_tag: &str,
        next_tag: &str,
    ) -> ClientResult<CommitsBetweenTags> {
        self.enter("get_git_commits_between_tags").await?;
        let images = self.images.get(image_repo).map_or(&[][..], Vec::as_slice);
        Ok(commits_between_tags(prev_tag, next_tag, images).into())
    }

    async fn get_digest_for_tag(&self, image_repo: &str, tag: &str) -> ClientResult<String> {
        self.enter("get_digest_for_tag").await?;
        self.version_of(image_repo, tag).map(str::to_string)
    }

    async fn get_latest_chart_version(
        &self,
        chart_repo: &str,
        chart: &str,
    ) -> ClientResult<String> {
        self.enter("get_latest_chart_version").await?;
        self.charts
            .get(&(chart_repo.to_string(), chart.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("chart {chart}")))
    }
}
