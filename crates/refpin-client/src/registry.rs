//! Container and artifact registry client interface

use crate::error::ClientResult;
use crate::types::CommitsBetweenTags;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only view of an image registry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every tag pointing at the same image version as `tag`, including `tag`
    async fn get_all_equivalent_tags(&self, image_repo: &str, tag: &str)
        -> ClientResult<Vec<String>>;

    /// Commits built between two release-line tags, `prev` exclusive, `next` inclusive
    async fn get_git_commits_between_tags(
        &self,
        image_repo: &str,
        prev_tag: &str,
        next_tag: &str,
    ) -> ClientResult<CommitsBetweenTags>;

    /// Content digest of `image:tag`
    async fn get_digest_for_tag(&self, image_repo: &str, tag: &str) -> ClientResult<String>;

    /// Latest published version of a chart
    async fn get_latest_chart_version(&self, chart_repo: &str, chart: &str)
        -> ClientResult<String>;
}

#[async_trait]
impl<T: RegistryClient + ?Sized> RegistryClient for Arc<T> {
    async fn get_all_equivalent_tags(
        &self,
        image_repo: &str,
        tag: &str,
    ) -> ClientResult<Vec<String>> {
        (**self).get_all_equivalent_tags(image_repo, tag).await
    }

    async fn get_git_commits_between_tags(
        &self,
        image_repo: &str,
        prev_tag: &str,
        next_tag: &str,
    ) -> ClientResult<CommitsBetweenTags> {
        (**self)
            .get_git_commits_between_tags(image_repo, prev_tag, next_tag)
            .await
    }

    async fn get_digest_for_tag(&self, image_repo: &str, tag: &str) -> ClientResult<String> {
        (**self).get_digest_for_tag(image_repo, tag).await
    }

    async fn get_latest_chart_version(
        &self,
        chart_repo: &str,
        chart: &str,
    ) -> ClientResult<String> {
        (**self).get_latest_chart_version(chart_repo, chart).await
    }
}
