//! Discovered units of work
//!
//! Each reconciler discovers its trackables from the block model, resolves
//! them against the clients, then writes. Trackables own copies of the
//! values they need plus a [`ScalarHandle`] for the write, so resolution
//! never borrows the document.

use crate::changes::{PinnedUpdate, UpdateKind};
use crate::cleanup::ClosedPrTrackable;
use crate::docker_tag::DockerTagTrackable;
use crate::error::{ReconcileError, ReconcileResult};
use crate::git_ref::GitRefTrackable;
use crate::promotion::PromotionTrackable;
use crate::supergraph::SupergraphTrackable;
use futures::stream::{self, StreamExt, TryStreamExt};
use refpin_yaml::blocks::get_string_and_handle;
use refpin_yaml::{Document, Location, Mapping, ScalarHandle, YamlError, YamlResult};
use std::future::Future;

/// Shorthand accepted for both `trackMutableRef` and `trackMutableTag`
pub const TRACK_SHORTHAND: &str = "track";

/// One discovered unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trackable {
    /// `gitConfig.ref` following a branch or PR
    GitRef(GitRefTrackable),
    /// `dockerImage.tag` following a release line
    DockerTag(DockerTagTrackable),
    /// Supergraph digest following a mutable tag
    Supergraph(SupergraphTrackable),
    /// Values copied from another block
    Promotion(PromotionTrackable),
    /// Tracking directive naming a pull request
    ClosedPr(ClosedPrTrackable),
}

impl Trackable {
    /// Block the trackable belongs to
    #[must_use]
    pub fn environment(&self) -> &str {
        match self {
            Self::GitRef(t) => &t.environment,
            Self::DockerTag(t) => &t.environment,
            Self::Supergraph(t) => &t.environment,
            Self::Promotion(t) => &t.environment,
            Self::ClosedPr(t) => &t.environment,
        }
    }

    /// Short name of the variant
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GitRef(_) => "git-ref",
            Self::DockerTag(_) => "docker-tag",
            Self::Supergraph(_) => "supergraph",
            Self::Promotion(_) => "promotion",
            Self::ClosedPr(_) => "closed-pr",
        }
    }
}

/// Read a tracking directive from `key`, or from the `track` shorthand
pub(crate) fn tracking_directive(
    doc: &Document,
    section: &Mapping,
    key: &str,
) -> YamlResult<Option<(String, ScalarHandle)>> {
    match get_string_and_handle(doc, section, key)? {
        Some(found) => Ok(Some(found)),
        None => get_string_and_handle(doc, section, TRACK_SHORTHAND),
    }
}

/// Structure error for a tracked section that lacks a required `key`
pub(crate) fn missing_field(
    section: &Mapping,
    key: &str,
    tracking: &str,
    location: Location,
) -> ReconcileError {
    YamlError::structure(
        section.child_path(key),
        format!("`{tracking}` is tracked but {key} is not set"),
        Some(location),
    )
    .into()
}

/// Resolve every item with at most `limit` futures in flight
///
/// Results keep the input order; the first failure wins.
pub(crate) async fn resolve_all<'a, T, R, F, Fut>(
    items: &'a [T],
    limit: usize,
    resolve: F,
) -> ReconcileResult<Vec<R>>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = ReconcileResult<R>>,
{
    stream::iter(items.iter().map(resolve))
        .buffered(limit.max(1))
        .try_collect()
        .await
}

/// Write a pinned value and describe the change, or `None` if it was already current
pub(crate) fn write_pinned(
    doc: &mut Document,
    handle: ScalarHandle,
    environment: &str,
    kind: UpdateKind,
    new_value: &str,
) -> Option<PinnedUpdate> {
    let old_value = doc.scalar(handle).value().to_string();
    if !doc.write_scalar(handle, new_value) {
        return None;
    }
    tracing::info!(
        environment,
        kind = ?kind,
        old = %old_value,
        new = %new_value,
        "updated pinned value"
    );
    Some(PinnedUpdate {
        environment: environment.to_string(),
        kind,
        old_value,
        new_value: new_value.to_string(),
    })
}
