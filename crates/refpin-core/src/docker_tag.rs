//! `dockerImage.tag` reconciliation
//!
//! A block follows a release line (`dockerImage.trackMutableTag` or
//! `track`) and pins one immutable tag of it. Among the tags that point at
//! the same image as the mutable tag, the lexicographically smallest wins:
//! the earliest build of that content.

use crate::changes::{PinnedUpdate, UpdateKind};
use crate::config::EngineConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::trackable::{missing_field, resolve_all, tracking_directive, write_pinned};
use refpin_client::tags::{is_on_release_line, pr_number_from_ref};
use refpin_client::{ClientError, RegistryClient};
use refpin_yaml::blocks::{get_mapping, get_string_and_handle, get_string_or_global};
use refpin_yaml::{top_level_blocks, Document, Location, ScalarHandle, TopLevelBlocks};
use tracing::debug;

/// Section holding the image of a block
pub const DOCKER_IMAGE: &str = "dockerImage";

/// A `dockerImage.tag` that follows a release line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerTagTrackable {
    /// Block name
    pub environment: String,
    /// Image repository (block value or `global.dockerImage.repository`)
    pub repository: String,
    /// Release line / mutable tag being followed
    pub tracking: String,
    /// Currently pinned tag
    pub current_tag: String,
    /// Scalar to overwrite
    pub tag_handle: ScalarHandle,
    /// Position of the tracking directive
    pub location: Location,
}

/// Find every tracked `dockerImage.tag` in non-frozen blocks
///
/// # Errors
/// Structure or type errors when a tracked block lacks `tag` or `repository`.
pub fn discover(
    doc: &Document,
    blocks: &TopLevelBlocks<'_>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<DockerTagTrackable>> {
    let mut found = Vec::new();
    for (environment, block) in blocks.iter() {
        if config.is_frozen(environment) {
            continue;
        }
        let Some(image) = get_mapping(doc, block, DOCKER_IMAGE)? else {
            continue;
        };
        let Some((tracking, tracking_handle)) = tracking_directive(doc, image, "trackMutableTag")?
        else {
            continue;
        };
        let location = doc.scalar_location(tracking_handle);

        let (current_tag, tag_handle) = get_string_and_handle(doc, image, "tag")?
            .ok_or_else(|| missing_field(image, "tag", &tracking, location))?;
        let repository =
            get_string_or_global(doc, block, blocks.global, DOCKER_IMAGE, "repository")?;
        let repository = repository
            .ok_or_else(|| missing_field(image, "repository", &tracking, location))?;

        found.push(DockerTagTrackable {
            environment: environment.to_string(),
            repository,
            tracking,
            current_tag,
            tag_handle,
            location,
        });
    }
    Ok(found)
}

fn lookup_error(t: &DockerTagTrackable, err: ClientError) -> ReconcileError {
    let message = if err.is_not_found() {
        let mut message = format!("image {}:{} was not found", t.repository, t.tracking);
        if pr_number_from_ref(&t.tracking).is_some() {
            message.push_str(" (has the image build for this pull request finished?)");
        }
        message
    } else {
        format!("cannot list tags of {}:{}", t.repository, t.tracking)
    };
    ReconcileError::resolution(&t.environment, message, Some(t.location), err)
}

/// Choose the tag a tracked image should be pinned to
///
/// # Errors
/// `ReconcileError::Resolution` if the registry lookup fails or no tag of
/// the release line points at the tracked image.
pub async fn resolve(
    registry: &dyn RegistryClient,
    t: &DockerTagTrackable,
) -> ReconcileResult<String> {
    let tags = registry
        .get_all_equivalent_tags(&t.repository, &t.tracking)
        .await
        .map_err(|err| lookup_error(t, err))?;

    let mut candidates: Vec<&str> = tags
        .iter()
        .map(String::as_str)
        .filter(|tag| is_on_release_line(tag, &t.tracking))
        .collect();
    if candidates.contains(&t.current_tag.as_str()) {
        return Ok(t.current_tag.clone());
    }
    candidates.sort_unstable();
    candidates
        .first()
        .map(|tag| (*tag).to_string())
        .ok_or_else(|| {
            lookup_error(
                t,
                ClientError::not_found(format!(
                    "no {}--- tag of {} points at {}",
                    t.tracking, t.repository, t.tracking
                )),
            )
        })
}

/// Discover, resolve and write every tracked tag in the document
///
/// # Errors
/// Discovery and resolution errors.
pub async fn reconcile(
    doc: &mut Document,
    registry: &dyn RegistryClient,
    config: &EngineConfig,
) -> ReconcileResult<Vec<PinnedUpdate>> {
    let trackables = {
        let blocks = top_level_blocks(doc)?;
        discover(doc, &blocks, config)?
    };
    debug!(count = trackables.len(), "discovered tracked docker tags");

    let resolved = resolve_all(&trackables, config.concurrency(), |t| resolve(registry, t)).await?;

    let mut updates = Vec::new();
    for (t, tag) in trackables.iter().zip(resolved) {
        updates.extend(write_pinned(
            doc,
            t.tag_handle,
            &t.environment,
            UpdateKind::DockerTag,
            &tag,
        ));
    }
    Ok(updates)
}
