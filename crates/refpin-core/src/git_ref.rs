//! `gitConfig.ref` reconciliation
//!
//! A block tracks a mutable ref (`gitConfig.trackMutableRef` or `track`)
//! and pins it in `gitConfig.ref`. Resolution compares the tree SHA of
//! `gitConfig.path` across candidate commits so the pin only moves when the
//! tracked directory actually changed.

use crate::changes::{PinnedUpdate, UpdateKind};
use crate::config::EngineConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::trackable::{missing_field, resolve_all, tracking_directive, write_pinned};
use refpin_client::tags::commit_hash_from_tag;
use refpin_client::{ClientError, GitClient};
use refpin_yaml::blocks::{get_mapping, get_string, get_string_and_handle, get_string_or_global};
use refpin_yaml::{top_level_blocks, Document, Location, ScalarHandle, TopLevelBlocks};
use tracing::{debug, warn};

/// Section holding the Git source of a block
pub const GIT_CONFIG: &str = "gitConfig";

/// A `gitConfig.ref` that follows a mutable ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRefTrackable {
    /// Block name
    pub environment: String,
    /// Repository (block value or `global.gitConfig.repoURL`)
    pub repo_url: String,
    /// Directory whose tree SHA decides whether the pin moves
    pub path: String,
    /// Branch or ref being followed
    pub tracking: String,
    /// Currently pinned value
    pub current_ref: String,
    /// `dockerImage.tag` of the same block, read after the tag pass
    pub docker_tag: Option<String>,
    /// Scalar to overwrite
    pub ref_handle: ScalarHandle,
    /// Position of the tracking directive
    pub location: Location,
}

/// Why a ref resolved to the value it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefDecision {
    /// The pin still held the tracked ref name
    Bootstrap,
    /// The pin already is the tracked commit
    AlreadyCurrent,
    /// The commit built into the block's Docker tag has the tracked tree
    MatchesDockerTag,
    /// The pinned commit already has the tracked tree
    PathUnchanged,
    /// The tracked directory changed; follow the tracked commit
    PathChanged,
}

/// Value chosen for a ref trackable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Commit SHA to pin
    pub sha: String,
    /// Reason for the choice
    pub decision: RefDecision,
}

impl ResolvedRef {
    fn new(sha: impl Into<String>, decision: RefDecision) -> Self {
        Self {
            sha: sha.into(),
            decision,
        }
    }
}

/// Find every tracked `gitConfig.ref` in non-frozen blocks
///
/// # Errors
/// Structure or type errors when a tracked block lacks `ref`, `repoURL` or `path`.
pub fn discover(
    doc: &Document,
    blocks: &TopLevelBlocks<'_>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<GitRefTrackable>> {
    let mut found = Vec::new();
    for (environment, block) in blocks.iter() {
        if config.is_frozen(environment) {
            continue;
        }
        let Some(git) = get_mapping(doc, block, GIT_CONFIG)? else {
            continue;
        };
        let Some((tracking, tracking_handle)) = tracking_directive(doc, git, "trackMutableRef")?
        else {
            continue;
        };
        let location = doc.scalar_location(tracking_handle);

        let (current_ref, ref_handle) = get_string_and_handle(doc, git, "ref")?
            .ok_or_else(|| missing_field(git, "ref", &tracking, location))?;
        let repo_url = get_string_or_global(doc, block, blocks.global, GIT_CONFIG, "repoURL")?
            .ok_or_else(|| missing_field(git, "repoURL", &tracking, location))?;
        let path = get_string_or_global(doc, block, blocks.global, GIT_CONFIG, "path")?
            .ok_or_else(|| missing_field(git, "path", &tracking, location))?;
        let docker_tag = match get_mapping(doc, block, "dockerImage")? {
            Some(docker) => get_string(doc, docker, "tag")?,
            None => None,
        };

        found.push(GitRefTrackable {
            environment: environment.to_string(),
            repo_url,
            path,
            tracking,
            current_ref,
            docker_tag,
            ref_handle,
            location,
        });
    }
    Ok(found)
}

/// Tree SHA of a candidate commit; failures count as "no match"
async fn candidate_tree(git: &dyn GitClient, t: &GitRefTrackable, commit: &str) -> Option<String> {
    match git.get_tree_sha_for_path(&t.repo_url, commit, &t.path).await {
        Ok(tree) => tree,
        Err(err) => {
            warn!(
                environment = %t.environment,
                commit,
                path = %t.path,
                error = %err,
                "candidate tree lookup failed"
            );
            None
        }
    }
}

/// Full SHA and tree SHA of the commit named by the block's Docker tag
async fn docker_candidate(git: &dyn GitClient, t: &GitRefTrackable) -> Option<(String, String)> {
    let short = t.docker_tag.as_deref().and_then(commit_hash_from_tag)?;
    let sha = match git.resolve_ref_to_sha(&t.repo_url, short).await {
        Ok(sha) => sha,
        Err(err) => {
            warn!(
                environment = %t.environment,
                commit = short,
                error = %err,
                "commit from docker tag does not resolve"
            );
            return None;
        }
    };
    let tree = candidate_tree(git, t, &sha).await?;
    Some((sha, tree))
}

/// Decide which commit a tracked ref should be pinned to
///
/// # Errors
/// `ReconcileError::Resolution` if the tracked ref or its tree cannot be resolved.
pub async fn resolve(git: &dyn GitClient, t: &GitRefTrackable) -> ReconcileResult<ResolvedRef> {
    let tracked_sha = git
        .resolve_ref_to_sha(&t.repo_url, &t.tracking)
        .await
        .map_err(|err| {
            ReconcileError::resolution(
                &t.environment,
                format!("cannot resolve {} in {}", t.tracking, t.repo_url),
                Some(t.location),
                err,
            )
        })?;

    if t.current_ref == t.tracking {
        return Ok(ResolvedRef::new(tracked_sha, RefDecision::Bootstrap));
    }
    if t.current_ref == tracked_sha {
        return Ok(ResolvedRef::new(tracked_sha, RefDecision::AlreadyCurrent));
    }

    let (tracked_tree, current_tree, docker) = futures::join!(
        git.get_tree_sha_for_path(&t.repo_url, &tracked_sha, &t.path),
        candidate_tree(git, t, &t.current_ref),
        docker_candidate(git, t),
    );
    let tracked_tree = tracked_tree
        .and_then(|tree| {
            tree.ok_or_else(|| ClientError::not_found(format!("{} at {tracked_sha}", t.path)))
        })
        .map_err(|err| {
            ReconcileError::resolution(
                &t.environment,
                format!("cannot read tree of {} at {tracked_sha}", t.path),
                Some(t.location),
                err,
            )
        })?;

    if let Some((docker_sha, docker_tree)) = docker {
        if docker_tree == tracked_tree {
            return Ok(ResolvedRef::new(docker_sha, RefDecision::MatchesDockerTag));
        }
    }
    if current_tree.as_deref() == Some(tracked_tree.as_str()) {
        return Ok(ResolvedRef::new(t.current_ref.clone(), RefDecision::PathUnchanged));
    }
    Ok(ResolvedRef::new(tracked_sha, RefDecision::PathChanged))
}

/// Discover, resolve and write every tracked ref in the document
///
/// Nothing is written unless every trackable resolves.
///
/// # Errors
/// Discovery and resolution errors.
pub async fn reconcile(
    doc: &mut Document,
    git: &dyn GitClient,
    config: &EngineConfig,
) -> ReconcileResult<Vec<PinnedUpdate>> {
    let trackables = {
        let blocks = top_level_blocks(doc)?;
        discover(doc, &blocks, config)?
    };
    debug!(count = trackables.len(), "discovered tracked git refs");

    let resolved = resolve_all(&trackables, config.concurrency(), |t| resolve(git, t)).await?;

    let mut updates = Vec::new();
    for (t, choice) in trackables.iter().zip(resolved) {
        debug!(
            environment = %t.environment,
            tracking = %t.tracking,
            decision = ?choice.decision,
            "resolved git ref"
        );
        updates.extend(write_pinned(
            doc,
            t.ref_handle,
            &t.environment,
            UpdateKind::GitRef,
            &choice.sha,
        ));
    }
    Ok(updates)
}
