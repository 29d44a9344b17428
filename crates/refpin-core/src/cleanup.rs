//! Closed pull request cleanup
//!
//! Tracking directives such as `track: pr-123` outlive their pull request.
//! Once the pull request is closed the directive is pointed back at `main`;
//! the pinned value is left for the regular passes to move.

use crate::changes::CleanupChange;
use crate::config::EngineConfig;
use crate::docker_tag::DOCKER_IMAGE;
use crate::error::ReconcileResult;
use crate::git_ref::GIT_CONFIG;
use crate::trackable::{resolve_all, tracking_directive, TRACK_SHORTHAND};
use refpin_client::tags::pr_number_from_ref;
use refpin_client::{GitClient, PullRequest};
use refpin_yaml::blocks::{get_mapping, get_string_or_global};
use refpin_yaml::{top_level_blocks, Document, Location, ScalarHandle, TopLevelBlocks};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Branch a directive is pointed at once its pull request closes
pub const DEFAULT_BRANCH: &str = "main";

/// Sections and the tracking key each one uses
const TRACKED_SECTIONS: [(&str, &str); 2] =
    [(GIT_CONFIG, "trackMutableRef"), (DOCKER_IMAGE, "trackMutableTag")];

/// A tracking directive naming a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPrTrackable {
    /// Block name
    pub environment: String,
    /// Repository the pull request belongs to
    pub repo_url: String,
    /// Pull request number
    pub pr_number: u64,
    /// Dotted path of the directive, e.g. `dev.gitConfig.track`
    pub field: String,
    /// Scalar to overwrite
    pub tracking_handle: ScalarHandle,
    /// Position of the directive
    pub location: Location,
}

/// Web URL of a pull request
///
/// Accepts `https://host/org/repo(.git)` and `git@host:org/repo(.git)`.
#[must_use]
pub fn pull_request_url(repo_url: &str, number: u64) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let base = match trimmed.strip_prefix("git@") {
        Some(rest) => format!("https://{}", rest.replacen(':', "/", 1)),
        None => trimmed.to_string(),
    };
    format!("{base}/pull/{number}")
}

/// Find every `pr-N` tracking directive in non-frozen blocks
///
/// Directives in blocks without an effective `gitConfig.repoURL` are skipped.
///
/// # Errors
/// Structure or type errors from the surrounding sections.
pub fn discover(
    doc: &Document,
    blocks: &TopLevelBlocks<'_>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<ClosedPrTrackable>> {
    let mut found = Vec::new();
    for (environment, block) in blocks.iter() {
        if config.is_frozen(environment) {
            continue;
        }
        for (section_name, key) in TRACKED_SECTIONS {
            let Some(section) = get_mapping(doc, block, section_name)? else {
                continue;
            };
            let Some((tracking, handle)) = tracking_directive(doc, section, key)? else {
                continue;
            };
            let Some(pr_number) = pr_number_from_ref(&tracking) else {
                continue;
            };
            let repo_url = get_string_or_global(doc, block, blocks.global, GIT_CONFIG, "repoURL")?;
            let Some(repo_url) = repo_url else {
                debug!(environment, pr = pr_number, "no repoURL for pull request directive");
                continue;
            };
            let field = if section.get(key).is_some() { key } else { TRACK_SHORTHAND };
            found.push(ClosedPrTrackable {
                environment: environment.to_string(),
                repo_url,
                pr_number,
                field: section.child_path(field),
                tracking_handle: handle,
                location: doc.scalar_location(handle),
            });
        }
    }
    Ok(found)
}

/// Pull request state; failures are logged and treated as "leave unchanged"
async fn lookup(git: &dyn GitClient, t: &ClosedPrTrackable) -> Option<PullRequest> {
    match git.get_pull_request(&t.repo_url, t.pr_number).await {
        Ok(pr) => Some(pr),
        Err(err) => {
            warn!(
                environment = %t.environment,
                pr = t.pr_number,
                error = %err,
                "pull request lookup failed"
            );
            None
        }
    }
}

/// Point directives of closed pull requests back at `main`
///
/// Lookups run concurrently and never fail the pass.
///
/// # Errors
/// Discovery errors only.
pub async fn reconcile(
    doc: &mut Document,
    git: &dyn GitClient,
    file: &str,
    config: &EngineConfig,
) -> ReconcileResult<Vec<CleanupChange>> {
    let trackables = {
        let blocks = top_level_blocks(doc)?;
        discover(doc, &blocks, config)?
    };
    debug!(file, count = trackables.len(), "discovered pull request directives");

    let states = resolve_all(&trackables, config.concurrency(), |t| async move {
        Ok(lookup(git, t).await)
    })
    .await?;

    let mut seen = HashSet::new();
    let mut changes = Vec::new();
    for (t, pr) in trackables.iter().zip(states) {
        let Some(pr) = pr.filter(PullRequest::is_closed) else {
            continue;
        };
        if !doc.write_scalar(t.tracking_handle, DEFAULT_BRANCH) {
            continue;
        }
        info!(
            file,
            environment = %t.environment,
            field = %t.field,
            pr = t.pr_number,
            "pull request closed, tracking main"
        );
        if seen.insert((t.environment.clone(), t.pr_number)) {
            changes.push(CleanupChange {
                pr_number: t.pr_number,
                title: pr.title,
                url: pull_request_url(&t.repo_url, t.pr_number),
                file: file.to_string(),
                environment: t.environment.clone(),
                closed_at: pr.closed_at,
            });
        }
    }
    Ok(changes)
}
