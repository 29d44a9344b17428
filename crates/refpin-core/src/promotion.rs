//! Promotion engine
//!
//! A block declaring `promote.from: <source>` receives the source's pinned
//! values along a set of key paths: `promote.yamlPaths` when given,
//! otherwise whichever of `gitConfig.ref` and `dockerImage.tag` exist as
//! strings in both blocks. Blocks are promoted in dependency order so a
//! chain `dev → staging → prod` settles in one pass.

use crate::changes::{PromotionChange, PromotionInfo};
use crate::config::EngineConfig;
use crate::docker_tag::DOCKER_IMAGE;
use crate::error::{ReconcileError, ReconcileResult};
use crate::git_ref::GIT_CONFIG;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use refpin_client::{CommitsBetweenTags, GitClient, RegistryClient};
use refpin_yaml::blocks::{
    get_mapping, get_string_and_handle, get_string_at_path, get_string_or_global,
};
use refpin_yaml::{
    top_level_blocks, Document, Location, Mapping, ScalarHandle, TopLevelBlocks, YamlError,
};
use tracing::{debug, info, warn};

/// Key paths promoted when `promote.yamlPaths` is absent
pub const DEFAULT_YAML_PATHS: [[&str; 2]; 2] = [[GIT_CONFIG, "ref"], [DOCKER_IMAGE, "tag"]];

/// A block that copies values from another block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionTrackable {
    /// Target block
    pub environment: String,
    /// Source block
    pub from: String,
    /// Key paths to copy
    pub yaml_paths: Vec<Vec<String>>,
    /// Whether the paths came from `promote.yamlPaths`
    pub explicit: bool,
    /// Position of `promote.from`
    pub location: Location,
}

fn qualifies(doc: &Document, block: &Mapping, path: &[&str]) -> bool {
    matches!(get_string_at_path(doc, block, path), Ok(Some(_)))
}

fn explicit_paths(
    doc: &Document,
    environment: &str,
    promote: &Mapping,
) -> ReconcileResult<Option<Vec<Vec<String>>>> {
    let Some(node) = promote.get("yamlPaths") else {
        return Ok(None);
    };
    let path = promote.child_path("yamlPaths");
    let invalid = || {
        ReconcileError::from(YamlError::structure(
            path.clone(),
            "expected a list of key paths",
            Some(doc.node_location(node)),
        ))
    };

    let value = doc.to_value().map_err(YamlError::from)?;
    let raw = value
        .get(environment)
        .and_then(|block| block.get("promote"))
        .and_then(|promote| promote.get("yamlPaths"))
        .cloned()
        .ok_or_else(invalid)?;
    let paths: Vec<Vec<String>> = serde_yaml::from_value(raw).map_err(|_| invalid())?;
    if paths.is_empty() || paths.iter().any(Vec::is_empty) {
        return Err(invalid());
    }
    Ok(Some(paths))
}

/// Find every promotion declared by a non-frozen block
///
/// # Errors
/// `ReconcileError::Promotion` for a missing or unknown source and when no
/// path qualifies; structure errors for a malformed `promote` section.
pub fn discover(
    doc: &Document,
    blocks: &TopLevelBlocks<'_>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<PromotionTrackable>> {
    let mut found = Vec::new();
    for (environment, block) in blocks.iter() {
        if config.is_frozen(environment) {
            continue;
        }
        let Some(promote) = get_mapping(doc, block, "promote")? else {
            continue;
        };
        let (from, from_handle) = get_string_and_handle(doc, promote, "from")?
            .ok_or_else(|| ReconcileError::promotion(environment, "promote.from is not set"))?;
        let source = blocks.get(&from).ok_or_else(|| {
            ReconcileError::promotion(environment, format!("unknown source block {from}"))
        })?;

        let (yaml_paths, explicit) = match explicit_paths(doc, environment, promote)? {
            Some(paths) => (paths, true),
            None => {
                let paths: Vec<Vec<String>> = DEFAULT_YAML_PATHS
                    .iter()
                    .filter(|path| {
                        qualifies(doc, source, &path[..]) && qualifies(doc, block, &path[..])
                    })
                    .map(|path| path.iter().map(|key| (*key).to_string()).collect())
                    .collect();
                if paths.is_empty() {
                    return Err(ReconcileError::promotion(
                        environment,
                        format!(
                            "neither gitConfig.ref nor dockerImage.tag is set \
                             in both {from} and {environment}"
                        ),
                    ));
                }
                (paths, false)
            }
        };

        found.push(PromotionTrackable {
            environment: environment.to_string(),
            from,
            yaml_paths,
            explicit,
            location: doc.scalar_location(from_handle),
        });
    }
    Ok(found)
}

/// Indices of `trackables` ordered so every source is promoted into first
///
/// # Errors
/// `ReconcileError::Promotion` if `promote.from` declarations form a cycle.
pub fn promotion_order(trackables: &[PromotionTrackable]) -> ReconcileResult<Vec<usize>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for t in trackables {
        graph.add_node(t.environment.as_str());
        graph.add_edge(t.from.as_str(), t.environment.as_str(), ());
    }
    let order = toposort(&graph, None).map_err(|cycle| {
        ReconcileError::promotion(cycle.node_id(), "promote.from declarations form a cycle")
    })?;
    Ok(order
        .into_iter()
        .filter_map(|name| trackables.iter().position(|t| t.environment == name))
        .collect())
}

/// One pending copy, read from the document at processing time
#[derive(Debug)]
struct CopyPlan {
    handle: ScalarHandle,
    old_value: String,
    new_value: String,
    repo_url: Option<String>,
    dir: Option<String>,
    image_repo: Option<String>,
}

fn plan_copy(
    doc: &Document,
    t: &PromotionTrackable,
    path: &[String],
) -> ReconcileResult<Option<CopyPlan>> {
    let blocks = top_level_blocks(doc)?;
    let dotted = path.join(".");
    let (source, target) = match (blocks.get(&t.from), blocks.get(&t.environment)) {
        (Some(source), Some(target)) => (source, target),
        _ => {
            let message = "block disappeared during promotion";
            return Err(ReconcileError::promotion(&t.environment, message));
        }
    };

    let (new_value, _) = get_string_at_path(doc, source, path)?.ok_or_else(|| {
        ReconcileError::promotion(&t.environment, format!("{} has no string at {dotted}", t.from))
    })?;
    let (old_value, handle) = get_string_at_path(doc, target, path)?.ok_or_else(|| {
        let message = format!("{} has no string at {dotted}", t.environment);
        ReconcileError::promotion(&t.environment, message)
    })?;
    if old_value == new_value {
        debug!(environment = %t.environment, path = %dotted, "promoted value already current");
        return Ok(None);
    }

    let image_repo = match blocks.global {
        Some(global) => {
            get_string_at_path(doc, global, &[DOCKER_IMAGE, "repository"])?.map(|(repo, _)| repo)
        }
        None => None,
    };
    Ok(Some(CopyPlan {
        handle,
        old_value,
        new_value,
        repo_url: get_string_or_global(doc, target, blocks.global, GIT_CONFIG, "repoURL")?,
        dir: get_string_or_global(doc, target, blocks.global, GIT_CONFIG, "path")?,
        image_repo,
    }))
}

async fn git_ref_info(git: &dyn GitClient, plan: &CopyPlan) -> PromotionInfo {
    let (Some(repo), Some(dir)) = (plan.repo_url.as_deref(), plan.dir.as_deref()) else {
        return PromotionInfo::Unknown("gitConfig.repoURL or gitConfig.path is not set".to_string());
    };

    match git.get_symlink_target(repo, &plan.new_value, dir).await {
        Ok(Some(target)) => {
            return PromotionInfo::Unknown(format!("{dir} is a symlink to {target}"));
        }
        Ok(None) => {}
        Err(err) => {
            warn!(path = dir, error = %err, "symlink check failed");
            return PromotionInfo::Unknown(format!("symlink check failed: {err}"));
        }
    }

    match git.compare_commits(repo, &plan.old_value, &plan.new_value).await {
        Ok(commits) => {
            let touching: Vec<String> = commits
                .into_iter()
                .filter(|commit| commit.touches(dir))
                .map(|commit| commit.sha)
                .collect();
            if touching.is_empty() {
                PromotionInfo::NoCommits
            } else {
                PromotionInfo::Commits(touching)
            }
        }
        Err(err) => {
            warn!(error = %err, "commit comparison failed");
            PromotionInfo::Unknown(format!("cannot compare commits: {err}"))
        }
    }
}

async fn docker_tag_info(registry: Option<&dyn RegistryClient>, plan: &CopyPlan) -> PromotionInfo {
    let Some(registry) = registry else {
        return PromotionInfo::Unknown("no registry client configured".to_string());
    };
    let Some(repo) = plan.image_repo.as_deref() else {
        return PromotionInfo::Unknown("global.dockerImage.repository is not set".to_string());
    };
    match registry
        .get_git_commits_between_tags(repo, &plan.old_value, &plan.new_value)
        .await
    {
        Ok(CommitsBetweenTags::Commits(commits)) => PromotionInfo::Commits(commits),
        Ok(CommitsBetweenTags::NoCommits) => PromotionInfo::NoCommits,
        Err(err) => {
            warn!(error = %err, "commit range lookup failed");
            PromotionInfo::Unknown(format!("cannot list commits between tags: {err}"))
        }
    }
}

async fn promotion_info(
    git: &dyn GitClient,
    registry: Option<&dyn RegistryClient>,
    path: &[String],
    plan: &CopyPlan,
) -> PromotionInfo {
    let keys: Vec<&str> = path.iter().map(String::as_str).collect();
    match keys.as_slice() {
        [GIT_CONFIG, "ref"] => git_ref_info(git, plan).await,
        [DOCKER_IMAGE, "tag"] => docker_tag_info(registry, plan).await,
        _ => PromotionInfo::Unknown(format!("no history is tracked for {}", path.join("."))),
    }
}

/// Discover and carry out every promotion in the document
///
/// Values are read when each block is processed, so a block promoted into
/// earlier in the pass passes on its new values.
///
/// # Errors
/// Discovery errors, cycles, and targets or sources without a string at a path.
pub async fn reconcile(
    doc: &mut Document,
    git: &dyn GitClient,
    registry: Option<&dyn RegistryClient>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<PromotionChange>> {
    let trackables = {
        let blocks = top_level_blocks(doc)?;
        discover(doc, &blocks, config)?
    };
    let order = promotion_order(&trackables)?;
    debug!(count = trackables.len(), "discovered promotions");

    let mut changes = Vec::new();
    for t in order.into_iter().map(|idx| &trackables[idx]) {
        for path in &t.yaml_paths {
            let Some(plan) = plan_copy(doc, t, path)? else {
                continue;
            };
            let info = promotion_info(git, registry, path, &plan).await;
            if !doc.write_scalar(plan.handle, &plan.new_value) {
                continue;
            }
            info!(
                environment = %t.environment,
                from = %t.from,
                path = %path.join("."),
                old = %plan.old_value,
                new = %plan.new_value,
                "promoted value"
            );
            changes.push(PromotionChange {
                environment: t.environment.clone(),
                from: t.from.clone(),
                yaml_path: path.clone(),
                old_value: plan.old_value,
                new_value: plan.new_value,
                info,
            });
        }
    }
    Ok(changes)
}
