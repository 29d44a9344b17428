//! Per-file orchestration
//!
//! Runs the passes over one values file in a fixed order and serializes the
//! result:
//!
//! ```text
//! cleanup? → docker tags → git refs → supergraph digests → promotion? → serialize
//! ```
//!
//! Any error aborts the file before serialization, so a half-updated
//! document is never returned.

use crate::changes::{FileChanges, FileOutcome};
use crate::config::EngineConfig;
use crate::error::ReconcileResult;
use crate::trackable::Trackable;
use crate::{cleanup, docker_tag, git_ref, promotion, supergraph};
use refpin_client::{GitClient, RegistryClient};
use refpin_yaml::{parse, top_level_blocks, Document};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Reconciles values files against Git and an optional registry
#[derive(Clone)]
pub struct Engine {
    git: Arc<dyn GitClient>,
    registry: Option<Arc<dyn RegistryClient>>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create new engine without a registry
    #[inline]
    #[must_use]
    pub fn new(git: Arc<dyn GitClient>, config: EngineConfig) -> Self {
        Self {
            git,
            registry: None,
            config,
        }
    }

    /// With a registry client, enabling the docker tag and supergraph passes
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile one file
    ///
    /// Text without a document comes back unchanged.
    ///
    /// # Errors
    /// Parse, structure and resolution errors, and invalid promotions.
    pub async fn reconcile(&self, file: &str, text: &str) -> ReconcileResult<FileOutcome> {
        let span = tracing::info_span!("reconcile", file);
        async {
            let mut yaml = parse(text).map_err(refpin_yaml::YamlError::from)?;
            let Some(doc) = yaml.document_mut() else {
                debug!("empty file");
                return Ok(FileOutcome {
                    output: text.to_string(),
                    changes: FileChanges::default(),
                });
            };

            let changes = self.run_passes(doc, file).await?;
            let output = yaml.serialize();
            if !changes.is_empty() {
                info!(
                    updates = changes.updates.len(),
                    promotions = changes.promotions.len(),
                    cleanups = changes.cleanups.len(),
                    "file reconciled"
                );
            }
            Ok(FileOutcome { output, changes })
        }
        .instrument(span)
        .await
    }

    async fn run_passes(&self, doc: &mut Document, file: &str) -> ReconcileResult<FileChanges> {
        let config = &self.config;
        let git = self.git.as_ref();
        let registry = self.registry.as_deref();
        let mut changes = FileChanges::default();

        if config.cleanup_closed_prs {
            changes.cleanups = cleanup::reconcile(doc, git, file, config).await?;
        }
        match registry {
            Some(registry) => {
                changes.updates.extend(docker_tag::reconcile(doc, registry, config).await?);
            }
            None => debug!("no registry client, skipping docker tags"),
        }
        changes.updates.extend(git_ref::reconcile(doc, git, config).await?);
        match registry {
            Some(registry) => {
                changes.updates.extend(supergraph::reconcile(doc, registry, config).await?);
            }
            None => debug!("no registry client, skipping supergraph digests"),
        }
        if config.promote {
            changes.promotions = promotion::reconcile(doc, git, registry, config).await?;
        }
        Ok(changes)
    }

    /// Discover what a reconciliation would look at, without any lookups
    ///
    /// # Errors
    /// Parse, structure and promotion declaration errors.
    pub fn plan(&self, text: &str) -> ReconcileResult<Vec<Trackable>> {
        let yaml = parse(text).map_err(refpin_yaml::YamlError::from)?;
        let Some(doc) = yaml.document() else {
            return Ok(Vec::new());
        };
        let blocks = top_level_blocks(doc)?;
        let config = &self.config;

        let mut found = Vec::new();
        if config.cleanup_closed_prs {
            let closed = cleanup::discover(doc, &blocks, config)?;
            found.extend(closed.into_iter().map(Trackable::ClosedPr));
        }
        if self.registry.is_some() {
            let tags = docker_tag::discover(doc, &blocks, config)?;
            found.extend(tags.into_iter().map(Trackable::DockerTag));
        }
        let refs = git_ref::discover(doc, &blocks, config)?;
        found.extend(refs.into_iter().map(Trackable::GitRef));
        if self.registry.is_some() {
            let digests = supergraph::discover(doc, &blocks, config)?;
            found.extend(digests.into_iter().map(Trackable::Supergraph));
        }
        if config.promote {
            let promotions = promotion::discover(doc, &blocks, config)?;
            let order = promotion::promotion_order(&promotions)?;
            found.extend(
                order
                    .into_iter()
                    .map(|idx| Trackable::Promotion(promotions[idx].clone())),
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use pretty_assertions::assert_eq;
    use refpin_test_utils::{sha, FakeGitClient, FakeRegistryClient, IMAGE_REPO, REPO_URL};
    use refpin_yaml::{ParseError, YamlError};

    const T1: &str = "main---0000001-2024.05-gaaaa001";
    const T2: &str = "main---0000002-2024.05-gbbbb002";

    fn values() -> String {
        format!(
            "\
global:
  gitConfig:
    repoURL: {REPO_URL}
    path: services/api
  dockerImage:
    repository: {IMAGE_REPO}
dev:
  gitConfig:
    ref: main
    track: main
  dockerImage:
    tag: {T1}
    track: main
prod:
  promote:
    from: dev
  gitConfig:
    ref: {old}
  dockerImage:
    tag: {T1}
",
            old = sha("old")
        )
    }

    fn git() -> FakeGitClient {
        FakeGitClient::new()
            .with_ref(REPO_URL, "main", &sha("tracked"))
            .with_tree(REPO_URL, &sha("tracked"), "services/api", "tree")
    }

    fn registry() -> FakeRegistryClient {
        FakeRegistryClient::new()
            .with_image(IMAGE_REPO, T1, "v1")
            .with_image(IMAGE_REPO, T2, "v2")
            .with_image(IMAGE_REPO, "main", "v2")
    }

    #[tokio::test]
    async fn passes_run_in_order() {
        let engine = Engine::new(Arc::new(git()), EngineConfig::default())
            .with_registry(Arc::new(registry()));
        let outcome = engine.reconcile("values.yaml", &values()).await.unwrap();

        let kinds: Vec<_> = outcome.changes.updates.iter().map(|u| u.kind).collect();
        assert_eq!(kinds, vec![crate::UpdateKind::DockerTag, crate::UpdateKind::GitRef]);
        assert_eq!(outcome.changes.promotions.len(), 2);
        let prod = format!(
            "prod:\n  promote:\n    from: dev\n  gitConfig:\n    ref: {}\n",
            sha("tracked")
        );
        assert!(outcome.output.contains(&prod));
        assert!(outcome.output.ends_with(&format!("    tag: {T2}\n")));
    }

    #[tokio::test]
    async fn without_registry_only_git_passes_run() {
        let engine = Engine::new(Arc::new(git()), EngineConfig::default().with_promote(false));
        let outcome = engine.reconcile("values.yaml", &values()).await.unwrap();
        assert_eq!(outcome.changes.updates.len(), 1);
        assert!(outcome.output.contains(&format!("    tag: {T1}\n    track: main\n")));
    }

    #[tokio::test]
    async fn empty_files_pass_through() {
        let engine = Engine::new(Arc::new(FakeGitClient::new()), EngineConfig::default());
        let outcome = engine.reconcile("values.yaml", "# nothing\n").await.unwrap();
        assert_eq!(outcome.output, "# nothing\n");
        assert!(outcome.changes.is_empty());
    }

    #[tokio::test]
    async fn multi_document_files_are_rejected() {
        let engine = Engine::new(Arc::new(FakeGitClient::new()), EngineConfig::default());
        let err = engine.reconcile("values.yaml", "a: 1\n---\nb: 2\n").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Yaml(YamlError::Parse(ParseError::MultipleDocuments { .. }))
        ));
    }

    #[tokio::test]
    async fn failures_leave_no_partial_output() {
        let engine = Engine::new(Arc::new(git()), EngineConfig::default())
            .with_registry(Arc::new(FakeRegistryClient::new()));
        let err = engine.reconcile("values.yaml", &values()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Resolution { ref environment, .. } if environment == "dev"
        ));
    }

    #[test]
    fn plan_lists_trackables_without_lookups() {
        let git = Arc::new(git());
        let engine = Engine::new(git.clone(), EngineConfig::default())
            .with_registry(Arc::new(registry()));
        let plan = engine.plan(&values()).unwrap();
        let kinds: Vec<&str> = plan.iter().map(Trackable::kind).collect();
        assert_eq!(kinds, vec!["docker-tag", "git-ref", "promotion"]);
        assert!(plan.iter().all(|t| t.environment() == "dev" || t.environment() == "prod"));
        assert_eq!(git.total_calls(), 0);
    }
}
