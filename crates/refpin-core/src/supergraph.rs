//! Supergraph digest reconciliation
//!
//! Two layouts are recognized:
//!
//! ```yaml
//! # router env var, digest suffix rewritten in place
//! prod:
//!   trackSupergraph: registry.example.com/graph:latest
//!   values:
//!     router:
//!       extraEnvVars:
//!         - name: GRAPH_ARTIFACT_REFERENCE
//!           value: registry.example.com/graph@sha256:...
//!
//! # image name shared through global, digest written directly
//! global:
//!   supergraph:
//!     artifactURL: registry.example.com/graphs
//!     imageName: graph
//! prod:
//!   supergraph:
//!     digest: sha256:...
//!     trackMutableTag: latest
//! ```

use crate::changes::{PinnedUpdate, UpdateKind};
use crate::config::EngineConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::trackable::{missing_field, resolve_all, tracking_directive, write_pinned};
use refpin_client::RegistryClient;
use refpin_yaml::blocks::{get_mapping, get_sequence, get_string, get_string_and_handle};
use refpin_yaml::{
    top_level_blocks, Document, Location, Mapping, Node, ScalarHandle, Sequence, TopLevelBlocks,
    YamlError,
};
use tracing::debug;

/// Env var of the router that carries the graph artifact reference
pub const GRAPH_ARTIFACT_REFERENCE: &str = "GRAPH_ARTIFACT_REFERENCE";

/// A digest that follows a mutable supergraph tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupergraphTrackable {
    /// Block name
    pub environment: String,
    /// Image repository to look the tag up in
    pub image: String,
    /// Mutable tag being followed
    pub tag: String,
    /// Text kept in front of `@<digest>`, for the env var layout
    pub prefix: Option<String>,
    /// Current scalar value
    pub current_value: String,
    /// Scalar to overwrite
    pub handle: ScalarHandle,
    /// Position of the tracking directive
    pub location: Location,
}

impl SupergraphTrackable {
    /// Scalar value that pins `digest`
    #[must_use]
    pub fn value_for(&self, digest: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}@{digest}"),
            None => digest.to_string(),
        }
    }
}

fn structure(path: String, message: impl Into<String>, location: Location) -> ReconcileError {
    YamlError::structure(path, message, Some(location)).into()
}

/// Split `<image>:<tag>`; the tag may not contain `/` (that would be a registry port)
fn split_image_ref(directive: &str) -> Option<(&str, &str)> {
    let (image, tag) = directive.rsplit_once(':')?;
    (!image.is_empty() && !tag.is_empty() && !tag.contains('/')).then_some((image, tag))
}

fn find_env_var<'d>(
    doc: &Document,
    vars: &'d Sequence,
    name: &str,
) -> ReconcileResult<Option<&'d Mapping>> {
    for item in vars.items() {
        if let Node::Mapping(entry) = item {
            if get_string(doc, entry, "name")?.as_deref() == Some(name) {
                return Ok(Some(entry));
            }
        }
    }
    Ok(None)
}

fn discover_env_var(
    doc: &Document,
    environment: &str,
    block: &Mapping,
) -> ReconcileResult<Option<SupergraphTrackable>> {
    let Some((directive, directive_handle)) = get_string_and_handle(doc, block, "trackSupergraph")?
    else {
        return Ok(None);
    };
    let location = doc.scalar_location(directive_handle);
    let (image, tag) = split_image_ref(&directive).ok_or_else(|| {
        structure(
            block.child_path("trackSupergraph"),
            format!("expected <image>:<tag>, found {directive:?}"),
            location,
        )
    })?;

    let required = "required by trackSupergraph";
    let values = get_mapping(doc, block, "values")?
        .ok_or_else(|| structure(block.child_path("values"), required, location))?;
    let router = get_mapping(doc, values, "router")?
        .ok_or_else(|| structure(values.child_path("router"), required, location))?;
    let vars = get_sequence(doc, router, "extraEnvVars")?
        .ok_or_else(|| structure(router.child_path("extraEnvVars"), required, location))?;
    let entry = find_env_var(doc, vars, GRAPH_ARTIFACT_REFERENCE)?.ok_or_else(|| {
        structure(
            vars.path().to_string(),
            format!("no entry named {GRAPH_ARTIFACT_REFERENCE}"),
            location,
        )
    })?;
    let (current_value, handle) = get_string_and_handle(doc, entry, "value")?
        .ok_or_else(|| structure(entry.child_path("value"), required, location))?;
    let Some((prefix, _)) = current_value.rsplit_once('@') else {
        return Err(structure(
            entry.child_path("value"),
            format!("expected <prefix>@<digest>, found {current_value:?}"),
            doc.scalar_location(handle),
        ));
    };

    Ok(Some(SupergraphTrackable {
        environment: environment.to_string(),
        image: image.to_string(),
        tag: tag.to_string(),
        prefix: Some(prefix.to_string()),
        current_value: current_value.clone(),
        handle,
        location,
    }))
}

fn discover_digest(
    doc: &Document,
    environment: &str,
    block: &Mapping,
    shared: Option<&Mapping>,
) -> ReconcileResult<Option<SupergraphTrackable>> {
    let Some(section) = get_mapping(doc, block, "supergraph")? else {
        return Ok(None);
    };
    let Some((tag, tracking_handle)) = tracking_directive(doc, section, "trackMutableTag")? else {
        return Ok(None);
    };
    let location = doc.scalar_location(tracking_handle);
    let (current_value, handle) = get_string_and_handle(doc, section, "digest")?
        .ok_or_else(|| missing_field(section, "digest", &tag, location))?;

    let image = match shared {
        Some(shared) => get_string(doc, shared, "imageName")?,
        None => None,
    }
    .ok_or_else(|| {
        structure(
            "global.supergraph.imageName".to_string(),
            format!("required by {}", section.child_path("trackMutableTag")),
            location,
        )
    })?;

    Ok(Some(SupergraphTrackable {
        environment: environment.to_string(),
        image,
        tag,
        prefix: None,
        current_value,
        handle,
        location,
    }))
}

/// Find every tracked supergraph digest in non-frozen blocks
///
/// # Errors
/// Structure errors naming the offending path when a layout is incomplete.
pub fn discover(
    doc: &Document,
    blocks: &TopLevelBlocks<'_>,
    config: &EngineConfig,
) -> ReconcileResult<Vec<SupergraphTrackable>> {
    let shared = match blocks.global {
        Some(global) => get_mapping(doc, global, "supergraph")?,
        None => None,
    };

    let mut found = Vec::new();
    for (environment, block) in blocks.iter() {
        if config.is_frozen(environment) {
            continue;
        }
        found.extend(discover_env_var(doc, environment, block)?);
        found.extend(discover_digest(doc, environment, block, shared)?);
    }
    Ok(found)
}

/// Look up the digest a tracked supergraph should be pinned to
///
/// # Errors
/// `ReconcileError::Resolution` pointing at the tracking directive.
pub async fn resolve(
    registry: &dyn RegistryClient,
    t: &SupergraphTrackable,
) -> ReconcileResult<String> {
    let digest = registry
        .get_digest_for_tag(&t.image, &t.tag)
        .await
        .map_err(|err| {
            ReconcileError::resolution(
                &t.environment,
                format!("cannot resolve supergraph {}:{}", t.image, t.tag),
                Some(t.location),
                err,
            )
        })?;
    Ok(t.value_for(&digest))
}

/// Discover, resolve and write every tracked supergraph digest
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
    debug!(count = trackables.len(), "discovered tracked supergraphs");

    let resolved = resolve_all(&trackables, config.concurrency(), |t| resolve(registry, t)).await?;

    let mut updates = Vec::new();
    for (t, value) in trackables.iter().zip(resolved) {
        updates.extend(write_pinned(
            doc,
            t.handle,
            &t.environment,
            UpdateKind::SupergraphDigest,
            &value,
        ));
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refpin_test_utils::FakeRegistryClient;
    use refpin_yaml::parse;

    const ENV_VAR_LAYOUT: &str = "\
prod:
  trackSupergraph: registry.example.com/graph:latest
  values:
    router:
      extraEnvVars:
        - name: OTHER
          value: x
        - name: GRAPH_ARTIFACT_REFERENCE
          value: registry.example.com/graph@sha256:old
";

    const SHARED_LAYOUT: &str = "\
global:
  supergraph:
    artifactURL: registry.example.com/graphs
    imageName: graph
prod:
  supergraph:
    digest: \"sha256:old\"
    trackMutableTag: latest
";

    fn document(text: &str) -> Document {
        parse(text).unwrap().document().cloned().unwrap()
    }

    fn discover_all(text: &str) -> ReconcileResult<Vec<SupergraphTrackable>> {
        let doc = document(text);
        let blocks = top_level_blocks(&doc)?;
        discover(&doc, &blocks, &EngineConfig::default())
    }

    #[test]
    fn image_refs() {
        assert_eq!(split_image_ref("a/b:latest"), Some(("a/b", "latest")));
        assert_eq!(split_image_ref("host:5000/b:v1"), Some(("host:5000/b", "v1")));
        assert_eq!(split_image_ref("host:5000/b"), None);
        assert_eq!(split_image_ref("latest"), None);
        assert_eq!(split_image_ref(":x"), None);
    }

    #[tokio::test]
    async fn env_var_layout_rewrites_only_the_digest() {
        let registry = FakeRegistryClient::new().with_image(
            "registry.example.com/graph",
            "latest",
            "sha256:new",
        );
        let mut doc = document(ENV_VAR_LAYOUT);
        let updates = reconcile(&mut doc, &registry, &EngineConfig::default()).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            doc.serialize(),
            ENV_VAR_LAYOUT.replace("graph@sha256:old", "graph@sha256:new")
        );
    }

    #[tokio::test]
    async fn shared_layout_writes_the_digest() {
        let registry = FakeRegistryClient::new().with_image("graph", "latest", "sha256:new");
        let mut doc = document(SHARED_LAYOUT);
        reconcile(&mut doc, &registry, &EngineConfig::default()).await.unwrap();
        assert_eq!(
            doc.serialize(),
            SHARED_LAYOUT.replace("\"sha256:old\"", "\"sha256:new\"")
        );
    }

    #[tokio::test]
    async fn second_pass_leaves_both_layouts_untouched() {
        let registry = FakeRegistryClient::new()
            .with_image("registry.example.com/graph", "latest", "sha256:new")
            .with_image("graph", "latest", "sha256:new");
        let config = EngineConfig::default();

        for layout in [ENV_VAR_LAYOUT, SHARED_LAYOUT] {
            let mut first = document(layout);
            let updates = reconcile(&mut first, &registry, &config).await.unwrap();
            assert_eq!(updates.len(), 1);
            let pinned = first.serialize();

            let mut second = document(&pinned);
            let updates = reconcile(&mut second, &registry, &config).await.unwrap();
            assert!(updates.is_empty(), "second pass updated {updates:?}");
            assert!(!second.is_modified());
            assert_eq!(second.serialize(), pinned);
        }
    }

    #[test]
    fn missing_router_names_the_path() {
        let text = "prod:\n  trackSupergraph: g:latest\n  values:\n    other: 1\n";
        let err = discover_all(text).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Yaml(YamlError::Structure { ref path, .. })
                if path == "prod.values.router"
        ));
    }

    #[test]
    fn missing_entry_names_the_sequence() {
        let text = ENV_VAR_LAYOUT.replace("GRAPH_ARTIFACT_REFERENCE", "SOMETHING_ELSE");
        let err = discover_all(&text).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Yaml(YamlError::Structure { ref path, .. })
                if path == "prod.values.router.extraEnvVars"
        ));
    }

    #[test]
    fn malformed_directive_is_a_structure_error() {
        let text = ENV_VAR_LAYOUT.replace("graph:latest", "graph");
        let err = discover_all(&text).unwrap_err();
        assert!(err.to_string().contains("expected <image>:<tag>"));
        assert_eq!(err.location(), Some(Location::new(2, 20)));
    }

    #[test]
    fn shared_layout_needs_an_image_name() {
        let text = SHARED_LAYOUT.replace("    imageName: graph\n", "");
        let err = discover_all(&text).unwrap_err();
        assert!(err.to_string().contains("global.supergraph.imageName"));
    }

    #[tokio::test]
    async fn lookup_failures_point_at_the_directive() {
        let t = discover_all(SHARED_LAYOUT).unwrap().remove(0);
        let err = resolve(&FakeRegistryClient::new(), &t).await.unwrap_err();
        assert_eq!(err.location(), Some(Location::new(8, 22)));
    }
}
