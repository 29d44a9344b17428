//! Environment blocks and typed field lookups
//!
//! A values file is a top-level map of named environment blocks plus an
//! optional `global` block whose fields act as defaults.

use crate::document::{Document, Mapping, Node, ScalarHandle, Sequence};
use crate::error::{YamlError, YamlResult};
use indexmap::IndexMap;

/// Name of the block holding inherited defaults
pub const GLOBAL_BLOCK: &str = "global";

/// The `global` block plus every other top-level map, in document order
#[derive(Debug, Clone)]
pub struct TopLevelBlocks<'d> {
    /// Inherited defaults, if present
    pub global: Option<&'d Mapping>,
    /// Named environment blocks
    pub blocks: IndexMap<String, &'d Mapping>,
}

impl<'d> TopLevelBlocks<'d> {
    /// Look up a block by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'d Mapping> {
        self.blocks.get(name).copied()
    }

    /// Iterate blocks in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'d Mapping)> + '_ {
        self.blocks.iter().map(|(name, map)| (name.as_str(), *map))
    }
}

/// Split a document into its `global` block and named blocks
///
/// # Errors
/// `YamlError::Structure` if the top level or `global` is not a map.
pub fn top_level_blocks(doc: &Document) -> YamlResult<TopLevelBlocks<'_>> {
    let root = doc.root().as_mapping().ok_or_else(|| {
        YamlError::structure(
            "(root)",
            format!("expected a map at the top level, found {}", doc.root().kind()),
            Some(doc.node_location(doc.root())),
        )
    })?;

    let mut global = None;
    let mut blocks = IndexMap::new();
    for entry in root.entries() {
        match (entry.key(), entry.value()) {
            (GLOBAL_BLOCK, Node::Mapping(map)) => global = Some(map),
            (GLOBAL_BLOCK, other) => {
                return Err(YamlError::structure(
                    GLOBAL_BLOCK,
                    format!("expected a map, found {}", other.kind()),
                    Some(doc.node_location(other)),
                ))
            }
            (name, Node::Mapping(map)) => {
                blocks.insert(name.to_string(), map);
            }
            _ => {}
        }
    }
    Ok(TopLevelBlocks { global, blocks })
}

/// Read a string field
///
/// Returns `None` when the key is absent or has no value.
///
/// # Errors
/// `YamlError::Type` if the value is not a string scalar.
pub fn get_string(doc: &Document, map: &Mapping, key: &str) -> YamlResult<Option<String>> {
    Ok(get_string_and_handle(doc, map, key)?.map(|(value, _)| value))
}

/// Read a string field together with the handle used to overwrite it
///
/// # Errors
/// `YamlError::Type` if the value is not a string scalar.
pub fn get_string_and_handle(
    doc: &Document,
    map: &Mapping,
    key: &str,
) -> YamlResult<Option<(String, ScalarHandle)>> {
    match map.get(key) {
        None | Some(Node::Empty { .. }) => Ok(None),
        Some(Node::Scalar(handle)) if doc.scalar(*handle).is_string() => {
            Ok(Some((doc.scalar(*handle).value().to_string(), *handle)))
        }
        Some(other) => Err(YamlError::Type {
            path: map.child_path(key),
            expected: "a string",
            location: Some(doc.node_location(other)),
        }),
    }
}

/// Read a nested map
///
/// # Errors
/// `YamlError::Structure` if the value exists but is not a map.
pub fn get_mapping<'d>(
    doc: &Document,
    map: &'d Mapping,
    key: &str,
) -> YamlResult<Option<&'d Mapping>> {
    match map.get(key) {
        None | Some(Node::Empty { .. }) => Ok(None),
        Some(Node::Mapping(child)) => Ok(Some(child)),
        Some(other) => Err(YamlError::structure(
            map.child_path(key),
            format!("expected a map, found {}", other.kind()),
            Some(doc.node_location(other)),
        )),
    }
}

/// Read a nested sequence
///
/// # Errors
/// `YamlError::Structure` if the value exists but is not a sequence.
pub fn get_sequence<'d>(
    doc: &Document,
    map: &'d Mapping,
    key: &str,
) -> YamlResult<Option<&'d Sequence>> {
    match map.get(key) {
        None | Some(Node::Empty { .. }) => Ok(None),
        Some(Node::Sequence(seq)) => Ok(Some(seq)),
        Some(other) => Err(YamlError::structure(
            map.child_path(key),
            format!("expected a sequence, found {}", other.kind()),
            Some(doc.node_location(other)),
        )),
    }
}

/// Walk a chain of nested maps, stopping at the first missing key
///
/// # Errors
/// `YamlError::Structure` if an intermediate value is not a map.
pub fn get_mapping_path<'d, S: AsRef<str>>(
    doc: &Document,
    map: &'d Mapping,
    path: &[S],
) -> YamlResult<Option<&'d Mapping>> {
    let mut current = map;
    for key in path {
        match get_mapping(doc, current, key.as_ref())? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Read the string at a key path such as `["gitConfig", "ref"]`
///
/// # Errors
/// Structure errors for non-map intermediates; a type error for a non-string leaf.
pub fn get_string_at_path<S: AsRef<str>>(
    doc: &Document,
    map: &Mapping,
    path: &[S],
) -> YamlResult<Option<(String, ScalarHandle)>> {
    let Some((leaf, parents)) = path.split_last() else {
        return Ok(None);
    };
    match get_mapping_path(doc, map, parents)? {
        Some(parent) => get_string_and_handle(doc, parent, leaf.as_ref()),
        None => Ok(None),
    }
}

/// Read `section.key` from a block, falling back to the same path under `global`
///
/// # Errors
/// Propagates structure and type errors from either lookup.
pub fn get_string_or_global(
    doc: &Document,
    block: &Mapping,
    global: Option<&Mapping>,
    section: &str,
    key: &str,
) -> YamlResult<Option<String>> {
    let path = [section, key];
    if let Some((value, _)) = get_string_at_path(doc, block, &path)? {
        return Ok(Some(value));
    }
    match global {
        Some(global) => Ok(get_string_at_path(doc, global, &path)?.map(|(value, _)| value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse;
    use pretty_assertions::assert_eq;

    fn doc(text: &str) -> Document {
        parse(text).unwrap().document().cloned().unwrap()
    }

    const VALUES: &str = "\
global:
  gitConfig:
    repoURL: https://github.com/example/repo.git
staging:
  gitConfig:
    path: svc
    ref: abc
    count: 3
    empty:
  dockerImage: not-a-map
note: just a scalar
prod:
  gitConfig:
    repoURL: https://github.com/example/other.git
";

    #[test]
    fn splits_global_and_blocks() {
        let doc = doc(VALUES);
        let blocks = top_level_blocks(&doc).unwrap();
        assert!(blocks.global.is_some());
        let names: Vec<&str> = blocks.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["staging", "prod"]);
    }

    #[test]
    fn non_map_top_level_is_a_structure_error() {
        let doc = doc("- a\n- b\n");
        let err = top_level_blocks(&doc).unwrap_err();
        assert!(matches!(err, YamlError::Structure { .. }));
    }

    #[test]
    fn non_map_global_is_a_structure_error() {
        let doc = doc("global: 3\nprod:\n  a: b\n");
        let err = top_level_blocks(&doc).unwrap_err();
        assert!(matches!(err, YamlError::Structure { ref path, .. } if path == "global"));
    }

    #[test]
    fn string_lookups() {
        let doc = doc(VALUES);
        let blocks = top_level_blocks(&doc).unwrap();
        let staging = blocks.get("staging").unwrap();
        let git = get_mapping(&doc, staging, "gitConfig").unwrap().unwrap();

        assert_eq!(get_string(&doc, git, "ref").unwrap().as_deref(), Some("abc"));
        assert_eq!(get_string(&doc, git, "missing").unwrap(), None);
        assert_eq!(get_string(&doc, git, "empty").unwrap(), None);

        let err = get_string(&doc, git, "count").unwrap_err();
        assert!(matches!(
            err,
            YamlError::Type { ref path, .. } if path == "staging.gitConfig.count"
        ));
        assert_eq!(err.location().map(|l| l.line), Some(8));
    }

    #[test]
    fn mapping_lookup_rejects_scalars() {
        let doc = doc(VALUES);
        let blocks = top_level_blocks(&doc).unwrap();
        let staging = blocks.get("staging").unwrap();
        let err = get_mapping(&doc, staging, "dockerImage").unwrap_err();
        assert!(matches!(err, YamlError::Structure { .. }));
    }

    #[test]
    fn global_fallback() {
        let doc = doc(VALUES);
        let blocks = top_level_blocks(&doc).unwrap();
        let repo = |name: &str| {
            let block = blocks.get(name).unwrap();
            get_string_or_global(&doc, block, blocks.global, "gitConfig", "repoURL").unwrap()
        };
        assert_eq!(repo("staging").as_deref(), Some("https://github.com/example/repo.git"));
        assert_eq!(repo("prod").as_deref(), Some("https://github.com/example/other.git"));
    }

    #[test]
    fn path_lookup() {
        let doc = doc(VALUES);
        let blocks = top_level_blocks(&doc).unwrap();
        let staging = blocks.get("staging").unwrap();
        let (value, _) = get_string_at_path(&doc, staging, &["gitConfig", "path"])
            .unwrap()
            .unwrap();
        assert_eq!(value, "svc");
        assert!(get_string_at_path(&doc, staging, &["values", "x"]).unwrap().is_none());
    }
}
