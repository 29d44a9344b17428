//! Format-preserving YAML document
//!
//! A [`Document`] keeps two aligned views of one file:
//!
//! ```text
//! source text ──► scanner ──► Node tree (reads)
//!                    │            │ ScalarHandle
//!                    └──► ScalarToken arena (writes) ──► serialize()
//! ```
//!
//! Tree nodes never own scalar text; they hold a [`ScalarHandle`] into the
//! token arena. Writes go through the handle and only ever replace the byte
//! range of one token, so everything else round-trips byte for byte.

use crate::error::{Location, ParseError};
use crate::quoting::{encode_flow, plain_reads_as_string, style_for_write, ScalarStyle};
use crate::scanner::Scanner;
use serde::Deserialize;
use std::ops::Range;

/// Handle to a scalar token in a document's token arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScalarHandle(pub(crate) usize);

/// Block scalar chomping indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chomping {
    Clip,
    Strip,
    Keep,
}

/// Layout of a `|` / `>` scalar, kept so rewrites reuse its header and indentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    pub(crate) header: String,
    pub(crate) indent: usize,
    pub(crate) chomping: Chomping,
}

impl BlockLayout {
    fn render(&self, value: &str) -> String {
        let body = value.strip_suffix('\n').unwrap_or(value);
        let mut out = self.header.clone();
        if body.is_empty() {
            return out;
        }
        for line in body.split('\n') {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&" ".repeat(self.indent));
                out.push_str(line);
            }
        }
        out
    }

    fn decoded(&self, value: &str) -> String {
        let body = value.strip_suffix('\n').unwrap_or(value);
        match self.chomping {
            Chomping::Strip => body.to_string(),
            Chomping::Clip | Chomping::Keep if body.is_empty() => String::new(),
            Chomping::Clip | Chomping::Keep => format!("{body}\n"),
        }
    }
}

/// One scalar leaf: its byte range, quoting style and current value
#[derive(Debug, Clone)]
pub struct ScalarToken {
    pub(crate) span: Range<usize>,
    pub(crate) style: ScalarStyle,
    pub(crate) tag: Option<String>,
    pub(crate) raw: String,
    pub(crate) value: String,
    pub(crate) block: Option<BlockLayout>,
    pub(crate) dirty: bool,
}

impl ScalarToken {
    /// Decoded value (reflects writes)
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Current quoting style
    #[inline]
    #[must_use]
    pub fn style(&self) -> ScalarStyle {
        self.style
    }

    /// Source spelling of the token (reflects writes)
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Byte offset of the token in the original text
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.span.start
    }

    /// Whether the scalar resolves to a string under the document's schema
    #[must_use]
    pub fn is_string(&self) -> bool {
        match self.tag.as_deref() {
            Some("!!str" | "tag:yaml.org,2002:str") => true,
            Some(_) => false,
            None if self.style == ScalarStyle::Plain => plain_reads_as_string(&self.value),
            None => true,
        }
    }

    fn normalized(&self, value: &str) -> String {
        match &self.block {
            Some(layout) => layout.decoded(value),
            None => value.to_string(),
        }
    }
}

/// Node of the navigable tree
#[derive(Debug, Clone)]
pub enum Node {
    /// Block mapping
    Mapping(Mapping),
    /// Block sequence
    Sequence(Sequence),
    /// Scalar, backed by a token
    Scalar(ScalarHandle),
    /// Key or item with no value
    Empty {
        /// Byte offset where the value would start
        offset: usize,
    },
    /// Flow collection or alias, kept verbatim and never navigated
    Opaque {
        /// Byte offset of the node
        offset: usize,
    },
}

impl Node {
    /// Get as mapping
    #[inline]
    #[must_use]
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Get as sequence
    #[inline]
    #[must_use]
    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    /// Get scalar handle
    #[inline]
    #[must_use]
    pub fn as_scalar(&self) -> Option<ScalarHandle> {
        match self {
            Self::Scalar(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Short name of the node kind for error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mapping(_) => "map",
            Self::Sequence(_) => "sequence",
            Self::Scalar(_) => "scalar",
            Self::Empty { .. } => "empty value",
            Self::Opaque { .. } => "flow collection or alias",
        }
    }
}

/// Key/value pair of a block mapping
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub(crate) key: String,
    pub(crate) key_offset: usize,
    pub(crate) value: Node,
}

impl MapEntry {
    /// Decoded key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value node
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Node {
        &self.value
    }

    /// Byte offset of the key
    #[inline]
    #[must_use]
    pub fn key_offset(&self) -> usize {
        self.key_offset
    }
}

/// Block mapping
#[derive(Debug, Clone)]
pub struct Mapping {
    pub(crate) path: String,
    pub(crate) offset: usize,
    pub(crate) entries: Vec<MapEntry>,
}

impl Mapping {
    /// Dotted path of this mapping from the document root
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Byte offset of the first key
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Entries in document order
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.iter()
    }

    /// Look up a value by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entry(key).map(|entry| &entry.value)
    }

    /// Look up an entry by key
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&MapEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Path of a child key
    #[must_use]
    pub fn child_path(&self, key: &str) -> String {
        join_path(&self.path, key)
    }
}

/// Block sequence
#[derive(Debug, Clone)]
pub struct Sequence {
    pub(crate) path: String,
    pub(crate) offset: usize,
    pub(crate) items: Vec<Node>,
}

impl Sequence {
    /// Dotted path of this sequence from the document root
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Byte offset of the first `-`
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Items in document order
    #[inline]
    pub fn items(&self) -> impl Iterator<Item = &Node> {
        self.items.iter()
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the sequence has no items
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub(crate) fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// One parsed YAML document
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    line_starts: Vec<usize>,
    tokens: Vec<ScalarToken>,
    root: Node,
}

impl Document {
    /// Root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Scalar token behind a handle
    #[inline]
    #[must_use]
    pub fn scalar(&self, handle: ScalarHandle) -> &ScalarToken {
        &self.tokens[handle.0]
    }

    /// Whether any scalar has been rewritten
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.tokens.iter().any(|token| token.dirty)
    }

    /// 1-based line/column of a byte offset in the original text
    #[must_use]
    pub fn location(&self, offset: usize) -> Location {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let end = offset.min(self.source.len());
        let column = self
            .source
            .get(line_start..end)
            .map_or(end - line_start, |prefix| prefix.chars().count());
        Location::new(line + 1, column + 1)
    }

    /// Location of a scalar token
    #[inline]
    #[must_use]
    pub fn scalar_location(&self, handle: ScalarHandle) -> Location {
        self.location(self.scalar(handle).span.start)
    }

    /// Location of any node
    #[must_use]
    pub fn node_location(&self, node: &Node) -> Location {
        let offset = match node {
            Node::Mapping(map) => map.offset,
            Node::Sequence(seq) => seq.offset,
            Node::Scalar(handle) => self.scalar(*handle).span.start,
            Node::Empty { offset } | Node::Opaque { offset } => *offset,
        };
        self.location(offset)
    }

    /// Overwrite a scalar's value, preserving its formatting
    ///
    /// Returns `false` when the token already holds `value`; nothing is
    /// rewritten in that case, which keeps repeated writes idempotent.
    pub fn write_scalar(&mut self, handle: ScalarHandle, value: &str) -> bool {
        let token = &mut self.tokens[handle.0];
        let normalized = token.normalized(value);
        if token.value == normalized {
            return false;
        }

        match &token.block {
            Some(layout) => {
                token.raw = layout.render(value);
            }
            None => {
                let style = style_for_write(token.style, value);
                token.raw = encode_flow(value, style);
                token.style = style;
            }
        }
        token.value = normalized;
        token.dirty = true;
        true
    }

    /// Current content as a `serde_yaml` value, for read-only settings
    ///
    /// # Errors
    /// `ParseError::Syntax` if the rendered text no longer parses.
    pub fn to_value(&self) -> Result<serde_yaml::Value, ParseError> {
        serde_yaml::from_str(&self.serialize()).map_err(ParseError::from)
    }

    /// Render the document, splicing rewritten tokens into the original text
    #[must_use]
    pub fn serialize(&self) -> String {
        if !self.is_modified() {
            return self.source.clone();
        }

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for token in &self.tokens {
            out.push_str(&self.source[cursor..token.span.start]);
            out.push_str(&token.raw);
            cursor = token.span.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

/// A parsed file: the document (if any) plus the text it came from
#[derive(Debug, Clone)]
pub struct YamlFile {
    source: String,
    document: Option<Document>,
}

impl YamlFile {
    /// Parse text into a file
    ///
    /// # Errors
    /// - `ParseError::Syntax` if the text is not valid YAML
    /// - `ParseError::MultipleDocuments` if the stream holds more than one document
    /// - `ParseError::Unsupported` for constructs the token scanner does not model
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse(text)
    }

    /// The document, or `None` for empty input
    #[inline]
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Mutable document, or `None` for empty input
    #[inline]
    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }

    /// Render the file; unchanged input renders to the original text
    #[must_use]
    pub fn serialize(&self) -> String {
        match &self.document {
            Some(document) => document.serialize(),
            None => self.source.clone(),
        }
    }
}

/// Parse text into a [`YamlFile`]
///
/// Empty, whitespace-only or comment-only input yields a file without a
/// document whose `serialize()` returns the input unchanged.
///
/// # Errors
/// See [`YamlFile::parse`].
pub fn parse(text: &str) -> Result<YamlFile, ParseError> {
    if text.trim().is_empty() {
        return Ok(YamlFile {
            source: text.to_string(),
            document: None,
        });
    }

    let line_starts = line_starts(text);
    match validate(text) {
        Ok(()) => {}
        Err(ParseError::MultipleDocuments { .. }) => {
            let location = Scanner::new(text, &line_starts)
                .scan()
                .err()
                .and_then(|err| err.location());
            return Err(ParseError::MultipleDocuments { location });
        }
        Err(err) => return Err(err),
    }

    let (root, tokens) = Scanner::new(text, &line_starts).scan()?;
    tracing::trace!(scalars = tokens.len(), "scanned YAML document");

    let document = root.map(|root| Document {
        source: text.to_string(),
        line_starts,
        tokens,
        root,
    });
    Ok(YamlFile {
        source: text.to_string(),
        document,
    })
}

/// Syntax check with `serde_yaml`, which also counts documents
fn validate(text: &str) -> Result<(), ParseError> {
    let mut documents = 0usize;
    for de in serde_yaml::Deserializer::from_str(text) {
        documents += 1;
        if documents > 1 {
            return Err(ParseError::MultipleDocuments { location: None });
        }
        serde_yaml::Value::deserialize(de)?;
    }
    Ok(())
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(text: &str) -> Document {
        parse(text).unwrap().document.unwrap()
    }

    fn scalar_at(doc: &Document, path: &[&str]) -> ScalarHandle {
        let mut node = doc.root();
        for key in path {
            node = node.as_mapping().unwrap().get(key).unwrap();
        }
        node.as_scalar().unwrap()
    }

    const SAMPLE: &str = r#"# Values for some-service
global:
  gitConfig:
    repoURL: https://github.com/example/monorepo.git   # shared

some-service-staging:
  gitConfig:
    path: services/some-service
    ref: 'abc123'
    trackMutableRef: main

  dockerImage:
    tag: "main---0000010-2024.05-gabc1234"
    track: main
  values:
    router:
      extraEnvVars:
        - name: GRAPH_ARTIFACT_REFERENCE
          value: registry.example.com/graph@sha256:aaaa
        - name: OTHER
          value: |
            multi
            line
"#;

    #[test]
    fn round_trip_without_writes_is_identity() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.serialize(), SAMPLE);
    }

    #[test]
    fn empty_input_has_no_document() {
        for text in ["", "   \n\n", "# only a comment\n"] {
            let file = parse(text).unwrap();
            assert!(file.document().is_none(), "{text:?}");
            assert_eq!(file.serialize(), text);
        }
    }

    #[test]
    fn multiple_documents_are_rejected() {
        let err = parse("a: 1\n---\nb: 2\n").unwrap_err();
        assert!(matches!(err, ParseError::MultipleDocuments { .. }));
        assert_eq!(err.location(), Some(Location::new(2, 1)));
    }

    #[test]
    fn syntax_errors_carry_a_location() {
        let err = parse("a:\n  b: [1, 2\nc: 3\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.location().is_some());
    }

    #[test]
    fn reads_decoded_values() {
        let doc = doc(SAMPLE);
        let r = scalar_at(&doc, &["some-service-staging", "gitConfig", "ref"]);
        assert_eq!(doc.scalar(r).value(), "abc123");
        assert_eq!(doc.scalar(r).style(), ScalarStyle::SingleQuoted);

        let repo = scalar_at(&doc, &["global", "gitConfig", "repoURL"]);
        assert_eq!(
            doc.scalar(repo).value(),
            "https://github.com/example/monorepo.git"
        );
    }

    #[test]
    fn sequence_items_and_block_scalars() {
        let doc = doc(SAMPLE);
        let vars = doc
            .root()
            .as_mapping()
            .and_then(|m| m.get("some-service-staging"))
            .and_then(Node::as_mapping)
            .and_then(|m| m.get("values"))
            .and_then(Node::as_mapping)
            .and_then(|m| m.get("router"))
            .and_then(Node::as_mapping)
            .and_then(|m| m.get("extraEnvVars"))
            .and_then(Node::as_sequence)
            .unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.path(), "some-service-staging.values.router.extraEnvVars");

        let second = vars.items().nth(1).and_then(Node::as_mapping).unwrap();
        let handle = second.get("value").and_then(Node::as_scalar).unwrap();
        assert_eq!(doc.scalar(handle).value(), "multi\nline\n");
        assert_eq!(doc.scalar(handle).style(), ScalarStyle::Literal);
    }

    #[test]
    fn write_preserves_surrounding_bytes() {
        let mut doc = doc(SAMPLE);
        let r = scalar_at(&doc, &["some-service-staging", "gitConfig", "ref"]);
        assert!(doc.write_scalar(r, "def456"));
        assert_eq!(doc.scalar(r).raw(), "'def456'");
        let out = doc.serialize();
        assert_eq!(out, SAMPLE.replace("ref: 'abc123'", "ref: 'def456'"));
    }

    #[test]
    fn write_is_idempotent() {
        let mut doc = doc("ref: abc\n");
        let r = scalar_at(&doc, &["ref"]);
        assert!(doc.write_scalar(r, "1234567"));
        let first = doc.serialize();
        assert!(!doc.write_scalar(r, "1234567"));
        assert_eq!(doc.serialize(), first);
        assert_eq!(first, "ref: '1234567'\n");

        let mut again = parse(&first).unwrap().document.unwrap();
        let r = scalar_at(&again, &["ref"]);
        assert!(!again.write_scalar(r, "1234567"));
        assert_eq!(again.serialize(), first);
    }

    #[test]
    fn plain_string_values_stay_unquoted() {
        let mut doc = doc("tag: old # keep me\n");
        let t = scalar_at(&doc, &["tag"]);
        doc.write_scalar(t, "main---0000011-2024.05-gdef5678");
        assert_eq!(
            doc.serialize(),
            "tag: main---0000011-2024.05-gdef5678 # keep me\n"
        );
    }

    #[test]
    fn leading_zero_values_are_quoted() {
        let mut written = doc("ref: abc\n");
        let r = scalar_at(&written, &["ref"]);
        assert!(written.write_scalar(r, "0123456"));
        assert_eq!(written.serialize(), "ref: '0123456'\n");
        assert!(written.scalar(r).is_string());

        let plain = doc("ref: 0123456\n");
        assert!(!plain.scalar(scalar_at(&plain, &["ref"])).is_string());
    }

    #[test]
    fn double_quotes_are_kept() {
        let mut doc = doc("digest: \"x\"\n");
        let d = scalar_at(&doc, &["digest"]);
        doc.write_scalar(d, "123");
        assert_eq!(doc.serialize(), "digest: \"123\"\n");
    }

    #[test]
    fn block_scalar_rewrite_keeps_header_and_indent() {
        let mut doc = doc("a:\n  b: |-\n    old\n  c: 1\n");
        let b = scalar_at(&doc, &["a", "b"]);
        assert_eq!(doc.scalar(b).value(), "old");
        doc.write_scalar(b, "new");
        assert_eq!(doc.serialize(), "a:\n  b: |-\n    new\n  c: 1\n");
    }

    #[test]
    fn plain_typed_scalars_are_not_strings() {
        let doc = doc("a: 123\nb: true\nc: abc\nd: !!str 123\ne: '123'\n");
        let is_string = |key: &str| doc.scalar(scalar_at(&doc, &[key])).is_string();
        assert!(!is_string("a"));
        assert!(!is_string("b"));
        assert!(is_string("c"));
        assert!(is_string("d"));
        assert!(is_string("e"));
    }

    #[test]
    fn values_reflect_writes() {
        let mut doc = doc("a:\n  paths: [[x, y]]\n  b: old\n");
        let b = scalar_at(&doc, &["a", "b"]);
        doc.write_scalar(b, "new");
        let value = doc.to_value().unwrap();
        assert_eq!(value["a"]["b"].as_str(), Some("new"));
        assert_eq!(value["a"]["paths"][0][1].as_str(), Some("y"));
    }

    #[test]
    fn locations_are_one_based() {
        let doc = doc(SAMPLE);
        let r = scalar_at(&doc, &["some-service-staging", "gitConfig", "ref"]);
        assert_eq!(doc.scalar_location(r), Location::new(9, 10));
    }
}
