//! Structured change records
//!
//! Pure data handed to reporting; nothing here drives control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pinned value was rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    /// `gitConfig.ref`
    GitRef,
    /// `dockerImage.tag`
    DockerTag,
    /// Supergraph digest
    SupergraphDigest,
}

/// One rewritten pinned value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedUpdate {
    /// Block name
    pub environment: String,
    /// What was rewritten
    pub kind: UpdateKind,
    /// Value before the write
    pub old_value: String,
    /// Value after the write
    pub new_value: String,
}

/// What changed between the old and new value of a promoted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum PromotionInfo {
    /// Commits in the range, oldest first
    Commits(Vec<String>),
    /// The value changed but no commit lies in the range
    NoCommits,
    /// Identical value
    NoChange,
    /// Could not be determined
    Unknown(String),
}

/// One promoted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionChange {
    /// Target block
    pub environment: String,
    /// Source block
    pub from: String,
    /// Key path inside the block
    pub yaml_path: Vec<String>,
    /// Target value before the write
    pub old_value: String,
    /// Value copied from the source
    pub new_value: String,
    /// Change summary
    pub info: PromotionInfo,
}

/// A tracking directive moved off a closed pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupChange {
    /// Pull request number
    pub pr_number: u64,
    /// Pull request title
    pub title: String,
    /// Pull request web URL
    pub url: String,
    /// File the directive lives in
    pub file: String,
    /// Block name
    pub environment: String,
    /// When the pull request was closed
    pub closed_at: Option<DateTime<Utc>>,
}

/// Everything one file's reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChanges {
    /// Rewritten pinned values
    pub updates: Vec<PinnedUpdate>,
    /// Promoted values
    pub promotions: Vec<PromotionChange>,
    /// Cleaned-up tracking directives
    pub cleanups: Vec<CleanupChange>,
}

impl FileChanges {
    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.promotions.is_empty() && self.cleanups.is_empty()
    }
}

/// Result of reconciling one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Serialized document
    pub output: String,
    /// Structured changes
    pub changes: FileChanges,
}

impl FileOutcome {
    /// Whether the output differs from the input
    #[inline]
    #[must_use]
    pub fn is_modified(&self, input: &str) -> bool {
        self.output != input
    }
}
