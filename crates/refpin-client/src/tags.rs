//! Release-line tag helpers
//!
//! Image tags follow `<line>---<counter>-<YYYY>.<MM>-g<commit>`, for example
//! `main---0000123-2024.05-gabc1234`. The counter is zero-padded, so tags of
//! one release line sort chronologically as plain strings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between the release line and the build part of a tag
pub const RELEASE_LINE_SEPARATOR: &str = "---";

/// Prefix of tags built from the default branch
pub const MAIN_RELEASE_LINE: &str = "main---";

static RELEASE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<line>.+?)---(?P<counter>\d+)-(?P<date>\d{4}\.\d{2})-g(?P<commit>[0-9a-f]+)$")
        .expect("release tag pattern is valid")
});

static COMMIT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-g([0-9a-f]+)$").expect("commit suffix pattern is valid"));

static PR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pr-(\d+)$").expect("pull request ref pattern is valid"));

/// Parsed release-line tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag<'a> {
    /// Release line, e.g. `main` or `pr-123`
    pub line: &'a str,
    /// Build counter as written (zero-padded)
    pub counter: &'a str,
    /// Build month, `YYYY.MM`
    pub date: &'a str,
    /// Short commit hash
    pub commit: &'a str,
}

impl<'a> ReleaseTag<'a> {
    /// Parse a tag, returning `None` if it is not in release-line form
    #[must_use]
    pub fn parse(tag: &'a str) -> Option<Self> {
        let caps = RELEASE_TAG.captures(tag)?;
        Some(Self {
            line: caps.name("line")?.as_str(),
            counter: caps.name("counter")?.as_str(),
            date: caps.name("date")?.as_str(),
            commit: caps.name("commit")?.as_str(),
        })
    }

    /// Whether the tag was built from the default branch
    #[inline]
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.line == "main"
    }
}

/// Trailing `-g<hash>` commit of a tag
#[must_use]
pub fn commit_hash_from_tag(tag: &str) -> Option<&str> {
    COMMIT_SUFFIX
        .captures(tag)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// PR number of a `pr-<n>` tracking ref
#[must_use]
pub fn pr_number_from_ref(tracking: &str) -> Option<u64> {
    PR_REF
        .captures(tracking)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether `tag` belongs to the release line tracked by `tracking`
#[inline]
#[must_use]
pub fn is_on_release_line(tag: &str, tracking: &str) -> bool {
    tag.strip_prefix(tracking)
        .is_some_and(|rest| rest.starts_with(RELEASE_LINE_SEPARATOR))
}

/// A tag together with the image version (digest) it points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedImage {
    /// Tag name
    pub tag: String,
    /// Image version the tag points at
    pub version: String,
}

impl TaggedImage {
    /// Create new tagged image
    pub fn new(tag: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            version: version.into(),
        }
    }
}

/// Commit hashes built after `prev` up to and including `next`
///
/// Only `main---` tags take part; if either bound is on another line the
/// result is empty. Consecutive tags of the same image version collapse to
/// one entry, while a version that reappears later (a rollback) is kept.
#[must_use]
pub fn commits_between_tags(prev: &str, next: &str, images: &[TaggedImage]) -> Vec<String> {
    if !prev.starts_with(MAIN_RELEASE_LINE) || !next.starts_with(MAIN_RELEASE_LINE) {
        return Vec::new();
    }

    let mut in_range: Vec<&TaggedImage> = images
        .iter()
        .filter(|image| image.tag.starts_with(MAIN_RELEASE_LINE))
        .filter(|image| prev < image.tag.as_str() && image.tag.as_str() <= next)
        .collect();
    in_range.sort_by(|a, b| a.tag.cmp(&b.tag));
    in_range.dedup_by(|later, earlier| later.version == earlier.version);

    in_range
        .into_iter()
        .filter_map(|image| commit_hash_from_tag(&image.tag))
        .map(str::to_string)
        .collect()
}
