//! Engine configuration

use crate::error::{ReconcileError, ReconcileResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Engine configuration
///
/// Every field has a default, so an empty YAML map is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Blocks that are never rewritten
    pub frozen_environments: BTreeSet<String>,
    /// Copy pinned values along `promote.from` declarations
    pub promote: bool,
    /// Point tracking directives of closed pull requests back at `main`
    pub cleanup_closed_prs: bool,
    /// Upper bound on in-flight resolutions per reconciler pass
    pub max_concurrent_resolutions: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from YAML
    ///
    /// # Errors
    /// `ReconcileError::Config` if the text is not a valid configuration.
    pub fn from_yaml_str(text: &str) -> ReconcileResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|err| ReconcileError::Config(err.to_string()))
    }

    /// With an environment frozen
    #[must_use]
    pub fn with_frozen_environment(mut self, name: impl Into<String>) -> Self {
        self.frozen_environments.insert(name.into());
        self
    }

    /// With promotion enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_promote(mut self, enabled: bool) -> Self {
        self.promote = enabled;
        self
    }

    /// With closed-PR cleanup enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_cleanup_closed_prs(mut self, enabled: bool) -> Self {
        self.cleanup_closed_prs = enabled;
        self
    }

    /// With max concurrent resolutions (at least one)
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_resolutions(mut self, max: usize) -> Self {
        self.max_concurrent_resolutions = max.max(1);
        self
    }

    /// Whether `environment` must not be rewritten
    #[inline]
    #[must_use]
    pub fn is_frozen(&self, environment: &str) -> bool {
        self.frozen_environments.contains(environment)
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.max_concurrent_resolutions.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frozen_environments: BTreeSet::new(),
            promote: true,
            cleanup_closed_prs: false,
            max_concurrent_resolutions: 8,
        }
    }
}
