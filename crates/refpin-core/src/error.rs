//! Error types for reconciliation
//!
//! Provides error handling for:
//! - Document errors (parse, structure, type) from the editor
//! - Required upstream lookups that failed
//! - Invalid promotion declarations
//! - Configuration loading

use refpin_client::ClientError;
use refpin_yaml::{Location, YamlError};

/// Errors that abort reconciliation of one file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Parse, structure or type error in the document
    #[error(transparent)]
    Yaml(#[from] YamlError),

    /// A required Git or registry lookup failed
    #[error("{environment}: {message}{}: {source}", at(.location))]
    Resolution {
        /// Top-level block being reconciled
        environment: String,
        /// What was being looked up
        message: String,
        /// Tracking directive that triggered the lookup
        location: Option<Location>,
        /// Client failure
        #[source]
        source: ClientError,
    },

    /// A promotion declaration cannot be carried out
    #[error("promotion into {block}: {message}")]
    Promotion {
        /// Target block of the promotion
        block: String,
        /// Why the promotion cannot proceed
        message: String,
    },

    /// Engine configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Create resolution error for an environment
    pub fn resolution(
        environment: impl Into<String>,
        message: impl Into<String>,
        location: Option<Location>,
        source: ClientError,
    ) -> Self {
        Self::Resolution {
            environment: environment.into(),
            message: message.into(),
            location,
            source,
        }
    }

    /// Create promotion error for a block
    pub fn promotion(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Promotion {
            block: block.into(),
            message: message.into(),
        }
    }

    /// Location of the directive that failed, if known
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Yaml(err) => err.location(),
            Self::Resolution { location, .. } => *location,
            Self::Promotion { .. } | Self::Config(_) => None,
        }
    }
}

fn at(location: &Option<Location>) -> String {
    location.map(|loc| format!(" at {loc}")).unwrap_or_default()
}

/// Result type alias for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;
