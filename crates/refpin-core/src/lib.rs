//! Reconciliation of GitOps values files
//!
//! Pins mutable references (branches, PR refs, release-line image tags,
//! supergraph tags) to the immutable values they currently point at,
//! copies pinned values along `promote.from` chains, and retires tracking
//! directives of closed pull requests. Every write goes through
//! [`refpin_yaml`], so untouched text survives byte for byte.
//!
//! # Example
//!
//! ```rust,ignore
//! use refpin_core::{Engine, EngineConfig};
//! use std::sync::Arc;
//!
//! # async fn example(git: Arc<dyn refpin_client::GitClient>) -> refpin_core::ReconcileResult<()> {
//! let engine = Engine::new(git, EngineConfig::new().with_frozen_environment("prod"));
//! let outcome = engine.reconcile("values.yaml", "dev:\n  gitConfig:\n    ref: main\n").await?;
//! println!("{} pinned values updated", outcome.changes.updates.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod changes;
pub mod cleanup;
pub mod config;
pub mod docker_tag;
pub mod engine;
pub mod error;
pub mod git_ref;
pub mod promotion;
pub mod supergraph;
pub mod trackable;

pub use changes::{
    CleanupChange, FileChanges, FileOutcome, PinnedUpdate, PromotionChange, PromotionInfo,
    UpdateKind,
};
pub use cleanup::ClosedPrTrackable;
pub use config::EngineConfig;
pub use docker_tag::DockerTagTrackable;
pub use engine::Engine;
pub use error::{ReconcileError, ReconcileResult};
pub use git_ref::{GitRefTrackable, RefDecision, ResolvedRef};
pub use promotion::PromotionTrackable;
pub use supergraph::SupergraphTrackable;
pub use trackable::Trackable;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running reconciliation
    pub use crate::changes::{FileChanges, FileOutcome, PinnedUpdate, PromotionChange, UpdateKind};
    pub use crate::config::EngineConfig;
    pub use crate::engine::Engine;
    pub use crate::error::{ReconcileError, ReconcileResult};
    pub use crate::trackable::Trackable;
}
