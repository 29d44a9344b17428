//! Git and registry client interfaces for refpin
//!
//! The reconcilers only ever talk to a [`GitClient`] and, optionally, a
//! [`RegistryClient`]. Concrete network clients live outside this crate;
//! [`CachingGitClient`] and [`CachingRegistryClient`] wrap any
//! implementation with bounded, single-flight caches.
//!
//! # Architecture
//!
//! ```text
//! reconciler ──► CachingGitClient ──► FetchCache (moka, LRU) ──► GitClient impl
//!            └─► CachingRegistryClient ──► FetchCache ──────────► RegistryClient impl
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod caching;
pub mod error;
pub mod git;
pub mod registry;
pub mod tags;
pub mod types;

pub use cache::{CacheConfig, CacheSnapshot, CacheStats, FetchCache};
pub use caching::{CachingGitClient, CachingRegistryClient};
pub use error::{ClientError, ClientResult};
pub use git::GitClient;
pub use registry::RegistryClient;
pub use types::{CommitsBetweenTags, ComparedCommit, PullRequest, PullRequestState};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for implementing and consuming clients
    pub use crate::caching::{CachingGitClient, CachingRegistryClient};
    pub use crate::error::{ClientError, ClientResult};
    pub use crate::git::GitClient;
    pub use crate::registry::RegistryClient;
    pub use crate::tags::{commit_hash_from_tag, commits_between_tags, pr_number_from_ref};
    pub use crate::types::{CommitsBetweenTags, ComparedCommit, PullRequest, PullRequestState};
}
