//! Single-flight fetch cache using moka
//!
//! Keys are the JSON encoding of a call's argument tuple. Concurrent
//! requests for the same key share one in-flight fetch; successful results
//! are kept until evicted (least recently used first), failures are not
//! cached so the next caller retries.

use crate::error::{ClientError, ClientResult};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, trace};

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Capacities of the caches wrapped around the clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Mutable ref → SHA resolutions
    pub ref_capacity: u64,
    /// Commit/path → tree SHA lookups
    pub tree_capacity: u64,
    /// Everything else
    pub default_capacity: u64,
}

impl CacheConfig {
    /// Create config with default capacities
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set ref cache capacity
    #[inline]
    #[must_use]
    pub fn with_ref_capacity(mut self, capacity: u64) -> Self {
        self.ref_capacity = capacity;
        self
    }

    /// Set tree cache capacity
    #[inline]
    #[must_use]
    pub fn with_tree_capacity(mut self, capacity: u64) -> Self {
        self.tree_capacity = capacity;
        self
    }

    /// Set capacity of the remaining caches
    #[inline]
    #[must_use]
    pub fn with_default_capacity(mut self, capacity: u64) -> Self {
        self.default_capacity = capacity;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ref_capacity: 1_000,
            tree_capacity: 10_000,
            default_capacity: 1_000,
        }
    }
}

/// Persistable contents of a cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "V: Serialize", deserialize = "V: DeserializeOwned"))]
pub struct CacheSnapshot<V> {
    /// Entries by key
    pub entries: BTreeMap<String, V>,
}

impl<V> Default for CacheSnapshot<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> CacheSnapshot<V> {
    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Encode an argument tuple as a cache key
///
/// # Errors
/// `ClientError::InvalidRequest` if the arguments cannot be serialized.
pub fn cache_key<K: Serialize + ?Sized>(args: &K) -> ClientResult<String> {
    serde_json::to_string(args).map_err(|err| ClientError::InvalidRequest(err.to_string()))
}

/// Bounded LRU cache with single-flight fetches
#[derive(Clone)]
pub struct FetchCache<V> {
    name: &'static str,
    inner: Cache<String, V>,
}

impl<V> std::fmt::Debug for FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("name", &self.name)
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

impl<V> FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create new cache with max capacity
    #[must_use]
    pub fn new(name: &'static str, max_capacity: u64) -> Self {
        Self {
            name,
            inner: Cache::builder()
                .name(name)
                .max_capacity(max_capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Cache name, used in logs
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the cached value for `args`, fetching it at most once
    ///
    /// Callers arriving while a fetch for the same key is in flight wait
    /// for it and receive its result, success or failure.
    ///
    /// # Errors
    /// The fetch's error, or `ClientError::InvalidRequest` for unencodable arguments.
    pub async fn get_or_fetch<K, Fut>(&self, args: &K, fetch: Fut) -> ClientResult<V>
    where
        K: Serialize + ?Sized,
        Fut: Future<Output = ClientResult<V>>,
    {
        let key = cache_key(args)?;
        let name = self.name;
        let logged_key = key.clone();
        self.inner
            .try_get_with(key, async move {
                debug!(cache = name, key = %logged_key, "cache miss");
                fetch.await
            })
            .await
            .map_err(ClientError::from)
    }

    /// Cached value for `args`, without fetching
    pub async fn get<K: Serialize + ?Sized>(&self, args: &K) -> Option<V> {
        let key = cache_key(args).ok()?;
        self.inner.get(&key).await
    }

    /// Insert a value directly
    ///
    /// # Errors
    /// `ClientError::InvalidRequest` for unencodable arguments.
    pub async fn insert<K: Serialize + ?Sized>(&self, args: &K, value: V) -> ClientResult<()> {
        let key = cache_key(args)?;
        self.inner.insert(key, value).await;
        Ok(())
    }

    /// Copy every live entry into a snapshot
    pub async fn snapshot(&self) -> CacheSnapshot<V> {
        self.inner.run_pending_tasks().await;
        let entries: BTreeMap<String, V> = self
            .inner
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect();
        trace!(cache = self.name, entries = entries.len(), "snapshot taken");
        CacheSnapshot { entries }
    }

    /// Load entries from a snapshot, replacing values under the same keys
    pub async fn seed(&self, snapshot: CacheSnapshot<V>) {
        let count = snapshot.len();
        for (key, value) in snapshot.entries {
            self.inner.insert(key, value).await;
        }
        debug!(cache = self.name, entries = count, "seeded cache");
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks().await;
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}
