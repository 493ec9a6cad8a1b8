//! Cache storage implementations.
//!
//! `TaggedCache`: TTL'd object cache whose entries carry invalidation tags.
//! `ResponseStore`: rendered HTTP responses keyed by path and query.

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::deps;
use super::keys::ResponseKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_OBJECT_HIT: &str = "inkpost_cache_object_hit_total";
const METRIC_OBJECT_MISS: &str = "inkpost_cache_object_miss_total";
const METRIC_OBJECT_EVICT: &str = "inkpost_cache_object_evict_total";
const METRIC_RESPONSE_HIT: &str = "inkpost_cache_response_hit_total";
const METRIC_RESPONSE_MISS: &str = "inkpost_cache_response_miss_total";

/// How long a loaded value may be served and which tags invalidate it.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    /// `None` falls back to the configured default TTL.
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

impl CachePolicy {
    pub fn tagged<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ttl: None,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

// ============================================================================
// Object cache
// ============================================================================

struct ObjectEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
    tags: Vec<String>,
}

struct ObjectState {
    entries: LruCache<String, ObjectEntry>,
    /// Bumped on every invalidation of the tag. A load started under an older
    /// epoch is not stored.
    epochs: HashMap<String, u64>,
    /// Bumped by `clear`, which fences loads whatever their tags.
    generation: u64,
}

impl ObjectState {
    fn fence_for(&self, tags: &[String]) -> (u64, Vec<u64>) {
        let epochs = tags
            .iter()
            .map(|tag| self.epochs.get(tag).copied().unwrap_or(0))
            .collect();
        (self.generation, epochs)
    }
}

/// In-process object cache with TTL and tag invalidation.
pub struct TaggedCache {
    enabled: bool,
    default_ttl: Duration,
    state: RwLock<ObjectState>,
}

impl TaggedCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enable_object_cache,
            default_ttl: config.default_ttl,
            state: RwLock::new(ObjectState {
                entries: LruCache::new(config.object_limit),
                epochs: HashMap::new(),
                generation: 0,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached value for `key`, or run `loader` and cache its success.
    ///
    /// The policy tags are recorded with the active response-cache collector on
    /// hits and misses alike. Loader errors are never cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        loader: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        deps::record_all(policy.tags.iter().cloned());

        if !self.enabled {
            return loader().await;
        }

        if let Some(value) = self.get::<T>(key) {
            counter!(METRIC_OBJECT_HIT).increment(1);
            return Ok(value);
        }
        counter!(METRIC_OBJECT_MISS).increment(1);

        let observed = rw_read(&self.state, SOURCE, "get_or_load.fence").fence_for(&policy.tags);
        let value = loader().await?;

        let mut state = rw_write(&self.state, SOURCE, "get_or_load.insert");
        if state.fence_for(&policy.tags) != observed {
            debug!(
                target: "inkpost::cache",
                key,
                "skipping insert; the cache was invalidated during load"
            );
            return Ok(value);
        }

        let ttl = policy.ttl.unwrap_or(self.default_ttl);
        let entry = ObjectEntry {
            value: Arc::new(value.clone()),
            expires_at: Instant::now() + ttl,
            tags: policy.tags,
        };
        if let Some((evicted, _)) = state.entries.push(key.to_string(), entry)
            && evicted != key
        {
            counter!(METRIC_OBJECT_EVICT).increment(1);
        }

        Ok(value)
    }

    fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut state = rw_write(&self.state, SOURCE, "get");
        let expired = match state.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return entry.value.downcast_ref::<T>().cloned();
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.pop(key);
        }
        None
    }

    /// Drop every entry tagged with `tag` and fence out in-flight loads.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = rw_write(&self.state, SOURCE, "invalidate_tag");
        *state.epochs.entry(tag.to_string()).or_insert(0) += 1;

        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.iter().any(|t| t == tag))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.entries.pop(key);
        }
        doomed.len()
    }

    /// Remove a single key regardless of tags.
    pub fn invalidate_key(&self, key: &str) {
        rw_write(&self.state, SOURCE, "invalidate_key").entries.pop(key);
    }

    pub fn clear(&self) {
        let mut state = rw_write(&self.state, SOURCE, "clear");
        state.entries.clear();
        state.generation += 1;
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Response cache
// ============================================================================

/// Cached HTTP response.
#[derive(Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

struct ResponseEntry {
    response: CachedResponse,
    tags: HashSet<String>,
    expires_at: Instant,
}

struct ResponseState {
    entries: LruCache<ResponseKey, ResponseEntry>,
    /// Bumped by every invalidation; a render that straddles one is not stored.
    generation: u64,
}

/// Path-keyed response storage used by the response cache middleware.
pub struct ResponseStore {
    ttl: Duration,
    state: RwLock<ResponseState>,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.default_ttl,
            state: RwLock::new(ResponseState {
                entries: LruCache::new(config.response_limit),
                generation: 0,
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        rw_read(&self.state, SOURCE, "response_generation").generation
    }

    pub fn get(&self, key: &ResponseKey) -> Option<CachedResponse> {
        let mut state = rw_write(&self.state, SOURCE, "response_get");
        let hit = match state.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                state.entries.pop(key);
                None
            }
            None => None,
        };
        let metric = if hit.is_some() {
            METRIC_RESPONSE_HIT
        } else {
            METRIC_RESPONSE_MISS
        };
        counter!(metric).increment(1);
        hit
    }

    /// Store a response rendered while `generation` was current. Returns false
    /// when an invalidation happened in between and the response was dropped.
    pub fn insert(
        &self,
        key: ResponseKey,
        response: CachedResponse,
        tags: HashSet<String>,
        generation: u64,
    ) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "response_insert");
        if state.generation != generation {
            return false;
        }
        state.entries.push(
            key,
            ResponseEntry {
                response,
                tags,
                expires_at: Instant::now() + self.ttl,
            },
        );
        true
    }

    /// Drop all entries for `path` (any query). `/` clears the whole store.
    pub fn invalidate_path(&self, path: &str) -> usize {
        let mut state = rw_write(&self.state, SOURCE, "response_invalidate_path");
        state.generation += 1;
        if path == "/" {
            let count = state.entries.len();
            state.entries.clear();
            return count;
        }
        let doomed: Vec<ResponseKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.entries.pop(key);
        }
        doomed.len()
    }

    /// Drop all entries whose handler recorded `tag`.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = rw_write(&self.state, SOURCE, "response_invalidate_tag");
        state.generation += 1;
        let doomed: Vec<ResponseKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.contains(tag))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut state = rw_write(&self.state, SOURCE, "response_clear");
        state.generation += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "response_len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
