//! Runtime cache configuration derived from `[cache]` settings.

use std::{num::NonZeroUsize, time::Duration};

use crate::config::{
    CacheSettings, DEFAULT_CACHE_TTL_SECS, DEFAULT_DEDUP_TIMEOUT_MS, DEFAULT_OBJECT_LIMIT,
    DEFAULT_RESPONSE_LIMIT,
};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable the tagged object cache.
    pub enable_object_cache: bool,
    /// Enable the path-keyed response cache.
    pub enable_response_cache: bool,
    /// TTL applied when a policy does not set one.
    pub default_ttl: Duration,
    /// Window during which an in-flight request may be joined.
    pub dedup_timeout: Duration,
    pub object_limit: NonZeroUsize,
    pub response_limit: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            enable_response_cache: true,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            dedup_timeout: Duration::from_millis(DEFAULT_DEDUP_TIMEOUT_MS),
            object_limit: NonZeroUsize::new(DEFAULT_OBJECT_LIMIT).unwrap_or(NonZeroUsize::MIN),
            response_limit: NonZeroUsize::new(DEFAULT_RESPONSE_LIMIT)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enable_object_cache: settings.enable_object_cache,
            enable_response_cache: settings.enable_response_cache,
            default_ttl: settings.default_ttl,
            dedup_timeout: settings.dedup_timeout,
            object_limit: settings.object_limit,
            response_limit: settings.response_limit,
        }
    }
}

impl CacheConfig {
    /// Returns true if any cache layer is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_object_cache || self.enable_response_cache
    }
}
