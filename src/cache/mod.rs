//! Inkpost cache system.
//!
//! - **Object cache** ([`TaggedCache`]): query results with TTL and tags.
//! - **Response cache** ([`ResponseStore`] + [`response_cache_layer`]):
//!   rendered public responses keyed by path.
//! - **Request deduplication** ([`RequestDeduplicator`]).
//! - **Invalidation** ([`InvalidationCoordinator`]) fanning tags and paths out
//!   to both cache layers after a write.

mod config;
mod dedup;
pub mod deps;
mod invalidation;
pub mod keys;
pub(crate) mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use dedup::{DedupError, RequestDeduplicator};
pub use invalidation::{
    CacheInvalidator, InvalidationCoordinator, InvalidationError, InvalidationReport,
    InvalidationSet,
};
pub use keys::ResponseKey;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachePolicy, CachedResponse, ResponseStore, TaggedCache};
