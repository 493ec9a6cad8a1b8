//! Post-mutation cache invalidation.
//!
//! Mutations hand an [`InvalidationSet`] to the [`InvalidationCoordinator`],
//! which fans it out to every registered [`CacheInvalidator`]. Every tag and
//! path is attempted on every backend; failures are logged and counted but
//! never returned to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dedup::{DedupError, RequestDeduplicator};
use super::keys::{
    TAG_ALL_POSTS, TAG_CATEGORIES, TAG_DASHBOARD, TAG_POSTS, TAG_SITE_SETTINGS, TAG_USERS,
    category_tag, post_tag,
};
use super::store::{ResponseStore, TaggedCache};

const METRIC_INVALIDATION_FAILED: &str = "inkpost_invalidation_failed_total";

pub const PATH_ROOT: &str = "/";
pub const PATH_BLOG: &str = "/blog";
pub const PATH_DASHBOARD_BLOG: &str = "/dashboard/blog";
pub const PATH_DASHBOARD_CATEGORY: &str = "/dashboard/category";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidationError {
    #[error("cache backend `{backend}` failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// A cache layer that can drop entries by tag or by path.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invalidate_tag(&self, tag: &str) -> Result<(), InvalidationError>;

    async fn invalidate_path(&self, path: &str) -> Result<(), InvalidationError>;
}

#[async_trait]
impl CacheInvalidator for TaggedCache {
    fn name(&self) -> &'static str {
        "object"
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), InvalidationError> {
        let removed = TaggedCache::invalidate_tag(self, tag);
        debug!(target: "inkpost::cache", tag, removed, "object cache tag invalidated");
        Ok(())
    }

    // Object entries are addressed by key; only the layout root maps onto them.
    async fn invalidate_path(&self, path: &str) -> Result<(), InvalidationError> {
        if path == PATH_ROOT {
            self.clear();
            debug!(target: "inkpost::cache", "object cache cleared");
        }
        Ok(())
    }
}

#[async_trait]
impl CacheInvalidator for ResponseStore {
    fn name(&self) -> &'static str {
        "response"
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), InvalidationError> {
        let removed = ResponseStore::invalidate_tag(self, tag);
        debug!(target: "inkpost::cache", tag, removed, "response cache tag invalidated");
        Ok(())
    }

    async fn invalidate_path(&self, path: &str) -> Result<(), InvalidationError> {
        let removed = ResponseStore::invalidate_path(self, path);
        debug!(target: "inkpost::cache", path, removed, "response cache path invalidated");
        Ok(())
    }
}

// Dedup keys carry no tags, so any invalidation detaches every in-flight
// read. Register this backend ahead of the object cache: a caller that joins
// a pre-invalidation read must have snapshotted the pre-invalidation epochs.
#[async_trait]
impl<T, E> CacheInvalidator for RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<DedupError> + 'static,
{
    fn name(&self) -> &'static str {
        "dedup"
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), InvalidationError> {
        let detached = self.forget_all();
        debug!(target: "inkpost::cache", tag, detached, "in-flight reads detached");
        Ok(())
    }

    async fn invalidate_path(&self, _path: &str) -> Result<(), InvalidationError> {
        self.forget_all();
        Ok(())
    }
}

/// Tags and paths touched by one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    pub tags: Vec<String>,
    pub paths: Vec<String>,
}

impl InvalidationSet {
    /// Post create, update, delete or publish toggle.
    ///
    /// `categories` should hold both the previous and the new owning category.
    pub fn for_post<I>(slug: Option<&str>, categories: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut set = Self::default();
        set.push_tags([TAG_POSTS, TAG_ALL_POSTS, TAG_DASHBOARD]);
        for id in categories {
            set.push_tag(category_tag(id));
        }
        set.push_paths([PATH_DASHBOARD_BLOG, PATH_BLOG]);
        if let Some(slug) = slug {
            set.push_tag(post_tag(slug));
            set.push_path(format!("{PATH_BLOG}/{slug}"));
        }
        set
    }

    /// Bulk date changes reorder every listing, so the layout root goes too.
    pub fn for_bulk_post_dates<I>(categories: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut set = Self::for_post(None, categories);
        set.push_path(PATH_ROOT);
        set
    }

    pub fn for_category() -> Self {
        let mut set = Self::default();
        set.push_tags([TAG_CATEGORIES, TAG_DASHBOARD]);
        set.push_path(PATH_DASHBOARD_CATEGORY);
        set
    }

    pub fn for_settings() -> Self {
        let mut set = Self::default();
        set.push_tag(TAG_SITE_SETTINGS);
        set
    }

    pub fn for_users() -> Self {
        let mut set = Self::default();
        set.push_tags([TAG_USERS, TAG_DASHBOARD]);
        set
    }

    pub fn merge(mut self, other: Self) -> Self {
        for tag in other.tags {
            self.push_tag(tag);
        }
        for path in other.paths {
            self.push_path(path);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.paths.is_empty()
    }

    fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    fn push_tags<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        for tag in tags {
            self.push_tag(tag);
        }
    }

    fn push_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    fn push_paths<'a>(&mut self, paths: impl IntoIterator<Item = &'a str>) {
        for path in paths {
            self.push_path(path);
        }
    }
}

/// Outcome counts for one invalidation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub attempted: usize,
    pub failed: usize,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Clone, Default)]
pub struct InvalidationCoordinator {
    backends: Vec<Arc<dyn CacheInvalidator>>,
}

impl InvalidationCoordinator {
    pub fn new(backends: Vec<Arc<dyn CacheInvalidator>>) -> Self {
        Self { backends }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CacheInvalidator>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Attempt every tag then every path on every backend.
    pub async fn invalidate(&self, tags: &[String], paths: &[String]) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for backend in &self.backends {
            for tag in tags {
                report.attempted += 1;
                if let Err(err) = backend.invalidate_tag(tag).await {
                    report.failed += 1;
                    counter!(METRIC_INVALIDATION_FAILED, "kind" => "tag").increment(1);
                    warn!(
                        target: "inkpost::cache",
                        backend = backend.name(),
                        tag = tag.as_str(),
                        error = %err,
                        "cache tag invalidation failed"
                    );
                }
            }
            for path in paths {
                report.attempted += 1;
                if let Err(err) = backend.invalidate_path(path).await {
                    report.failed += 1;
                    counter!(METRIC_INVALIDATION_FAILED, "kind" => "path").increment(1);
                    warn!(
                        target: "inkpost::cache",
                        backend = backend.name(),
                        path = path.as_str(),
                        error = %err,
                        "cache path invalidation failed"
                    );
                }
            }
        }

        debug!(
            target: "inkpost::cache",
            attempted = report.attempted,
            failed = report.failed,
            "cache invalidation finished"
        );
        report
    }

    pub async fn apply(&self, set: &InvalidationSet) -> InvalidationReport {
        self.invalidate(&set.tags, &set.paths).await
    }

    /// Drop everything every backend holds.
    pub async fn invalidate_all(&self) -> InvalidationReport {
        self.invalidate(&[], &[PATH_ROOT.to_string()]).await
    }
}
