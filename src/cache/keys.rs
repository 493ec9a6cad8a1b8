//! Cache keys and invalidation tags.
//!
//! Tags are plain strings so the same names address object-cache entries and
//! response-cache entries.

use uuid::Uuid;

pub const TAG_POSTS: &str = "posts";
pub const TAG_ALL_POSTS: &str = "all-posts";
pub const TAG_CATEGORIES: &str = "categories";
pub const TAG_SITE_SETTINGS: &str = "site-settings";
pub const TAG_USERS: &str = "users";
pub const TAG_DASHBOARD: &str = "dashboard";

pub const KEY_POSTS_ALL: &str = "posts:all";
pub const KEY_CATEGORIES: &str = "categories";
pub const KEY_SITE_SETTINGS: &str = "site-settings";
pub const KEY_DASHBOARD_STATS: &str = "dashboard:stats";

pub fn category_tag(id: Uuid) -> String {
    format!("category-{id}")
}

pub fn post_tag(slug: &str) -> String {
    format!("post-{slug}")
}

/// Object-cache and dedup key for a published listing.
pub fn published_posts_key(category: Option<Uuid>) -> String {
    match category {
        Some(id) => format!("posts:category:{id}"),
        None => KEY_POSTS_ALL.to_string(),
    }
}

pub fn post_slug_key(slug: &str) -> String {
    format!("post:slug:{slug}")
}

/// Response-cache key: request path plus the raw query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub path: String,
    pub query: Option<String>,
}

impl ResponseKey {
    pub fn new(path: impl Into<String>, query: Option<&str>) -> Self {
        Self {
            path: path.into(),
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        }
    }
}
