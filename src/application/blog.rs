//! Public blog reads.
//!
//! Listings go through the object cache and the request deduplicator so a
//! burst of identical cold requests costs one query.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{PostsRepo, RepoError};
use crate::cache::{
    CacheInvalidator, CachePolicy, DedupError, RequestDeduplicator, TaggedCache,
    keys::{TAG_ALL_POSTS, TAG_POSTS, category_tag, post_slug_key, post_tag, published_posts_key},
};
use crate::domain::entities::PostWithRelations;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlogError {
    #[error("post `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Dedup(#[from] DedupError),
}

pub type PostList = Arc<Vec<PostWithRelations>>;

#[derive(Clone)]
pub struct BlogService {
    posts: Arc<dyn PostsRepo>,
    cache: Arc<TaggedCache>,
    listings: RequestDeduplicator<PostList, BlogError>,
    pages: RequestDeduplicator<Arc<PostWithRelations>, BlogError>,
}

impl BlogService {
    pub fn new(posts: Arc<dyn PostsRepo>, cache: Arc<TaggedCache>, dedup_timeout: Duration) -> Self {
        Self {
            posts,
            cache,
            listings: RequestDeduplicator::new(dedup_timeout),
            pages: RequestDeduplicator::new(dedup_timeout),
        }
    }

    /// In-flight read tables, to be registered with the invalidation
    /// coordinator ahead of the object cache.
    pub fn invalidators(&self) -> Vec<Arc<dyn CacheInvalidator>> {
        vec![
            Arc::new(self.listings.clone()) as Arc<dyn CacheInvalidator>,
            Arc::new(self.pages.clone()),
        ]
    }

    /// Published posts, newest first, optionally restricted to one category.
    pub async fn published_posts(&self, category: Option<Uuid>) -> Result<PostList, BlogError> {
        let key = published_posts_key(category);
        let mut tags = vec![TAG_POSTS.to_string(), TAG_ALL_POSTS.to_string()];
        if let Some(id) = category {
            tags.push(category_tag(id));
        }

        let posts = Arc::clone(&self.posts);
        let listings = self.listings.clone();
        self.cache
            .get_or_load(&key, CachePolicy::tagged(tags), || async {
                listings
                    .dedupe(&key, move || async move {
                        posts
                            .list_published(category)
                            .await
                            .map(Arc::new)
                            .map_err(BlogError::from)
                    })
                    .await
            })
            .await
    }

    pub async fn post_by_slug(&self, slug: &str) -> Result<Arc<PostWithRelations>, BlogError> {
        let key = post_slug_key(slug);
        let posts = Arc::clone(&self.posts);
        let pages = self.pages.clone();
        let owned = slug.to_string();

        self.cache
            .get_or_load(
                &key,
                CachePolicy::tagged([TAG_POSTS.to_string(), post_tag(slug)]),
                || async {
                    pages
                        .dedupe(&key, move || async move {
                            posts
                                .find_published_by_slug(&owned)
                                .await?
                                .map(Arc::new)
                                .ok_or(BlogError::NotFound(owned))
                        })
                        .await
                },
            )
            .await
    }
}
