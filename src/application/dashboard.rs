//! Dashboard statistics.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::application::repos::{CategoriesRepo, PostsRepo, RepoError, UsersRepo};
use crate::cache::{
    CachePolicy, TaggedCache,
    keys::{KEY_DASHBOARD_STATS, TAG_DASHBOARD},
};
use crate::domain::entities::RecentPost;

pub const RECENT_POSTS_LIMIT: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_posts: u64,
    pub published_posts: u64,
    pub draft_posts: u64,
    pub total_categories: u64,
    pub total_users: u64,
    pub recent_posts: Vec<RecentPost>,
}

#[derive(Clone)]
pub struct DashboardService {
    posts: Arc<dyn PostsRepo>,
    categories: Arc<dyn CategoriesRepo>,
    users: Arc<dyn UsersRepo>,
    cache: Arc<TaggedCache>,
}

impl DashboardService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        categories: Arc<dyn CategoriesRepo>,
        users: Arc<dyn UsersRepo>,
        cache: Arc<TaggedCache>,
    ) -> Self {
        Self {
            posts,
            categories,
            users,
            cache,
        }
    }

    /// Never fails: query errors are logged and reported as zeroed stats,
    /// which are not cached.
    pub async fn stats(&self) -> DashboardStats {
        let loaded = self
            .cache
            .get_or_load(
                KEY_DASHBOARD_STATS,
                CachePolicy::tagged([TAG_DASHBOARD]),
                || self.load(),
            )
            .await;

        match loaded {
            Ok(stats) => stats,
            Err(err) => {
                error!(
                    target: "inkpost::admin",
                    error = %err,
                    "failed to load dashboard statistics"
                );
                DashboardStats::default()
            }
        }
    }

    async fn load(&self) -> Result<DashboardStats, RepoError> {
        let (total_posts, published_posts, draft_posts, total_categories, total_users, recent) =
            futures::try_join!(
                self.posts.count_posts(None),
                self.posts.count_posts(Some(true)),
                self.posts.count_posts(Some(false)),
                self.categories.count_categories(),
                self.users.count_users(),
                self.posts.recent_posts(RECENT_POSTS_LIMIT),
            )?;

        Ok(DashboardStats {
            total_posts,
            published_posts,
            draft_posts,
            total_categories,
            total_users,
            recent_posts: recent,
        })
    }
}
