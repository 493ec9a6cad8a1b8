//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    CategoryRecord, PostRecord, PostWithRelations, RecentPost, RoleRecord, SiteSettingsRecord,
    UserRecord,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexablePostsFilter {
    pub updated_since: Option<OffsetDateTime>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Every post, newest first, with category and author joined.
    async fn list_posts(&self) -> Result<Vec<PostWithRelations>, RepoError>;

    /// Published posts, newest first, optionally restricted to one category.
    async fn list_published(
        &self,
        category: Option<Uuid>,
    ) -> Result<Vec<PostWithRelations>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    async fn find_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<PostWithRelations>, RepoError>;

    /// Published posts ordered by `updated_at` descending.
    async fn list_indexable(
        &self,
        filter: &IndexablePostsFilter,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Distinct non-null category ids owning any of `ids`.
    async fn category_ids_for(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, RepoError>;

    /// `None` counts every post.
    async fn count_posts(&self, published: Option<bool>) -> Result<u64, RepoError>;

    async fn recent_posts(&self, limit: u32) -> Result<Vec<RecentPost>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    /// Returns the deleted row.
    async fn delete_post(&self, id: Uuid) -> Result<PostRecord, RepoError>;

    async fn set_published(&self, id: Uuid, published: bool) -> Result<PostRecord, RepoError>;

    /// Set `created_at` and `updated_at` to `at`; returns the number of rows changed.
    async fn touch_post_dates(&self, ids: &[Uuid], at: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError>;

    async fn count_categories(&self) -> Result<u64, RepoError>;

    async fn create_category(&self, name: &str) -> Result<CategoryRecord, RepoError>;

    async fn update_category(&self, id: Uuid, name: &str) -> Result<CategoryRecord, RepoError>;

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn count_users(&self) -> Result<u64, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> Result<UserRecord, RepoError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str)
    -> Result<(), RepoError>;
}

#[async_trait]
pub trait RolesRepo: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepoError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<RoleRecord>, RepoError>;

    /// Insert the role or replace its permissions.
    async fn upsert_role(&self, name: &str, permissions: &[String])
    -> Result<RoleRecord, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpdateSettingsParams {
    pub site_name: String,
    pub site_description: String,
    pub site_url: Option<String>,
    pub robots_index: bool,
    pub robots_follow: bool,
    pub revisit_after_days: i32,
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// The singleton row, or defaults when it has never been written.
    async fn load_site_settings(&self) -> Result<SiteSettingsRecord, RepoError>;

    async fn upsert_site_settings(
        &self,
        params: UpdateSettingsParams,
    ) -> Result<SiteSettingsRecord, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    /// Round-trip a trivial query through the shared connection.
    async fn health_check(&self) -> Result<(), RepoError>;
}
