#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use inkpost::application::admin::{
    categories::AdminCategoryService, posts::AdminPostService, settings::AdminSettingsService,
    users::AdminUserService,
};
use inkpost::application::blog::BlogService;
use inkpost::application::dashboard::DashboardService;
use inkpost::application::indexing::IndexingService;
use inkpost::application::repos::{
    CategoriesRepo, CreatePostParams, CreateUserParams, HealthRepo, IndexablePostsFilter,
    PostsRepo, PostsWriteRepo, RepoError, RolesRepo, SettingsRepo, UpdatePostParams,
    UpdateSettingsParams, UsersRepo,
};
use inkpost::application::sitemap::SitemapService;
use inkpost::cache::{CacheConfig, CacheState, InvalidationCoordinator, ResponseStore, TaggedCache};
use inkpost::domain::entities::{
    AuthorRef, CategoryRecord, CategoryRef, PostRecord, PostWithRelations, RecentPost, RoleRecord,
    SiteSettingsRecord, UserRecord,
};
use inkpost::infra::http::{AdminState, HttpState, build_admin_router, build_router};

pub const PUBLIC_URL: &str = "https://blog.example";

#[derive(Default)]
struct State {
    posts: HashMap<Uuid, PostRecord>,
    categories: HashMap<Uuid, CategoryRecord>,
    users: HashMap<Uuid, UserRecord>,
    roles: HashMap<String, RoleRecord>,
    settings: Option<SiteSettingsRecord>,
}

/// Every repository trait over one in-memory table set.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub listing_queries: AtomicUsize,
    pub unhealthy: AtomicBool,
    pub listing_delay_ms: AtomicUsize,
}

impl MemoryStore {
    pub async fn seed_category(&self, name: &str) -> CategoryRecord {
        let now = OffsetDateTime::now_utc();
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .categories
            .insert(record.id, record.clone());
        record
    }

    pub async fn seed_post(
        &self,
        title: &str,
        slug: &str,
        published: bool,
        category_id: Option<Uuid>,
        created_at: OffsetDateTime,
    ) -> PostRecord {
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slug.to_string(),
            content: "Body text.".to_string(),
            excerpt: None,
            published,
            category_id,
            author_id: None,
            featured_image: None,
            created_at,
            updated_at: created_at,
        };
        self.state.lock().await.posts.insert(record.id, record.clone());
        record
    }

    pub async fn post(&self, id: Uuid) -> Option<PostRecord> {
        self.state.lock().await.posts.get(&id).cloned()
    }

    /// Write behind the services' back, as another process would.
    pub async fn rename_post_directly(&self, id: Uuid, title: &str) {
        if let Some(post) = self.state.lock().await.posts.get_mut(&id) {
            post.title = title.to_string();
        }
    }

    fn with_relations(state: &State, post: &PostRecord) -> PostWithRelations {
        PostWithRelations {
            post: post.clone(),
            category: post
                .category_id
                .and_then(|id| state.categories.get(&id))
                .map(|category| CategoryRef {
                    id: category.id,
                    name: category.name.clone(),
                }),
            author: post
                .author_id
                .and_then(|id| state.users.get(&id))
                .map(|user| AuthorRef {
                    id: user.id,
                    name: user.name.clone(),
                    email: user.email.clone(),
                }),
        }
    }

    fn newest_first(posts: &mut [PostRecord]) {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(&self) -> Result<Vec<PostWithRelations>, RepoError> {
        let state = self.state.lock().await;
        let mut posts: Vec<PostRecord> = state.posts.values().cloned().collect();
        Self::newest_first(&mut posts);
        Ok(posts
            .iter()
            .map(|post| Self::with_relations(&state, post))
            .collect())
    }

    async fn list_published(
        &self,
        category: Option<Uuid>,
    ) -> Result<Vec<PostWithRelations>, RepoError> {
        self.listing_queries.fetch_add(1, Ordering::SeqCst);
        // Read first, then stall: a slow query returns what it saw when it started.
        let listing: Vec<PostWithRelations> = {
            let state = self.state.lock().await;
            let mut posts: Vec<PostRecord> = state
                .posts
                .values()
                .filter(|post| post.published)
                .filter(|post| category.is_none() || post.category_id == category)
                .cloned()
                .collect();
            Self::newest_first(&mut posts);
            posts
                .iter()
                .map(|post| Self::with_relations(&state, post))
                .collect()
        };
        let delay = self.listing_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        Ok(listing)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.state.lock().await.posts.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .await
            .posts
            .values()
            .find(|post| post.slug == slug)
            .cloned())
    }

    async fn find_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<PostWithRelations>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .values()
            .find(|post| post.published && post.slug == slug)
            .map(|post| Self::with_relations(&state, post)))
    }

    async fn list_indexable(
        &self,
        filter: &IndexablePostsFilter,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut posts: Vec<PostRecord> = self
            .state
            .lock()
            .await
            .posts
            .values()
            .filter(|post| post.published)
            .filter(|post| {
                filter
                    .updated_since
                    .is_none_or(|since| post.updated_at >= since)
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            posts.truncate(limit as usize);
        }
        Ok(posts)
    }

    async fn category_ids_for(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, RepoError> {
        let state = self.state.lock().await;
        let mut categories: Vec<Uuid> = ids
            .iter()
            .filter_map(|id| state.posts.get(id))
            .filter_map(|post| post.category_id)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn count_posts(&self, published: Option<bool>) -> Result<u64, RepoError> {
        Ok(self
            .state
            .lock()
            .await
            .posts
            .values()
            .filter(|post| published.is_none_or(|flag| post.published == flag))
            .count() as u64)
    }

    async fn recent_posts(&self, limit: u32) -> Result<Vec<RecentPost>, RepoError> {
        let mut posts: Vec<PostRecord> =
            self.state.lock().await.posts.values().cloned().collect();
        Self::newest_first(&mut posts);
        Ok(posts
            .into_iter()
            .take(limit as usize)
            .map(|post| RecentPost {
                id: post.id,
                title: post.title,
                slug: post.slug,
                published: post.published,
                created_at: post.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.posts.values().any(|post| post.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "posts_slug_key".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            content: params.content,
            excerpt: params.excerpt,
            published: params.published,
            category_id: params.category_id,
            author_id: params.author_id,
            featured_image: params.featured_image,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state
            .posts
            .values()
            .any(|post| post.slug == params.slug && post.id != params.id)
        {
            return Err(RepoError::Duplicate {
                constraint: "posts_slug_key".into(),
            });
        }
        let post = state.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.title = params.title;
        post.slug = params.slug;
        post.content = params.content;
        post.excerpt = params.excerpt;
        post.published = params.published;
        post.category_id = params.category_id;
        post.author_id = params.author_id;
        post.featured_image = params.featured_image;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<PostRecord, RepoError> {
        self.state
            .lock()
            .await
            .posts
            .remove(&id)
            .ok_or(RepoError::NotFound)
    }

    async fn set_published(&self, id: Uuid, published: bool) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.published = published;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn touch_post_dates(&self, ids: &[Uuid], at: OffsetDateTime) -> Result<u64, RepoError> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for id in ids {
            if let Some(post) = state.posts.get_mut(id) {
                post.created_at = at;
                post.updated_at = at;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl CategoriesRepo for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut categories: Vec<CategoryRecord> =
            self.state.lock().await.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn count_categories(&self) -> Result<u64, RepoError> {
        Ok(self.state.lock().await.categories.len() as u64)
    }

    async fn create_category(&self, name: &str) -> Result<CategoryRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|category| category.name == name) {
            return Err(RepoError::Duplicate {
                constraint: "categories_name_key".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_category(&self, id: Uuid, name: &str) -> Result<CategoryRecord, RepoError> {
        let mut state = self.state.lock().await;
        let category = state.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
        category.name = name.to_string();
        category.updated_at = OffsetDateTime::now_utc();
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.categories.remove(&id).ok_or(RepoError::NotFound)?;
        for post in state.posts.values_mut() {
            if post.category_id == Some(id) {
                post.category_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        let mut users: Vec<UserRecord> = self.state.lock().await.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn count_users(&self) -> Result<u64, RepoError> {
        Ok(self.state.lock().await.users.len() as u64)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.email == params.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".into(),
            });
        }
        let role_name = params.role_id.and_then(|id| {
            state
                .roles
                .values()
                .find(|role| role.id == id)
                .map(|role| role.name.clone())
        });
        let now = OffsetDateTime::now_utc();
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: params.name,
            email: params.email,
            password_hash: Some(params.password_hash),
            role_id: params.role_id,
            role_name,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        let role_name = state
            .roles
            .values()
            .find(|role| role.id == role_id)
            .map(|role| role.name.clone());
        let user = state.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        user.role_id = Some(role_id);
        user.role_name = role_name;
        Ok(user.clone())
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }
}

#[async_trait]
impl RolesRepo for MemoryStore {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepoError> {
        let mut roles: Vec<RoleRecord> = self.state.lock().await.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<RoleRecord>, RepoError> {
        Ok(self.state.lock().await.roles.get(name).cloned())
    }

    async fn upsert_role(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<RoleRecord, RepoError> {
        let mut state = self.state.lock().await;
        let role = state
            .roles
            .entry(name.to_string())
            .or_insert_with(|| RoleRecord {
                id: Uuid::new_v4(),
                name: name.to_string(),
                permissions: Vec::new(),
            });
        role.permissions = permissions.to_vec();
        Ok(role.clone())
    }
}

#[async_trait]
impl SettingsRepo for MemoryStore {
    async fn load_site_settings(&self) -> Result<SiteSettingsRecord, RepoError> {
        Ok(self.state.lock().await.settings.clone().unwrap_or_default())
    }

    async fn upsert_site_settings(
        &self,
        params: UpdateSettingsParams,
    ) -> Result<SiteSettingsRecord, RepoError> {
        let record = SiteSettingsRecord {
            site_name: params.site_name,
            site_description: params.site_description,
            site_url: params.site_url,
            robots_index: params.robots_index,
            robots_follow: params.robots_follow,
            revisit_after_days: params.revisit_after_days,
            updated_at: OffsetDateTime::now_utc(),
        };
        self.state.lock().await.settings = Some(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

/// Public and admin routers wired the way the server wires them.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub public: Router,
    pub admin: Router,
    pub objects: Arc<TaggedCache>,
    pub responses: Arc<ResponseStore>,
    pub invalidation: InvalidationCoordinator,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn uncached() -> Self {
        Self::with_cache(CacheConfig {
            enable_object_cache: false,
            enable_response_cache: false,
            ..CacheConfig::default()
        })
    }

    pub fn with_cache(cache_config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let objects = Arc::new(TaggedCache::new(&cache_config));
        let responses = Arc::new(ResponseStore::new(&cache_config));

        let blog = Arc::new(BlogService::new(
            store.clone(),
            objects.clone(),
            cache_config.dedup_timeout,
        ));
        let invalidation = InvalidationCoordinator::new(blog.invalidators())
            .with_backend(objects.clone())
            .with_backend(responses.clone());

        let indexing = IndexingService::disabled(PUBLIC_URL);
        let categories =
            AdminCategoryService::new(store.clone(), objects.clone(), invalidation.clone());
        let settings =
            AdminSettingsService::new(store.clone(), objects.clone(), invalidation.clone());
        let users = Arc::new(
            AdminUserService::new(store.clone(), store.clone(), invalidation.clone())
                .with_bcrypt_cost(4),
        );
        let posts = Arc::new(AdminPostService::new(
            store.clone(),
            store.clone(),
            invalidation.clone(),
            indexing.clone(),
        ));
        let dashboard = Arc::new(DashboardService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            objects.clone(),
        ));
        let sitemap = Arc::new(SitemapService::new(
            store.clone(),
            categories.clone(),
            settings.clone(),
            PUBLIC_URL,
        ));

        let cache_state = cache_config.enable_response_cache.then(|| CacheState {
            config: cache_config.clone(),
            responses: responses.clone(),
        });
        let categories = Arc::new(categories);
        let settings = Arc::new(settings);

        let public = build_router(HttpState {
            blog,
            categories: categories.clone(),
            settings: settings.clone(),
            users: users.clone(),
            sitemap,
            health: store.clone(),
            public_url: Arc::from(PUBLIC_URL),
            cache: cache_state,
        });
        let admin = build_admin_router(AdminState {
            health: store.clone(),
            dashboard,
            posts,
            categories,
            users,
            settings,
            indexing: Arc::new(indexing),
            invalidation: invalidation.clone(),
        });

        Self {
            store,
            public,
            admin,
            objects,
            responses,
            invalidation,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("response body should be JSON")
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(router, request).await
}

pub async fn send_json(router: &Router, method: Method, uri: &str, body: Value) -> TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(router, request).await
}

pub async fn delete(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(router, request).await
}
