mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::http::{Method, StatusCode, header::CONTENT_TYPE};
use serde_json::json;
use time::OffsetDateTime;

use inkpost::application::admin::posts::{AdminPostService, CreatePostCommand};
use inkpost::application::indexing::IndexingService;
use inkpost::cache::{CacheInvalidator, InvalidationCoordinator, InvalidationError};

use support::{MemoryStore, PUBLIC_URL, TestApp, delete, get, send_json};

#[tokio::test]
async fn created_posts_are_served_publicly_once_published() {
    let app = TestApp::new();

    let created = send_json(
        &app.admin,
        Method::POST,
        "/posts",
        json!({
            "title": "Hello World",
            "content": "First paragraph.\n\nSecond paragraph.",
            "published": true
        }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["slug"], "hello-world");
    assert_eq!(body["published"], true);

    let page = get(&app.public, "/blog/hello-world").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Hello World"));
    assert!(page.body.contains("<p>Second paragraph.</p>"));

    let listing = get(&app.public, "/blog").await;
    assert_eq!(listing.status, StatusCode::OK);
    assert!(listing.body.contains("/blog/hello-world"));
}

#[tokio::test]
async fn drafts_are_not_reachable_by_slug() {
    let app = TestApp::new();

    let created = send_json(
        &app.admin,
        Method::POST,
        "/posts",
        json!({ "title": "Work in progress", "content": "todo" }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let page = get(&app.public, "/blog/work-in-progress").await;
    assert_eq!(page.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_titles_receive_distinct_slugs() {
    let app = TestApp::new();
    let payload = json!({ "title": "Release notes", "content": "body", "published": true });

    let first = send_json(&app.admin, Method::POST, "/posts", payload.clone()).await;
    let second = send_json(&app.admin, Method::POST, "/posts", payload).await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(first.json()["slug"], "release-notes");
    assert_ne!(second.json()["slug"], "release-notes");
}

#[tokio::test]
async fn invalid_posts_are_rejected_with_a_validation_error() {
    let app = TestApp::new();

    let response = send_json(
        &app.admin,
        Method::POST,
        "/posts",
        json!({ "title": "   ", "content": "body" }),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["message"], "Title is required");
}

#[tokio::test]
async fn toggling_publication_hides_the_post() {
    let app = TestApp::new();
    let post = app
        .store
        .seed_post("Visible", "visible", true, None, OffsetDateTime::now_utc())
        .await;

    assert_eq!(get(&app.public, "/blog/visible").await.status, StatusCode::OK);

    let toggled = send_json(
        &app.admin,
        Method::POST,
        &format!("/posts/{}/toggle-published", post.id),
        json!({ "current": true }),
    )
    .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.json()["published"], false);

    assert_eq!(
        get(&app.public, "/blog/visible").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn deleting_unknown_posts_is_not_found() {
    let app = TestApp::new();

    let response = delete(&app.admin, &format!("/posts/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"]["code"], "not_found");
}

#[tokio::test]
async fn bulk_date_updates_validate_ids() {
    let app = TestApp::new();

    let empty = send_json(
        &app.admin,
        Method::POST,
        "/posts/bulk-dates",
        json!({ "ids": [] }),
    )
    .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.json()["error"]["message"], "No post IDs provided");

    let malformed = send_json(
        &app.admin,
        Method::POST,
        "/posts/bulk-dates",
        json!({ "ids": ["nope"] }),
    )
    .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        malformed.json()["error"]["message"],
        "Invalid post ID format: nope"
    );
}

#[tokio::test]
async fn bulk_date_updates_move_posts_to_the_top() {
    let app = TestApp::new();
    let old = app
        .store
        .seed_post(
            "Old news",
            "old-news",
            true,
            None,
            OffsetDateTime::UNIX_EPOCH,
        )
        .await;
    app.store
        .seed_post("Fresh", "fresh", true, None, OffsetDateTime::now_utc())
        .await;

    let before = get(&app.public, "/blog").await.body;
    assert!(before.find("/blog/fresh") < before.find("/blog/old-news"));

    let response = send_json(
        &app.admin,
        Method::POST,
        "/posts/bulk-dates",
        json!({ "ids": [old.id.to_string()] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["updated_count"], 1);
    assert_eq!(body["message"], "Updated 1 post(s) date to now");

    let after = get(&app.public, "/blog").await.body;
    assert!(after.find("/blog/old-news") < after.find("/blog/fresh"));
}

#[tokio::test]
async fn categories_are_unique_and_listed_publicly() {
    let app = TestApp::new();

    let created = send_json(
        &app.admin,
        Method::POST,
        "/categories",
        json!({ "name": "  Rust " }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json()["name"], "Rust");

    let duplicate = send_json(
        &app.admin,
        Method::POST,
        "/categories",
        json!({ "name": "Rust" }),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let listed = get(&app.public, "/api/categories").await;
    assert_eq!(listed.status, StatusCode::OK);
    let body = listed.json();
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["name"], "Rust");
    assert!(body[0].get("created_at").is_none());
}

#[tokio::test]
async fn deleting_a_category_keeps_its_posts() {
    let app = TestApp::new();
    let category = app.store.seed_category("Ops").await;
    let post = app
        .store
        .seed_post(
            "Runbook",
            "runbook",
            true,
            Some(category.id),
            OffsetDateTime::now_utc(),
        )
        .await;

    let response = delete(&app.admin, &format!("/categories/{}", category.id)).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let remaining = app.store.post(post.id).await.expect("post survives");
    assert_eq!(remaining.category_id, None);

    let page = get(&app.public, "/blog/runbook").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Uncategorized"));
}

#[tokio::test]
async fn registration_assigns_admin_to_the_first_user_only() {
    let app = TestApp::new();

    let first = send_json(
        &app.public,
        Method::POST,
        "/api/register",
        json!({ "name": "Ada", "email": "Ada@Example.com", "password": "secret1" }),
    )
    .await;
    assert_eq!(first.status, StatusCode::CREATED);
    let body = first.json();
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "admin");

    let second = send_json(
        &app.public,
        Method::POST,
        "/api/register",
        json!({ "name": "Bob", "email": "bob@example.com", "password": "secret2" }),
    )
    .await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.json()["user"]["role"], "user");

    let duplicate = send_json(
        &app.public,
        Method::POST,
        "/api/register",
        json!({ "name": "Ada", "email": "ada@example.com", "password": "secret3" }),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert!(duplicate.json()["error"].is_string());

    let users = get(&app.admin, "/users").await;
    assert_eq!(users.status, StatusCode::OK);
    let listed = users.json();
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
    assert!(listed[0].get("password_hash").is_none());
}

#[tokio::test]
async fn registration_requires_every_field() {
    let app = TestApp::new();

    let response = send_json(
        &app.public,
        Method::POST,
        "/api/register",
        json!({ "name": "Ada", "email": "ada@example.com" }),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Missing required fields");
}

#[tokio::test]
async fn assigning_an_unknown_role_is_not_found() {
    let app = TestApp::new();
    let registered = send_json(
        &app.public,
        Method::POST,
        "/api/register",
        json!({ "name": "Ada", "email": "ada@example.com", "password": "secret1" }),
    )
    .await;
    let id = registered.json()["user"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = send_json(
        &app.admin,
        Method::POST,
        &format!("/users/{id}/role"),
        json!({ "role": "overlord" }),
    )
    .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_drive_robots_directives() {
    let app = TestApp::new();

    let updated = send_json(
        &app.admin,
        Method::PUT,
        "/settings",
        json!({
            "site_name": "Field Notes",
            "site_url": "https://notes.example/",
            "robots_index": false,
            "revisit_after_days": 3
        }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["site_url"], "https://notes.example");

    let robots = get(&app.public, "/robots.txt").await;
    assert_eq!(robots.status, StatusCode::OK);
    assert_eq!(
        robots.headers[CONTENT_TYPE].to_str().expect("header"),
        "text/plain; charset=utf-8"
    );
    assert!(robots.body.contains("\nnoindex\n"));
    assert!(robots.body.contains("Crawl-delay: 3\n"));
    assert!(robots.body.ends_with("Sitemap: https://notes.example/sitemap.xml\n"));
}

#[tokio::test]
async fn settings_require_a_site_name() {
    let app = TestApp::new();

    let response = send_json(
        &app.admin,
        Method::PUT,
        "/settings",
        json!({ "site_name": "" }),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"]["message"], "Site name is required");
}

#[tokio::test]
async fn dashboard_counts_posts_by_state() {
    let app = TestApp::new();
    let now = OffsetDateTime::now_utc();
    app.store.seed_post("One", "one", true, None, now).await;
    app.store.seed_post("Two", "two", false, None, now).await;
    app.store.seed_category("News").await;

    let response = get(&app.admin, "/dashboard/stats").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["total_posts"], 2);
    assert_eq!(body["published_posts"], 1);
    assert_eq!(body["draft_posts"], 1);
    assert_eq!(body["total_categories"], 1);
    assert_eq!(body["total_users"], 0);
    assert_eq!(body["recent_posts"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn health_endpoints_follow_the_database() {
    let app = TestApp::new();

    assert_eq!(get(&app.admin, "/health").await.status, StatusCode::NO_CONTENT);
    assert_eq!(
        get(&app.public, "/_health/db").await.status,
        StatusCode::NO_CONTENT
    );

    app.store.unhealthy.store(true, Ordering::SeqCst);

    assert_eq!(
        get(&app.admin, "/health").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        get(&app.public, "/_health/db").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn manual_indexing_requires_a_url_and_credentials() {
    let app = TestApp::new();

    let missing = send_json(
        &app.admin,
        Method::POST,
        "/api/indexing",
        json!({ "url": "ftp://blog.example/post" }),
    )
    .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let unconfigured = send_json(
        &app.admin,
        Method::POST,
        "/api/indexing",
        json!({ "url": "https://blog.example/blog/hello", "type": "URL_UPDATED" }),
    )
    .await;
    assert_eq!(unconfigured.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(unconfigured.json()["success"], false);
}

#[tokio::test]
async fn unknown_pages_and_filters_render_not_found() {
    let app = TestApp::new();

    let missing = get(&app.public, "/nowhere").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(
        missing.headers[CONTENT_TYPE]
            .to_str()
            .expect("header")
            .starts_with("text/html")
    );

    let bad_filter = get(&app.public, "/blog?category=not-a-uuid").await;
    assert_eq!(bad_filter.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_filter_limits_the_listing() {
    let app = TestApp::new();
    let rust = app.store.seed_category("Rust").await;
    let now = OffsetDateTime::now_utc();
    app.store
        .seed_post("Borrowing", "borrowing", true, Some(rust.id), now)
        .await;
    app.store
        .seed_post("Gardening", "gardening", true, None, now)
        .await;

    let filtered = get(&app.public, &format!("/blog?category={}", rust.id)).await;

    assert_eq!(filtered.status, StatusCode::OK);
    assert!(filtered.body.contains("/blog/borrowing"));
    assert!(!filtered.body.contains("/blog/gardening"));
}

struct UnreachableCache;

#[async_trait]
impl CacheInvalidator for UnreachableCache {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn invalidate_tag(&self, _tag: &str) -> Result<(), InvalidationError> {
        Err(InvalidationError::Backend {
            backend: "unreachable",
            message: "connection refused".into(),
        })
    }

    async fn invalidate_path(&self, _path: &str) -> Result<(), InvalidationError> {
        Err(InvalidationError::Backend {
            backend: "unreachable",
            message: "connection refused".into(),
        })
    }
}

#[tokio::test]
async fn post_writes_succeed_when_invalidation_fails() {
    let store = Arc::new(MemoryStore::default());
    let backend: Arc<dyn CacheInvalidator> = Arc::new(UnreachableCache);
    let posts = AdminPostService::new(
        store.clone(),
        store.clone(),
        InvalidationCoordinator::new(vec![backend]),
        IndexingService::disabled(PUBLIC_URL),
    );

    let created = posts
        .create_post(CreatePostCommand {
            title: "Still saved".into(),
            content: "Body text.".into(),
            published: true,
            ..Default::default()
        })
        .await
        .expect("create succeeds despite invalidation failure");
    let stored = store.post(created.id).await.expect("created row");
    assert_eq!(stored.slug, "still-saved");

    posts
        .update_post(
            created.id,
            CreatePostCommand {
                title: "Saved again".into(),
                content: "Edited body.".into(),
                published: true,
                ..Default::default()
            },
        )
        .await
        .expect("update succeeds despite invalidation failure");
    let stored = store.post(created.id).await.expect("updated row");
    assert_eq!(stored.title, "Saved again");
    assert_eq!(stored.content, "Edited body.");

    posts
        .delete_post(created.id)
        .await
        .expect("delete succeeds despite invalidation failure");
    assert!(store.post(created.id).await.is_none());
}
