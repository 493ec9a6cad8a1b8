use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::{
        admin::{
            categories::AdminCategoryService,
            settings::AdminSettingsService,
            users::{AdminUserError, AdminUserService, RegisterCommand, RegisteredUser},
        },
        blog::{BlogError, BlogService},
        error::{ErrorReport, HttpError},
        repos::HealthRepo,
        sitemap::{CATEGORIES_SITEMAP_PATH, POSTS_SITEMAP_PATH, SitemapService, resolve_base_url},
    },
    cache::{CacheState, response_cache_layer},
    domain::entities::SiteSettingsRecord,
    presentation::views::{
        BlogPageContext, BlogTemplate, LayoutChrome, LayoutContext, PostDetailContext,
        PostTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
    repo_error_to_http,
};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub blog: Arc<BlogService>,
    pub categories: Arc<AdminCategoryService>,
    pub settings: Arc<AdminSettingsService>,
    pub users: Arc<AdminUserService>,
    pub sitemap: Arc<SitemapService>,
    pub health: Arc<dyn HealthRepo>,
    pub public_url: Arc<str>,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: HttpState) -> Router {
    // Public content; entries are dropped by tag when the underlying rows change.
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/blog", get(blog_index))
        .route("/blog/{slug}", get(post_detail))
        .route("/sitemap.xml", get(sitemap_index))
        .route(POSTS_SITEMAP_PATH, get(posts_sitemap))
        .route(CATEGORIES_SITEMAP_PATH, get(categories_sitemap))
        .route("/api/categories", get(categories_api));

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let static_routes = Router::new()
        .route("/robots.txt", get(robots_txt))
        .route("/api/register", post(register))
        .route("/_health/db", get(public_health));

    cached_routes
        .merge(static_routes)
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BlogQuery {
    category: Option<String>,
}

async fn index(State(state): State<HttpState>) -> Response {
    render_listing(&state, None, "/").await
}

async fn blog_index(State(state): State<HttpState>, Query(query): Query<BlogQuery>) -> Response {
    let category = match query.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return render_not_found_response(load_chrome(&state).await),
        },
    };
    let canonical = match category {
        Some(id) => format!("/blog?category={id}"),
        None => "/blog".to_string(),
    };
    render_listing(&state, category, &canonical).await
}

async fn render_listing(state: &HttpState, category: Option<Uuid>, path: &str) -> Response {
    let chrome = load_chrome(state).await;

    let posts = match state.blog.published_posts(category).await {
        Ok(posts) => posts,
        Err(err) => return blog_error_to_response(err, chrome),
    };

    // The filter strip is decoration; a failure here still renders the posts.
    let categories = match state.categories.list().await {
        Ok(categories) => categories,
        Err(err) => {
            warn!(
                target: "inkpost::http::public",
                error = %err,
                "failed to load categories for listing"
            );
            Arc::new(Vec::new())
        }
    };

    let content = BlogPageContext::build(&posts, &categories, category);
    let canonical = canonical_url(&chrome.meta.canonical, path);
    let view = LayoutContext::new(chrome.with_canonical(canonical), content);
    render_template_response(BlogTemplate { view }, StatusCode::OK)
}

async fn post_detail(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    let chrome = load_chrome(&state).await;

    match state.blog.post_by_slug(&slug).await {
        Ok(post) => {
            let canonical = canonical_url(&chrome.meta.canonical, &format!("/blog/{slug}"));
            let chrome = chrome.with_title(&post.post.title).with_canonical(canonical);
            let view = LayoutContext::new(chrome, PostDetailContext::from_post(&post));
            render_template_response(PostTemplate { view }, StatusCode::OK)
        }
        Err(err) => blog_error_to_response(err, chrome),
    }
}

async fn fallback(State(state): State<HttpState>) -> Response {
    render_not_found_response(load_chrome(&state).await)
}

/// Chrome for public pages; settings failures fall back to defaults.
async fn load_chrome(state: &HttpState) -> LayoutChrome {
    let settings = match state.settings.load().await {
        Ok(settings) => settings,
        Err(err) => {
            warn!(
                target: "inkpost::http::public",
                error = %err,
                "failed to load site settings; using defaults"
            );
            SiteSettingsRecord::default()
        }
    };
    let base = resolve_base_url(&settings, &state.public_url);
    LayoutChrome::from_settings(&settings, &base)
}

fn blog_error_to_response(err: BlogError, chrome: LayoutChrome) -> Response {
    match err {
        BlogError::NotFound(slug) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_message(
                "infra::http::public::blog_error_to_response",
                StatusCode::NOT_FOUND,
                format!("post `{slug}` not found"),
            )
            .attach(&mut response);
            response
        }
        BlogError::Repo(err) => {
            repo_error_to_http("infra::http::public::blog", err).into_response()
        }
        BlogError::Dedup(err) => HttpError::from_error(
            "infra::http::public::blog",
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
            &err,
        )
        .into_response(),
    }
}

async fn sitemap_index(State(state): State<HttpState>) -> Response {
    xml_response(state.sitemap.sitemap_index().await)
}

async fn posts_sitemap(State(state): State<HttpState>) -> Response {
    xml_response(state.sitemap.posts_sitemap().await)
}

async fn categories_sitemap(State(state): State<HttpState>) -> Response {
    xml_response(state.sitemap.categories_sitemap().await)
}

async fn robots_txt(State(state): State<HttpState>) -> Response {
    plain_response(state.sitemap.robots_txt().await)
}

#[derive(Debug, Serialize)]
struct CategorySummary {
    id: Uuid,
    name: String,
}

async fn categories_api(State(state): State<HttpState>) -> Response {
    match state.categories.list().await {
        Ok(categories) => {
            let body: Vec<CategorySummary> = categories
                .iter()
                .map(|category| CategorySummary {
                    id: category.id,
                    name: category.name.clone(),
                })
                .collect();
            Json(body).into_response()
        }
        Err(err) => {
            let mut response = error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch categories",
            );
            ErrorReport::from_error(
                "infra::http::public::categories_api",
                StatusCode::INTERNAL_SERVER_ERROR,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: RegisteredUser,
}

async fn register(
    State(state): State<HttpState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let mut response = error_json(StatusCode::BAD_REQUEST, "Invalid request body");
            ErrorReport::from_error(
                "infra::http::public::register",
                StatusCode::BAD_REQUEST,
                &rejection,
            )
            .attach(&mut response);
            return response;
        }
    };

    let command = RegisterCommand {
        name: payload.name,
        email: payload.email,
        password: payload.password,
    };

    match state.users.register(command).await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "User registered successfully",
                user,
            }),
        )
            .into_response(),
        Err(err) => {
            let (status, message) = match &err {
                AdminUserError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
                AdminUserError::AlreadyExists => (StatusCode::CONFLICT, err.to_string()),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again later.".to_string(),
                ),
            };
            let mut response = error_json(status, message);
            ErrorReport::from_error("infra::http::public::register", status, &err)
                .attach(&mut response);
            response
        }
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn canonical_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn xml_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, XML_CONTENT_TYPE)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn plain_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
