mod cache;
mod categories;
mod dashboard;
mod health;
mod indexing;
mod posts;
mod settings;
mod state;
mod users;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health::admin_health))
        .route("/cache/invalidate", post(cache::invalidate_cache))
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/bulk-dates", post(posts::bulk_update_dates))
        .route(
            "/posts/{id}",
            put(posts::update_post).delete(posts::delete_post),
        )
        .route(
            "/posts/{id}/toggle-published",
            post(posts::toggle_published),
        )
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{id}",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route("/users", get(users::list_users))
        .route("/users/{id}/role", post(users::assign_role))
        .route("/roles", get(users::list_roles))
        .route(
            "/settings",
            get(settings::load_settings).put(settings::update_settings),
        )
        .route("/api/indexing", post(indexing::submit_url))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
