//! Response cache middleware.
//!
//! Caches GET requests to public routes and serves cached responses.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig, deps,
    keys::ResponseKey,
    store::{CachedResponse, ResponseStore},
};

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub responses: Arc<ResponseStore>,
}

/// Middleware for response caching.
///
/// Only caches GET requests that return 200 OK. Tags recorded through
/// [`deps::record`] while the handler runs are stored with the entry.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_response_cache || request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = ResponseKey::new(request.uri().path(), request.uri().query());

    if let Some(cached) = cache.responses.get(&key) {
        debug!(target: "inkpost::cache", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    debug!(target: "inkpost::cache", outcome = "miss", "cache miss, executing handler");

    let generation = cache.responses.generation();
    let (response, tags) = deps::with_collector(next.run(request)).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target: "inkpost::cache", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if bytes.len() > MAX_CACHED_BODY_BYTES {
        debug!(
            target: "inkpost::cache",
            body_bytes = bytes.len(),
            "response too large to cache; serving uncached"
        );
        return Response::from_parts(parts, Body::from(bytes));
    }

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
    };

    let tag_count = tags.len();
    if cache.responses.insert(key, cached, tags, generation) {
        debug!(target: "inkpost::cache", tag_count, "caching response");
    } else {
        debug!(
            target: "inkpost::cache",
            "response invalidated while rendering; not cached"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app(config: CacheConfig, calls: Arc<AtomicUsize>) -> (Router, Arc<ResponseStore>) {
        let responses = Arc::new(ResponseStore::new(&config));
        let state = CacheState {
            config,
            responses: Arc::clone(&responses),
        };
        let router = Router::new()
            .route(
                "/robots.txt",
                get(move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        deps::record("site-settings");
                        calls.fetch_add(1, Ordering::SeqCst);
                        "User-agent: *"
                    }
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/sitemap-posts.xml",
                get(|| async { "x".repeat(MAX_CACHED_BODY_BYTES * 2) }),
            )
            .layer(middleware::from_fn_with_state(state, response_cache_layer));
        (router, responses)
    }

    async fn get_status(router: &Router, uri: &str) -> StatusCode {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        router
            .clone()
            .oneshot(request)
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn caches_ok_responses_and_records_tags() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (router, responses) = app(CacheConfig::default(), Arc::clone(&calls));

        assert_eq!(get_status(&router, "/robots.txt").await, StatusCode::OK);
        assert_eq!(get_status(&router, "/robots.txt").await, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(responses.invalidate_tag("site-settings"), 1);
        assert_eq!(get_status(&router, "/robots.txt").await, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_ok_responses_are_not_cached() {
        let (router, responses) = app(CacheConfig::default(), Arc::new(AtomicUsize::new(0)));
        assert_eq!(get_status(&router, "/missing").await, StatusCode::NOT_FOUND);
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn oversized_bodies_are_served_uncached() {
        let (router, responses) = app(CacheConfig::default(), Arc::new(AtomicUsize::new(0)));
        let request = Request::builder()
            .uri("/sitemap-posts.xml")
            .body(Body::empty())
            .expect("request");
        let response = router.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body.len(), MAX_CACHED_BODY_BYTES * 2);
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn disabled_layer_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = CacheConfig {
            enable_response_cache: false,
            ..CacheConfig::default()
        };
        let (router, responses) = app(config, Arc::clone(&calls));

        get_status(&router, "/robots.txt").await;
        get_status(&router, "/robots.txt").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(responses.is_empty());
    }
}
