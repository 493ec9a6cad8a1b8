use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::posts::{BulkDatesOutcome, CreatePostCommand};
use crate::domain::entities::{PostRecord, PostWithRelations};

use super::super::ApiError;
use super::AdminState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PostRequest {
    title: String,
    slug: Option<String>,
    content: String,
    excerpt: Option<String>,
    published: bool,
    category_id: Option<Uuid>,
    author_id: Option<Uuid>,
    featured_image: Option<String>,
}

impl From<PostRequest> for CreatePostCommand {
    fn from(request: PostRequest) -> Self {
        CreatePostCommand {
            title: request.title,
            slug: request.slug,
            content: request.content,
            excerpt: request.excerpt,
            published: request.published,
            category_id: request.category_id,
            author_id: request.author_id,
            featured_image: request.featured_image,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ToggleRequest {
    current: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct BulkDatesRequest {
    ids: Vec<String>,
}

pub(super) async fn list_posts(
    State(state): State<AdminState>,
) -> Result<Json<Vec<PostWithRelations>>, ApiError> {
    Ok(Json(state.posts.list_posts().await?))
}

pub(super) async fn create_post(
    State(state): State<AdminState>,
    Json(payload): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.posts.create_post(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub(super) async fn update_post(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostRequest>,
) -> Result<Json<PostRecord>, ApiError> {
    Ok(Json(state.posts.update_post(id, payload.into()).await?))
}

pub(super) async fn delete_post(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.posts.delete_post(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn toggle_published(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<PostRecord>, ApiError> {
    Ok(Json(
        state.posts.toggle_published(id, payload.current).await?,
    ))
}

pub(super) async fn bulk_update_dates(
    State(state): State<AdminState>,
    Json(payload): Json<BulkDatesRequest>,
) -> Result<Json<BulkDatesOutcome>, ApiError> {
    Ok(Json(state.posts.bulk_update_post_dates(&payload.ids).await?))
}
