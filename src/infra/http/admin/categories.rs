use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::entities::CategoryRecord;

use super::super::ApiError;
use super::AdminState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CategoryRequest {
    name: String,
}

pub(super) async fn list_categories(
    State(state): State<AdminState>,
) -> Result<Json<Vec<CategoryRecord>>, ApiError> {
    let categories = state.categories.list().await?;
    Ok(Json(categories.as_ref().clone()))
}

pub(super) async fn create_category(
    State(state): State<AdminState>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.categories.create(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub(super) async fn update_category(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Json<CategoryRecord>, ApiError> {
    Ok(Json(state.categories.update(id, &payload.name).await?))
}

pub(super) async fn delete_category(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
