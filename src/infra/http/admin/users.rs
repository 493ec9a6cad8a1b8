use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::entities::{RoleRecord, UserRecord};

use super::super::ApiError;
use super::AdminState;

#[derive(Debug, Deserialize)]
pub(super) struct AssignRoleRequest {
    role: String,
}

pub(super) async fn list_users(
    State(state): State<AdminState>,
) -> Result<Json<Vec<UserRecord>>, ApiError> {
    Ok(Json(state.users.list().await?))
}

pub(super) async fn list_roles(
    State(state): State<AdminState>,
) -> Result<Json<Vec<RoleRecord>>, ApiError> {
    Ok(Json(state.users.list_roles().await?))
}

pub(super) async fn assign_role(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(state.users.assign_role(id, &payload.role).await?))
}
