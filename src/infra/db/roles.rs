use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, RolesRepo},
    domain::entities::RoleRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    permissions: Vec<String>,
}

impl From<RoleRow> for RoleRecord {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            permissions: row.permissions,
        }
    }
}

#[async_trait]
impl RolesRepo for PostgresRepositories {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepoError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, RoleRow>("SELECT id, name, permissions FROM roles ORDER BY name")
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(RoleRecord::from).collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<RoleRecord>, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, permissions FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(RoleRecord::from))
    }

    async fn upsert_role(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<RoleRecord, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, RoleRow>(
            "INSERT INTO roles (name, permissions) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET permissions = EXCLUDED.permissions \
             RETURNING id, name, permissions",
        )
        .bind(name)
        .bind(permissions)
        .fetch_one(&pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}
