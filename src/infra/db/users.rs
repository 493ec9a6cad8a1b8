use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateUserParams, RepoError, UsersRepo},
    domain::entities::UserRecord,
};

use super::{PostgresRepositories, map_sqlx_error, util::convert_count};

const USER_SELECT: &str = "SELECT u.id, u.name, u.email, u.password_hash, u.role_id, \
    r.name AS role_name, u.created_at, u.updated_at \
    FROM users u LEFT JOIN roles r ON r.id = u.role_id";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    role_id: Option<Uuid>,
    role_name: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role_id: row.role_id,
            role_name: row.role_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_SELECT} ORDER BY u.created_at DESC, u.id"
        ))
        .fetch_all(&pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        self.user_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn count_users(&self) -> Result<u64, RepoError> {
        let pool = self.pool().await?;
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let CreateUserParams {
            name,
            email,
            password_hash,
            role_id,
        } = params;

        let pool = self.pool().await?;
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (name, email, password_hash, role_id) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role_id)
        .fetch_one(&pool)
        .await
        .map_err(map_sqlx_error)?;

        self.user_by_id(id)
            .await?
            .ok_or_else(|| RepoError::from_persistence("inserted user vanished"))
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> Result<UserRecord, RepoError> {
        let pool = self.pool().await?;
        let result =
            sqlx::query("UPDATE users SET role_id = $2, updated_at = now() WHERE id = $1")
                .bind(user_id)
                .bind(role_id)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        self.user_by_id(user_id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), RepoError> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
