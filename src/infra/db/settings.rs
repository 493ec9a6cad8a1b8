use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, SettingsRepo, UpdateSettingsParams},
    domain::entities::SiteSettingsRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const SETTINGS_COLUMNS: &str = "site_name, site_description, site_url, robots_index, \
    robots_follow, revisit_after_days, updated_at";

#[derive(sqlx::FromRow)]
struct SiteSettingsRow {
    site_name: String,
    site_description: String,
    site_url: Option<String>,
    robots_index: bool,
    robots_follow: bool,
    revisit_after_days: i32,
    updated_at: OffsetDateTime,
}

impl From<SiteSettingsRow> for SiteSettingsRecord {
    fn from(row: SiteSettingsRow) -> Self {
        Self {
            site_name: row.site_name,
            site_description: row.site_description,
            site_url: row.site_url,
            robots_index: row.robots_index,
            robots_follow: row.robots_follow,
            revisit_after_days: row.revisit_after_days,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    async fn load_site_settings(&self) -> Result<SiteSettingsRecord, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, SiteSettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM site_settings WHERE id = 1"
        ))
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SiteSettingsRecord::from).unwrap_or_default())
    }

    async fn upsert_site_settings(
        &self,
        params: UpdateSettingsParams,
    ) -> Result<SiteSettingsRecord, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, SiteSettingsRow>(&format!(
            "INSERT INTO site_settings (id, site_name, site_description, site_url, \
             robots_index, robots_follow, revisit_after_days, updated_at) \
             VALUES (1, $1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (id) DO UPDATE SET \
             site_name = EXCLUDED.site_name, \
             site_description = EXCLUDED.site_description, \
             site_url = EXCLUDED.site_url, \
             robots_index = EXCLUDED.robots_index, \
             robots_follow = EXCLUDED.robots_follow, \
             revisit_after_days = EXCLUDED.revisit_after_days, \
             updated_at = now() \
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(params.site_name)
        .bind(params.site_description)
        .bind(params.site_url)
        .bind(params.robots_index)
        .bind(params.robots_follow)
        .bind(params.revisit_after_days)
        .fetch_one(&pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
