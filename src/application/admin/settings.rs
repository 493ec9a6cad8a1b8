use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{RepoError, SettingsRepo, UpdateSettingsParams};
use crate::cache::{
    CachePolicy, InvalidationCoordinator, InvalidationSet, TaggedCache,
    keys::{KEY_SITE_SETTINGS, TAG_SITE_SETTINGS},
};
use crate::domain::entities::SiteSettingsRecord;

#[derive(Debug, Error)]
pub enum AdminSettingsError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct UpdateSettingsCommand {
    pub site_name: String,
    pub site_description: String,
    pub site_url: Option<String>,
    pub robots_index: bool,
    pub robots_follow: bool,
    pub revisit_after_days: i32,
}

#[derive(Clone)]
pub struct AdminSettingsService {
    repo: Arc<dyn SettingsRepo>,
    cache: Arc<TaggedCache>,
    invalidation: InvalidationCoordinator,
}

impl AdminSettingsService {
    pub fn new(
        repo: Arc<dyn SettingsRepo>,
        cache: Arc<TaggedCache>,
        invalidation: InvalidationCoordinator,
    ) -> Self {
        Self {
            repo,
            cache,
            invalidation,
        }
    }

    pub async fn load(&self) -> Result<SiteSettingsRecord, AdminSettingsError> {
        let repo = Arc::clone(&self.repo);
        self.cache
            .get_or_load(
                KEY_SITE_SETTINGS,
                CachePolicy::tagged([TAG_SITE_SETTINGS]),
                || async move { repo.load_site_settings().await },
            )
            .await
            .map_err(AdminSettingsError::from)
    }

    pub async fn update(
        &self,
        command: UpdateSettingsCommand,
    ) -> Result<SiteSettingsRecord, AdminSettingsError> {
        let site_name = command.site_name.trim().to_string();
        if site_name.is_empty() {
            return Err(AdminSettingsError::Validation(
                "Site name is required".to_string(),
            ));
        }
        if command.revisit_after_days < 1 {
            return Err(AdminSettingsError::Validation(
                "Revisit interval must be at least one day".to_string(),
            ));
        }

        let site_url = match command
            .site_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
        {
            Some(url) => {
                ensure_http_url(&url)?;
                Some(url)
            }
            None => None,
        };

        let params = UpdateSettingsParams {
            site_name,
            site_description: command.site_description.trim().to_string(),
            site_url,
            robots_index: command.robots_index,
            robots_follow: command.robots_follow,
            revisit_after_days: command.revisit_after_days,
        };

        let record = self.repo.upsert_site_settings(params).await?;
        self.invalidation
            .apply(&InvalidationSet::for_settings())
            .await;
        info!(target: "inkpost::admin", "site settings updated");

        Ok(record)
    }
}

fn ensure_http_url(value: &str) -> Result<(), AdminSettingsError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        Ok(_) => Err(AdminSettingsError::Validation(
            "Site URL must use http or https".to_string(),
        )),
        Err(err) => Err(AdminSettingsError::Validation(format!(
            "Site URL is invalid: {err}"
        ))),
    }
}
