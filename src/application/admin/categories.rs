use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{CategoriesRepo, RepoError};
use crate::cache::{
    CachePolicy, InvalidationCoordinator, InvalidationSet, TaggedCache,
    keys::{KEY_CATEGORIES, TAG_CATEGORIES},
};
use crate::domain::entities::CategoryRecord;

pub const MAX_CATEGORY_NAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum AdminCategoryError {
    #[error("{0}")]
    Validation(String),
    #[error("category not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct AdminCategoryService {
    repo: Arc<dyn CategoriesRepo>,
    cache: Arc<TaggedCache>,
    invalidation: InvalidationCoordinator,
}

impl AdminCategoryService {
    pub fn new(
        repo: Arc<dyn CategoriesRepo>,
        cache: Arc<TaggedCache>,
        invalidation: InvalidationCoordinator,
    ) -> Self {
        Self {
            repo,
            cache,
            invalidation,
        }
    }

    /// Every category ordered by name; shared by the public API.
    pub async fn list(&self) -> Result<Arc<Vec<CategoryRecord>>, AdminCategoryError> {
        let repo = Arc::clone(&self.repo);
        self.cache
            .get_or_load(
                KEY_CATEGORIES,
                CachePolicy::tagged([TAG_CATEGORIES]),
                || async move { repo.list_categories().await.map(Arc::new) },
            )
            .await
            .map_err(AdminCategoryError::from)
    }

    pub async fn create(&self, name: &str) -> Result<CategoryRecord, AdminCategoryError> {
        let name = normalize_name(name)?;
        let category = self.repo.create_category(&name).await?;

        self.invalidation
            .apply(&InvalidationSet::for_category())
            .await;
        info!(target: "inkpost::admin", id = %category.id, "category created");
        Ok(category)
    }

    pub async fn update(&self, id: Uuid, name: &str) -> Result<CategoryRecord, AdminCategoryError> {
        let name = normalize_name(name)?;
        let category = self
            .repo
            .update_category(id, &name)
            .await
            .map_err(not_found)?;

        // Listings embed the category name.
        self.invalidation
            .apply(&InvalidationSet::for_category().merge(InvalidationSet::for_post(None, [id])))
            .await;
        info!(target: "inkpost::admin", %id, "category updated");
        Ok(category)
    }

    /// Posts in the category keep existing with no category.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminCategoryError> {
        self.repo.delete_category(id).await.map_err(not_found)?;

        self.invalidation
            .apply(&InvalidationSet::for_category().merge(InvalidationSet::for_post(None, [id])))
            .await;
        info!(target: "inkpost::admin", %id, "category deleted");
        Ok(())
    }
}

fn normalize_name(name: &str) -> Result<String, AdminCategoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminCategoryError::Validation(
            "Category name is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_CATEGORY_NAME_CHARS {
        return Err(AdminCategoryError::Validation(format!(
            "Category name must be at most {MAX_CATEGORY_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn not_found(err: RepoError) -> AdminCategoryError {
    match err {
        RepoError::NotFound => AdminCategoryError::NotFound,
        other => AdminCategoryError::Repo(other),
    }
}
