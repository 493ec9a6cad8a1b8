use std::collections::BTreeSet;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::indexing::NotificationType;
use crate::application::repos::{CreatePostParams, UpdatePostParams};
use crate::cache::InvalidationSet;
use crate::domain::entities::PostRecord;
use crate::domain::posts::validate;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async};

use super::service::AdminPostService;
use super::types::{
    AdminPostError, BulkDatesOutcome, CreatePostCommand, UpdatePostCommand, not_found,
};

impl AdminPostService {
    pub async fn create_post(
        &self,
        command: CreatePostCommand,
    ) -> Result<PostRecord, AdminPostError> {
        let valid = validate(command.into())?;

        let slug = match valid.slug {
            Some(slug) => slug,
            None => self.unique_slug(&valid.title).await?,
        };

        let params = CreatePostParams {
            title: valid.title,
            slug,
            content: valid.content,
            excerpt: valid.excerpt,
            published: valid.published,
            category_id: valid.category_id,
            author_id: valid.author_id,
            featured_image: valid.featured_image,
        };

        let post = self.writer.create_post(params).await?;
        info!(target: "inkpost::admin", id = %post.id, slug = %post.slug, "post created");

        self.invalidation
            .apply(&InvalidationSet::for_post(
                Some(&post.slug),
                post.category_id,
            ))
            .await;
        self.notify_visibility(None, &post);

        Ok(post)
    }

    pub async fn update_post(
        &self,
        id: Uuid,
        command: UpdatePostCommand,
    ) -> Result<PostRecord, AdminPostError> {
        let valid = validate(command.into())?;
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminPostError::NotFound)?;

        let params = UpdatePostParams {
            id,
            title: valid.title,
            slug: valid.slug.unwrap_or_else(|| existing.slug.clone()),
            content: valid.content,
            excerpt: valid.excerpt,
            published: valid.published,
            category_id: valid.category_id,
            author_id: valid.author_id,
            featured_image: valid.featured_image,
        };

        let post = self.writer.update_post(params).await.map_err(not_found)?;
        info!(target: "inkpost::admin", %id, slug = %post.slug, "post updated");

        let mut set = InvalidationSet::for_post(
            Some(&post.slug),
            existing.category_id.into_iter().chain(post.category_id),
        );
        if existing.slug != post.slug {
            set = set.merge(InvalidationSet::for_post(Some(&existing.slug), None::<Uuid>));
        }
        self.invalidation.apply(&set).await;
        self.notify_visibility(Some(&existing), &post);

        Ok(post)
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), AdminPostError> {
        let post = self.writer.delete_post(id).await.map_err(not_found)?;
        info!(target: "inkpost::admin", %id, slug = %post.slug, "post deleted");

        self.invalidation
            .apply(&InvalidationSet::for_post(
                Some(&post.slug),
                post.category_id,
            ))
            .await;
        if post.published {
            self.indexing.schedule(
                self.indexing.post_url(&post.slug),
                NotificationType::UrlDeleted,
            );
        }

        Ok(())
    }

    /// Flip the published flag from the state the caller observed.
    pub async fn toggle_published(
        &self,
        id: Uuid,
        current: bool,
    ) -> Result<PostRecord, AdminPostError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminPostError::NotFound)?;

        let post = self
            .writer
            .set_published(id, !current)
            .await
            .map_err(not_found)?;
        info!(
            target: "inkpost::admin",
            %id,
            published = post.published,
            "post visibility toggled"
        );

        self.invalidation
            .apply(&InvalidationSet::for_post(
                Some(&post.slug),
                post.category_id,
            ))
            .await;
        self.notify_visibility(Some(&existing), &post);

        Ok(post)
    }

    /// Move the given posts to the top of every listing by stamping them with
    /// the current time.
    pub async fn bulk_update_post_dates(
        &self,
        ids: &[String],
    ) -> Result<BulkDatesOutcome, AdminPostError> {
        if ids.is_empty() {
            return Err(AdminPostError::Validation(
                "No post IDs provided".to_string(),
            ));
        }

        let ids = ids
            .iter()
            .map(|raw| {
                Uuid::parse_str(raw.trim()).map_err(|_| {
                    AdminPostError::Validation(format!("Invalid post ID format: {raw}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let categories: BTreeSet<Uuid> = match self.reader.category_ids_for(&ids).await {
            Ok(categories) => categories.into_iter().collect(),
            Err(err) => {
                warn!(
                    target: "inkpost::admin",
                    error = %err,
                    "could not resolve categories for bulk date update"
                );
                BTreeSet::new()
            }
        };

        let result = self.writer.touch_post_dates(&ids, OffsetDateTime::now_utc()).await;

        // Some rows may have changed even when the statement reports an error.
        self.invalidation
            .apply(&InvalidationSet::for_bulk_post_dates(categories))
            .await;

        let updated_count = result?;
        info!(target: "inkpost::admin", updated_count, "post dates bumped");

        Ok(BulkDatesOutcome {
            updated_count,
            message: format!("Updated {updated_count} post(s) date to now"),
        })
    }

    async fn unique_slug(&self, title: &str) -> Result<String, AdminPostError> {
        let reader = self.reader.clone();
        match generate_unique_slug_async(title, move |candidate| {
            let reader = reader.clone();
            let candidate = candidate.to_string();
            async move {
                reader
                    .find_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await
        {
            Ok(slug) => Ok(slug),
            Err(SlugAsyncError::Slug(
                err @ (SlugError::EmptyInput | SlugError::Unrepresentable { .. }),
            )) => Err(AdminPostError::Validation(format!(
                "Title cannot produce a slug: {err}"
            ))),
            Err(SlugAsyncError::Slug(err)) => Err(AdminPostError::Validation(err.to_string())),
            Err(SlugAsyncError::Predicate(err)) => Err(AdminPostError::Repo(err)),
        }
    }

    // Published URLs are announced; URLs that stop resolving are withdrawn.
    fn notify_visibility(&self, before: Option<&PostRecord>, after: &PostRecord) {
        if let Some(before) = before
            && before.published
            && (!after.published || before.slug != after.slug)
        {
            self.indexing.schedule(
                self.indexing.post_url(&before.slug),
                NotificationType::UrlDeleted,
            );
        }
        if after.published {
            self.indexing.schedule(
                self.indexing.post_url(&after.slug),
                NotificationType::UrlUpdated,
            );
        }
    }
}
