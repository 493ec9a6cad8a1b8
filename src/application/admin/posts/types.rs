use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    application::repos::RepoError,
    domain::{error::DomainError, posts::PostDraft},
};

#[derive(Debug, Error)]
pub enum AdminPostError {
    #[error("{0}")]
    Validation(String),
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<DomainError> for AdminPostError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => AdminPostError::NotFound,
            DomainError::Validation { message } | DomainError::Invariant { message } => {
                AdminPostError::Validation(message)
            }
        }
    }
}

pub(crate) fn not_found(err: RepoError) -> AdminPostError {
    match err {
        RepoError::NotFound => AdminPostError::NotFound,
        other => AdminPostError::Repo(other),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreatePostCommand {
    pub title: String,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
}

/// Full replacement of a post's editable fields.
///
/// A missing slug keeps the current one.
pub type UpdatePostCommand = CreatePostCommand;

impl From<CreatePostCommand> for PostDraft {
    fn from(command: CreatePostCommand) -> Self {
        PostDraft {
            title: command.title,
            slug: command.slug,
            content: command.content,
            excerpt: command.excerpt,
            published: command.published,
            category_id: command.category_id,
            author_id: command.author_id,
            featured_image: command.featured_image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDatesOutcome {
    pub updated_count: u64,
    pub message: String,
}
