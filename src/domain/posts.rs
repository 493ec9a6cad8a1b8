//! Post field rules applied before any write.

use url::Url;
use uuid::Uuid;

use super::{error::DomainError, slug::validate_slug};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_EXCERPT_CHARS: usize = 500;

/// Raw post input as submitted by an editor.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
}

/// A draft whose fields passed validation. `slug` is `None` when it must be derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPost {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub featured_image: Option<String>,
}

pub fn validate(draft: PostDraft) -> Result<ValidPost, DomainError> {
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(DomainError::validation("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }

    if draft.content.trim().is_empty() {
        return Err(DomainError::validation("Content is required"));
    }

    let slug = match non_blank(draft.slug) {
        Some(slug) => {
            validate_slug(&slug)?;
            Some(slug)
        }
        None => None,
    };

    let excerpt = non_blank(draft.excerpt);
    if let Some(excerpt) = excerpt.as_deref()
        && excerpt.chars().count() > MAX_EXCERPT_CHARS
    {
        return Err(DomainError::validation(format!(
            "Excerpt must be at most {MAX_EXCERPT_CHARS} characters"
        )));
    }

    let featured_image = non_blank(draft.featured_image);
    if let Some(image) = featured_image.as_deref() {
        validate_image_reference(image)?;
    }

    Ok(ValidPost {
        title,
        slug,
        content: draft.content,
        excerpt,
        published: draft.published,
        category_id: draft.category_id,
        author_id: draft.author_id,
        featured_image,
    })
}

// Either an absolute http(s) URL or an asset identifier from the image host.
fn validate_image_reference(value: &str) -> Result<(), DomainError> {
    if value.contains("://") {
        let parsed = Url::parse(value)
            .map_err(|err| DomainError::validation(format!("Invalid featured image URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DomainError::validation(
                "Featured image URL must use http or https",
            ));
        }
    } else if value.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(
            "Featured image identifier must not contain whitespace",
        ));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
